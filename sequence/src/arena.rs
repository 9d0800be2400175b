use std::fmt;

use log::debug;

use crate::command::{Command, CommandKind};
use crate::error::SequenceError;

/// Stable handle to a command stored in a [`CommandArena`].
///
/// A handle stays valid until its command is deleted; after that the slot
/// may be reused, but the generation check makes the old handle resolve to
/// nothing instead of the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId {
    index: u32,
    generation: u32,
}

impl CommandId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.index)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    command: Option<Command>,
}

/// Owner of every command node.
///
/// Nodes refer to each other only through [`CommandId`]s. A node's `next`
/// link and its branch heads in `children` own their targets: deleting a
/// node deletes its branches, and a sequence is deleted by walking `next`.
/// `previous` is a plain back-link.
#[derive(Debug, Default)]
pub struct CommandArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl CommandArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new sequence: a lone `NoOp` sentinel head.
    pub fn new_sequence(&mut self) -> CommandId {
        self.insert(Command::new(CommandKind::NoOp))
    }

    pub fn insert(&mut self, command: Command) -> CommandId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.command = Some(command);
            return CommandId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            command: Some(command),
        });
        CommandId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    pub fn get(&self, id: CommandId) -> Option<&Command> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.command.as_ref())
    }

    pub fn get_mut(&mut self, id: CommandId) -> Option<&mut Command> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.command.as_mut())
    }

    /// Like [`get`](Self::get), but a stale handle is an error.
    pub fn command(&self, id: CommandId) -> Result<&Command, SequenceError> {
        self.get(id).ok_or(SequenceError::StaleHandle(id))
    }

    pub fn command_mut(&mut self, id: CommandId) -> Result<&mut Command, SequenceError> {
        self.get_mut(id).ok_or(SequenceError::StaleHandle(id))
    }

    pub fn contains(&self, id: CommandId) -> bool {
        self.get(id).is_some()
    }

    /// Number of commands currently allocated.
    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn next(&self, id: CommandId) -> Option<CommandId> {
        self.get(id).and_then(|c| c.next())
    }

    pub fn previous(&self, id: CommandId) -> Option<CommandId> {
        self.get(id).and_then(|c| c.previous())
    }

    pub fn child(&self, id: CommandId, branch: usize) -> Option<CommandId> {
        self.get(id).and_then(|c| c.child_command(branch))
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Free a command together with every branch it owns.
    ///
    /// The command's own `next` is not followed: callers unlink first, so
    /// anything still reachable through `next` belongs to someone else.
    pub fn delete(&mut self, id: CommandId) -> Result<Command, SequenceError> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .ok_or(SequenceError::StaleHandle(id))?;
        let command = slot.command.take().ok_or(SequenceError::StaleHandle(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;

        for head in command.children().iter().flatten() {
            self.delete_chain(*head)?;
        }
        debug!("deleted {} {}", command.type_name(), id);
        Ok(command)
    }

    /// Delete `head` and everything reachable from it through `next`.
    fn delete_chain(&mut self, head: CommandId) -> Result<(), SequenceError> {
        let mut current = Some(head);
        while let Some(id) = current {
            current = self.next(id);
            self.delete(id)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Linking
    // -----------------------------------------------------------------------

    /// Point `id.next` at `next` and, when there is one, `next.previous`
    /// back at `id`.
    pub fn set_next(&mut self, id: CommandId, next: Option<CommandId>) -> Result<(), SequenceError> {
        self.command_mut(id)?.next = next;
        if let Some(next) = next {
            self.command_mut(next)?.previous = Some(id);
        }
        Ok(())
    }

    /// Overwrite `id.next` without touching any other node.
    pub fn force_set_next(
        &mut self,
        id: CommandId,
        next: Option<CommandId>,
    ) -> Result<(), SequenceError> {
        self.command_mut(id)?.next = next;
        Ok(())
    }

    pub fn set_previous(
        &mut self,
        id: CommandId,
        previous: Option<CommandId>,
    ) -> Result<(), SequenceError> {
        self.command_mut(id)?.previous = previous;
        Ok(())
    }

    /// Replace the head of `branch` on `parent`, growing the branch list
    /// as needed.
    pub fn set_child(
        &mut self,
        parent: CommandId,
        branch: usize,
        head: Option<CommandId>,
    ) -> Result<(), SequenceError> {
        let command = self.command_mut(parent)?;
        if command.children.len() <= branch {
            command.children.resize(branch + 1, None);
        }
        command.children[branch] = head;
        if let Some(head) = head {
            self.command_mut(head)?.previous = None;
        }
        Ok(())
    }

    /// Last command reachable from `id` through `next`.
    pub fn last_in_chain(&self, id: CommandId) -> CommandId {
        let mut last = id;
        while let Some(next) = self.next(last) {
            last = next;
        }
        last
    }

    /// Link `command` after the last command of the chain starting at `head`.
    pub fn append(&mut self, head: CommandId, command: CommandId) -> Result<(), SequenceError> {
        let last = self.last_in_chain(head);
        self.set_next(last, Some(command))
    }

    /// Link `command` at the end of branch `branch` of `parent`.
    pub fn append_to_branch(
        &mut self,
        parent: CommandId,
        branch: usize,
        command: CommandId,
    ) -> Result<(), SequenceError> {
        match self.child(parent, branch) {
            Some(head) => self.append(head, command),
            None => self.set_child(parent, branch, Some(command)),
        }
    }

    /// Link `command` directly after `previous`, keeping whatever followed.
    pub fn insert_after(
        &mut self,
        previous: CommandId,
        command: CommandId,
    ) -> Result<(), SequenceError> {
        let following = self.command(previous)?.next();
        self.set_next(command, following)?;
        self.set_next(previous, Some(command))
    }
}
