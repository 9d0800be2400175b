//! Free functions over a command sequence held in a [`CommandArena`].
//!
//! Lookups that fail to find their target return `None` or `false`;
//! structural violations return a [`SequenceError`].

use log::{debug, trace, warn};

use crate::arena::{CommandArena, CommandId};
use crate::command::{CommandKind, ObjectType};
use crate::error::SequenceError;

pub const SEQUENCE_HEADER: &str = "\n---------- Mission Sequence ----------\n";

/// Walk `previous` links back to the first command of the chain.
pub fn get_first_command(arena: &CommandArena, cmd: CommandId) -> CommandId {
    let mut first = cmd;
    while let Some(previous) = arena.previous(first) {
        first = previous;
    }
    first
}

/// Walk `next` links to the last command of the chain.
pub fn get_last_command(arena: &CommandArena, cmd: CommandId) -> CommandId {
    arena.last_in_chain(cmd)
}

/// The command after `cmd`, treating a whole `BeginScript` ... `EndScript`
/// block as one step.
pub fn get_next_command(
    arena: &CommandArena,
    cmd: CommandId,
) -> Result<Option<CommandId>, SequenceError> {
    let command = arena.command(cmd)?;
    if command.kind() != CommandKind::BeginScript {
        return Ok(command.next());
    }
    let end = get_matching_end(arena, cmd).ok_or_else(|| SequenceError::UnmatchedBlock {
        type_name: command.type_name().to_string(),
        generating_string: command.generating_string().to_string(),
    })?;
    Ok(arena.next(end))
}

/// The command that closes `cmd`: the balancing `EndScript` of a
/// `BeginScript`, or the branch end of a branch command. For an `If` the
/// scan moves from the first branch into the second when it meets `Else`.
pub fn get_matching_end(arena: &CommandArena, cmd: CommandId) -> Option<CommandId> {
    let command = arena.get(cmd)?;

    if command.kind() == CommandKind::BeginScript {
        let mut depth = 0usize;
        let mut current = Some(cmd);
        while let Some(id) = current {
            match arena.get(id)?.kind() {
                CommandKind::BeginScript => depth += 1,
                CommandKind::EndScript => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(id);
                    }
                }
                _ => {}
            }
            current = arena.next(id);
        }
        return None;
    }

    if !command.has_children() {
        return None;
    }

    let mut branch = 0;
    let mut current = arena.child(cmd, branch);
    while let Some(id) = current {
        let node = arena.get(id)?;
        if node.is_of_type("BranchEnd") {
            if node.kind() != CommandKind::Else {
                return Some(id);
            }
            if branch > 0 {
                return None;
            }
            branch = 1;
            current = arena.child(cmd, branch);
            continue;
        }
        current = node.next();
    }
    None
}

/// The nearest branch command enclosing `cmd`, searching from `top`
/// forward. Returns `top` itself when `cmd` is on `top`'s own chain.
pub fn get_parent_command(
    arena: &CommandArena,
    top: CommandId,
    cmd: CommandId,
) -> Option<CommandId> {
    let mut current = Some(top);
    while let Some(id) = current {
        if id == cmd {
            return Some(top);
        }
        let command = arena.get(id)?;
        if command.has_children() {
            if let Some(parent) = get_sub_parent(arena, id, cmd) {
                return Some(parent);
            }
        }
        current = command.next();
    }
    None
}

/// The branch command under `branch_cmd` (itself included) that directly
/// owns `cmd`.
pub fn get_sub_parent(
    arena: &CommandArena,
    branch_cmd: CommandId,
    cmd: CommandId,
) -> Option<CommandId> {
    let heads: Vec<CommandId> = arena
        .get(branch_cmd)?
        .children()
        .iter()
        .flatten()
        .copied()
        .collect();

    for head in heads {
        let mut current = Some(head);
        while let Some(id) = current {
            if id == cmd {
                return Some(branch_cmd);
            }
            if arena.get(id).is_some_and(|c| c.has_children()) {
                if let Some(parent) = get_sub_parent(arena, id, cmd) {
                    return Some(parent);
                }
            }
            current = arena.next(id);
        }
    }
    None
}

/// Unlink `cmd` from the sequence starting at `head` and return it to the
/// caller, who decides whether to delete it.
///
/// A `BeginScript` takes its whole block with it: every command up to and
/// including the matching `EndScript` is deleted here.
pub fn remove_command(
    arena: &mut CommandArena,
    head: CommandId,
    cmd: CommandId,
) -> Result<CommandId, SequenceError> {
    if cmd == head {
        return Err(SequenceError::CannotRemoveHead);
    }
    let command = arena.command(cmd)?;
    if command.kind() != CommandKind::BeginScript {
        unlink(arena, head, cmd)?;
        return Ok(cmd);
    }

    if command.previous().is_none() {
        return Err(SequenceError::NullPrevious {
            type_name: command.type_name().to_string(),
            generating_string: command.generating_string().to_string(),
        });
    }
    let end = get_matching_end(arena, cmd).ok_or_else(|| SequenceError::UnmatchedBlock {
        type_name: command.type_name().to_string(),
        generating_string: command.generating_string().to_string(),
    })?;

    let mut current = arena.next(cmd);
    while let Some(id) = current {
        if id == end {
            break;
        }
        current = arena.next(id);
        unlink(arena, head, id)?;
        arena.delete(id)?;
    }
    unlink(arena, head, end)?;
    arena.delete(end)?;

    unlink(arena, head, cmd)?;
    debug!("removed script block {}", cmd);
    Ok(cmd)
}

/// Detach `cmd` from its neighbors, closing the gap it leaves. The node
/// comes out with no `previous` and no `next`.
fn unlink(arena: &mut CommandArena, head: CommandId, cmd: CommandId) -> Result<(), SequenceError> {
    let command = arena.command(cmd)?;
    let (previous, next) = (command.previous(), command.next());

    match previous {
        Some(previous) => arena.set_next(previous, next)?,
        None => {
            // First command of a branch: its owner holds the only link.
            let parent = get_parent_command(arena, head, cmd).ok_or_else(|| SequenceError::ParentNotFound {
                    type_name: command.type_name().to_string(),
                    generating_string: command.generating_string().to_string(),
                })?;
            let branch = arena
                .command(parent)?
                .children()
                .iter()
                .position(|child| *child == Some(cmd))
                .ok_or_else(|| SequenceError::ParentNotFound {
                    type_name: command.type_name().to_string(),
                    generating_string: command.generating_string().to_string(),
                })?;
            arena.set_child(parent, branch, next)?;
        }
    }
    arena.force_set_next(cmd, None)?;
    arena.set_previous(cmd, None)?;
    Ok(())
}

/// Remove and delete every command after `seq`, optionally calling
/// `run_complete` on each first, and delete `seq` too unless
/// `leave_first_cmd` is set. Always returns true.
pub fn clear_command_seq(
    arena: &mut CommandArena,
    seq: CommandId,
    leave_first_cmd: bool,
    call_run_complete: bool,
) -> bool {
    if !arena.contains(seq) {
        return true;
    }

    while let Some(cmd) = arena.next(seq) {
        if call_run_complete {
            run_complete_tree(arena, cmd);
        }
        match remove_command(arena, seq, cmd) {
            Ok(removed) => {
                if let Err(error) = arena.delete(removed) {
                    warn!("{}", error);
                }
            }
            Err(error) => {
                warn!("{}; unlinking {} without cleanup", error, cmd);
                let after = arena.next(cmd);
                let forced = arena
                    .force_set_next(cmd, None)
                    .and_then(|_| arena.set_next(seq, after))
                    .and_then(|_| arena.delete(cmd));
                if forced.is_err() {
                    break;
                }
            }
        }
    }

    if !leave_first_cmd {
        if call_run_complete {
            run_complete_tree(arena, seq);
        }
        if let Err(error) = arena.delete(seq) {
            warn!("{}", error);
        }
    }
    true
}

/// Whether `cmd1` is reachable from `cmd2` by following `next`, `cmd2`
/// itself included.
pub fn is_after(arena: &CommandArena, cmd1: CommandId, cmd2: CommandId) -> bool {
    let mut current = Some(cmd2);
    while let Some(id) = current {
        if id == cmd1 {
            return true;
        }
        current = arena.next(id);
    }
    false
}

/// Type name of the first command, from `cmd` forward and inside every
/// branch, that refers to `name` as an object of `object_type`.
///
/// A command that cannot answer for `object_type` counts as no match.
pub fn find_object(
    arena: &CommandArena,
    cmd: CommandId,
    object_type: ObjectType,
    name: &str,
) -> Option<String> {
    find_in_chain(arena, Some(cmd), object_type, name, 0)
}

fn find_in_chain(
    arena: &CommandArena,
    start: Option<CommandId>,
    object_type: ObjectType,
    name: &str,
    level: usize,
) -> Option<String> {
    let indent = "   ".repeat(level);
    let mut current = start;
    while let Some(id) = current {
        let command = arena.get(id)?;
        trace!("{}checking {} for {} \"{}\"", indent, command.type_name(), object_type, name);
        match command.ref_object_names(object_type) {
            Ok(names) if names.iter().any(|n| n == name) => {
                trace!("{}found in {}", indent, command.type_name());
                return Some(command.type_name().to_string());
            }
            Ok(_) => {}
            Err(error) => trace!("{}{}", indent, error),
        }
        for head in command.children().iter().flatten() {
            if let Some(found) = find_in_chain(arena, Some(*head), object_type, name, level + 1) {
                return Some(found);
            }
        }
        current = command.next();
    }
    None
}

/// A readable listing of the sequence starting at `cmd`, branches indented.
///
/// Top-level lines start with `indent_str`. Nested lines repeat
/// `indent_str` once more per level when it contains a space, and use
/// `"....."` per level followed by `indent_str` otherwise.
pub fn get_command_seq_string(
    arena: &CommandArena,
    cmd: CommandId,
    show_addr: bool,
    show_gen_str: bool,
    indent_str: &str,
) -> String {
    let mut out = String::from(SEQUENCE_HEADER);
    let mut current = Some(cmd);
    while let Some(id) = current {
        let Some(command) = arena.get(id) else {
            break;
        };
        out.push_str(indent_str);
        push_command_line(&mut out, arena, id, show_addr, show_gen_str);
        if command.has_children() {
            push_branches(&mut out, arena, id, 0, show_addr, show_gen_str, indent_str);
        }
        current = command.next();
    }
    out.push('\n');
    out
}

fn push_branches(
    out: &mut String,
    arena: &CommandArena,
    branch_cmd: CommandId,
    level: usize,
    show_addr: bool,
    show_gen_str: bool,
    indent_str: &str,
) {
    let Some(command) = arena.get(branch_cmd) else {
        return;
    };
    let step = if indent_str.contains(' ') {
        indent_str
    } else {
        "....."
    };

    for head in command.children().iter().flatten() {
        let mut current = Some(*head);
        while let Some(id) = current {
            let Some(child) = arena.get(id) else {
                break;
            };
            for _ in 0..=level {
                out.push_str(step);
            }
            out.push_str(indent_str);
            push_command_line(out, arena, id, show_addr, show_gen_str);
            if child.has_children() {
                push_branches(out, arena, id, level + 1, show_addr, show_gen_str, indent_str);
            }
            current = child.next();
        }
    }
}

fn push_command_line(
    out: &mut String,
    arena: &CommandArena,
    id: CommandId,
    show_addr: bool,
    show_gen_str: bool,
) {
    let Some(command) = arena.get(id) else {
        return;
    };
    if show_addr {
        out.push_str(&format!("({})", id));
    }
    out.push_str(command.type_name());
    if show_gen_str {
        out.push_str(&format!("  <{}>", command.generating_string()));
    }
    out.push('\n');
}

/// Every command reachable from `head`, each before its branches, branches
/// before the command that follows.
pub fn all_commands(arena: &CommandArena, head: CommandId) -> Vec<CommandId> {
    let mut found = Vec::new();
    collect_chain(arena, Some(head), &mut found);
    found
}

fn collect_chain(arena: &CommandArena, start: Option<CommandId>, found: &mut Vec<CommandId>) {
    let mut current = start;
    while let Some(id) = current {
        let Some(command) = arena.get(id) else {
            return;
        };
        found.push(id);
        for head in command.children().iter().flatten() {
            collect_chain(arena, Some(*head), found);
        }
        current = command.next();
    }
}

/// Call `run_complete` on `cmd` and everything in its branches.
pub fn run_complete_tree(arena: &mut CommandArena, cmd: CommandId) {
    let mut pending = vec![cmd];
    while let Some(id) = pending.pop() {
        let Some(command) = arena.get_mut(id) else {
            continue;
        };
        command.run_complete();
        let heads: Vec<CommandId> = command.children().iter().flatten().copied().collect();
        for head in heads {
            let mut current = Some(head);
            while let Some(child) = current {
                pending.push(child);
                current = arena.next(child);
            }
        }
    }
}
