use crate::command::{ObjectType, referenced_identifiers, replace_whole_word};

/// A registered keyword with no behavior of its own, e.g. `Propagate`,
/// `Report` or `Toggle`. The arguments are kept verbatim.
#[derive(Debug, Clone, Default)]
pub struct Generic {
    arguments: String,
}

impl Generic {
    pub fn new(arguments: &str) -> Self {
        Generic {
            arguments: arguments.trim().to_string(),
        }
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    /// Every identifier in the arguments; the grammar is unknown, so the
    /// object type cannot narrow the answer.
    pub(crate) fn ref_object_names(&self, _object_type: ObjectType) -> Vec<String> {
        referenced_identifiers(&self.arguments)
    }

    pub(crate) fn rename(&mut self, old: &str, new: &str) -> bool {
        let renamed = replace_whole_word(&self.arguments, old, new);
        if renamed == self.arguments {
            return false;
        }
        self.arguments = renamed;
        true
    }
}
