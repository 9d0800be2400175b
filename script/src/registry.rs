use std::collections::BTreeSet;

/// Command keywords known out of the box.
pub const BUILTIN_COMMANDS: &[&str] = &[
    "Achieve",
    "BeginFiniteBurn",
    "BeginMissionSequence",
    "BeginScript",
    "CallFunction",
    "ClearPlot",
    "Else",
    "EndFiniteBurn",
    "EndFor",
    "EndIf",
    "EndOptimize",
    "EndScript",
    "EndTarget",
    "EndWhile",
    "For",
    "If",
    "Maneuver",
    "MarkPoint",
    "Minimize",
    "NoOp",
    "NonlinearConstraint",
    "Optimize",
    "PenDown",
    "PenUp",
    "Propagate",
    "Report",
    "Save",
    "Stop",
    "Target",
    "Toggle",
    "Vary",
    "While",
];

/// The set of words the text parser treats as command keywords.
///
/// Built once by whoever sets up the compiler and handed to each parser;
/// the parser only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRegistry {
    names: BTreeSet<String>,
}

impl CommandRegistry {
    pub fn empty() -> Self {
        CommandRegistry {
            names: BTreeSet::new(),
        }
    }

    /// The built-in keywords plus `extra`.
    pub fn with_commands<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::default();
        registry.names.extend(extra.into_iter().map(Into::into));
        registry
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        CommandRegistry {
            names: BUILTIN_COMMANDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}
