use std::path::Path;

use serde::Deserialize;

use script::CommandRegistry;
use sequence::RunOptions;

/// Settings read from the `--config` TOML file.
///
/// ```toml
/// commands = ["Propagate2", "Report2"]
/// solver_types = ["VF13ad", "DifferentialCorrector", "MySolver"]
/// max_loop_iterations = 5000
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    /// Command keywords on top of the built-in set.
    pub commands: Vec<String>,
    /// Replaces the default solver object types when non-empty.
    pub solver_types: Vec<String>,
    pub max_loop_iterations: Option<usize>,
}

impl ScriptConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        Self::from_toml(&text).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("TOML parse error: {}", e))
    }

    pub fn registry(&self) -> CommandRegistry {
        CommandRegistry::with_commands(self.commands.iter().cloned())
    }

    pub fn run_options(&self) -> RunOptions {
        let mut options = RunOptions::default();
        if !self.solver_types.is_empty() {
            options.solver_types = self.solver_types.clone();
        }
        if let Some(limit) = self.max_loop_iterations {
            options.max_loop_iterations = limit;
        }
        options
    }
}
