//! Rule Catalog
//!
//! Maps `(mode, complexity level)` to the ordered rule modules the agent
//! loads before building. Rule modules are opaque: the catalog resolves which
//! identifiers apply and where their files live, never what they say.
//!
//! The built-in catalog covers the `build` mode. A TOML file can replace it:
//!
//! ```toml
//! [modes.build]
//! core = ["visual-maps/implement-mode-map", "Core/path-resolution"]
//! level1 = ["Level1/workflow-level1"]
//! level2 = ["Level2/workflow-level2"]
//! level3 = ["Level3/workflow-level3"]
//! level4 = ["Level4/workflow-level4"]
//! ```

use sdk::errors::EngineError;
use sdk::types::ComplexityLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Mode driven by `membank build`
pub const BUILD_MODE: &str = "build";

/// Rules loaded for every build regardless of complexity
const CORE_RULES: &[&str] = &[
    "visual-maps/implement-mode-map",
    "Core/path-resolution",
    "Core/command-execution",
];

const LEVEL1_RULES: &[&str] = &[
    "Level1/workflow-level1",
    "Level1/optimized-workflow-level1",
    "Level1/quick-documentation",
];

const LEVEL2_RULES: &[&str] = &["Level2/workflow-level2", "Level2/task-tracking-basic"];

const LEVEL3_RULES: &[&str] = &[
    "Level3/workflow-level3",
    "Level3/implementation-intermediate",
    "Level3/testing-approach",
];

const LEVEL4_RULES: &[&str] = &[
    "Level4/workflow-level4",
    "Level4/phased-implementation",
    "Level4/architectural-planning",
    "Level4/documentation-templates",
];

/// Rule lists of one mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeRules {
    #[serde(default)]
    pub core: Vec<String>,
    pub level1: Vec<String>,
    pub level2: Vec<String>,
    pub level3: Vec<String>,
    pub level4: Vec<String>,
}

impl ModeRules {
    fn for_level(&self, level: ComplexityLevel) -> &[String] {
        match level {
            ComplexityLevel::Level1 => &self.level1,
            ComplexityLevel::Level2 => &self.level2,
            ComplexityLevel::Level3 => &self.level3,
            ComplexityLevel::Level4 => &self.level4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCatalog {
    modes: BTreeMap<String, ModeRules>,
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleCatalog {
    /// Catalog shipped with the engine
    pub fn builtin() -> Self {
        let owned = |ids: &[&str]| ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
        let mut modes = BTreeMap::new();
        modes.insert(
            BUILD_MODE.to_string(),
            ModeRules {
                core: owned(CORE_RULES),
                level1: owned(LEVEL1_RULES),
                level2: owned(LEVEL2_RULES),
                level3: owned(LEVEL3_RULES),
                level4: owned(LEVEL4_RULES),
            },
        );
        Self { modes }
    }

    /// Parse a catalog from TOML; every level of every mode must list a rule
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let catalog: RuleCatalog = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("invalid rule catalog: {}", e)))?;

        if catalog.modes.is_empty() {
            return Err(EngineError::Config(
                "rule catalog defines no modes".to_string(),
            ));
        }
        for (mode, rules) in &catalog.modes {
            for level in ComplexityLevel::ALL {
                if rules.for_level(level).is_empty() {
                    return Err(EngineError::Config(format!(
                        "rule catalog mode '{}' lists no rules for {}",
                        mode, level
                    )));
                }
            }
        }
        Ok(catalog)
    }

    /// Load a catalog file
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path).await.map_err(|e| {
            EngineError::Config(format!(
                "failed to read rule catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        let catalog = Self::from_toml_str(&contents)?;
        debug!(
            "Loaded rule catalog {:?} with {} mode(s)",
            path,
            catalog.modes.len()
        );
        Ok(catalog)
    }

    pub fn modes(&self) -> impl Iterator<Item = &str> {
        self.modes.keys().map(String::as_str)
    }

    /// Rule set for a raw complexity level as recorded in a plan
    pub fn lookup(&self, mode: &str, level: &str) -> Result<RuleSet, EngineError> {
        let level: ComplexityLevel = level.parse()?;
        self.lookup_level(mode, level)
    }

    /// Core prefix followed by the level's own rules
    pub fn lookup_level(&self, mode: &str, level: ComplexityLevel) -> Result<RuleSet, EngineError> {
        let rules = self
            .modes
            .get(mode)
            .ok_or_else(|| EngineError::UnknownMode(mode.to_string()))?;

        let modules = rules
            .core
            .iter()
            .chain(rules.for_level(level))
            .cloned()
            .collect();

        Ok(RuleSet {
            mode: mode.to_string(),
            level,
            core_len: rules.core.len(),
            modules,
        })
    }
}

/// Ordered rule-module ids for one `(mode, level)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSet {
    pub mode: String,
    pub level: ComplexityLevel,
    /// Number of leading modules that come from the core prefix
    pub core_len: usize,
    pub modules: Vec<String>,
}

impl RuleSet {
    pub fn core(&self) -> &[String] {
        &self.modules[..self.core_len]
    }

    pub fn level_rules(&self) -> &[String] {
        &self.modules[self.core_len..]
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// File path of every module under `root`, e.g. `Core/path-resolution.mdc`
    pub fn resolve(&self, root: &Path, extension: &str) -> Vec<(String, PathBuf)> {
        self.modules
            .iter()
            .map(|id| (id.clone(), root.join(format!("{}.{}", id, extension))))
            .collect()
    }

    /// Modules whose files are absent under `root`
    pub async fn missing_modules(&self, root: &Path, extension: &str) -> Vec<String> {
        let mut missing = Vec::new();
        for (id, path) in self.resolve(root, extension) {
            if !fs::try_exists(&path).await.unwrap_or(false) {
                missing.push(id);
            }
        }
        missing
    }
}
