use crate::error::{PastureOpsError, Result};
use crate::logic::scheduler::SimulationSettings;
use crate::models::{
    reference_operations, reference_pastures, FarmConstraints, OperationalRequirement,
    PastureRegistry, PastureUnit,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub farm: FarmConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub biomass: BiomassConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FarmConfig {
    pub farm_id: String,
    #[serde(default)]
    pub constraints: FarmConstraints,
    /// Inline registry records, used by `init` to seed the database.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pastures: Vec<PastureUnit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationalRequirement>,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            farm_id: "default-farm".into(),
            constraints: FarmConstraints::default(),
            pastures: reference_pastures(),
            operations: reference_operations(),
        }
    }
}

impl FarmConfig {
    pub fn registry(&self) -> PastureRegistry {
        PastureRegistry::new(self.pastures.clone(), self.operations.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub herd_demand_tonnes: f64,
    pub horizon_days: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            herd_demand_tonnes: 35.0,
            horizon_days: 90,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(flatten)]
    pub settings: SimulationSettings,
    /// Wall-clock budget for one simulation run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wall_time_ms: Option<u64>,
}

impl SimulationConfig {
    pub fn max_wall_time(&self) -> Option<Duration> {
        self.max_wall_time_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    #[default]
    Sqlite,
    Jsonl,
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub sink: AuditSinkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonl_path: Option<PathBuf>,
    pub user_id: String,
    pub model_versions: BTreeMap<String, String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        let mut model_versions = BTreeMap::new();
        model_versions.insert("allocator".into(), "greedy-1".into());
        model_versions.insert("carbon".into(), "linear-1".into());
        Self {
            enabled: true,
            sink: AuditSinkKind::Sqlite,
            jsonl_path: None,
            user_id: "system".into(),
            model_versions,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BiomassConfig {
    pub synthetic_seed: u64,
}

impl Default for BiomassConfig {
    fn default() -> Self {
        Self { synthetic_seed: 42 }
    }
}

impl Config {
    pub fn load(config_override: Option<&PathBuf>) -> Result<Self> {
        let config_path = match config_override {
            Some(p) => p.clone(),
            None => Self::find_config_path()?,
        };

        if !config_path.exists() {
            return Err(PastureOpsError::Config(format!(
                "Config file not found at {:?}. Run `pastureops init` to set up.",
                config_path
            )));
        }

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| PastureOpsError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&config_str)
    }

    /// Like [`Config::load`], but falls back to defaults when no file exists.
    pub fn load_or_default(config_override: Option<&PathBuf>) -> Result<Self> {
        if Self::exists(config_override) {
            Self::load(config_override)
        } else {
            tracing::debug!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let content = Self::substitute_env_vars(content);
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| PastureOpsError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.farm.farm_id.trim().is_empty() {
            return Err(PastureOpsError::Config("farm.farm_id must not be empty".into()));
        }
        if self.audit.enabled
            && self.audit.sink == AuditSinkKind::Jsonl
            && self.audit.jsonl_path.is_none()
        {
            return Err(PastureOpsError::Config(
                "audit.jsonl_path is required when audit.sink is jsonl".into(),
            ));
        }
        for pasture in &self.farm.pastures {
            pasture
                .validate()
                .map_err(|e| PastureOpsError::Config(format!("farm.pastures: {}", e)))?;
        }
        for op in &self.farm.operations {
            op.validate()
                .map_err(|e| PastureOpsError::Config(format!("farm.operations: {}", e)))?;
        }
        Ok(())
    }

    /// Search for config.yaml in standard locations.
    /// Returns the path of the first found config, or the XDG default path if none found.
    fn find_config_path() -> Result<PathBuf> {
        let local_config = PathBuf::from("config/config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("pastureops").join("config.yaml");
            if xdg_config.exists() {
                return Ok(xdg_config);
            }
        }

        Self::default_config_path()
    }

    /// Returns true if a config file can be found in any standard location.
    pub fn exists(config_override: Option<&PathBuf>) -> bool {
        match config_override {
            Some(p) => p.exists(),
            None => Self::find_config_path()
                .map(|p| p.exists())
                .unwrap_or(false),
        }
    }

    /// Default path for writing new config files (~/.config/pastureops/config.yaml).
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| PastureOpsError::Config("Cannot determine config directory".into()))?
            .join("pastureops");
        Ok(config_dir.join("config.yaml"))
    }

    /// Write this config as YAML with a header comment.
    pub fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let yaml = serde_yaml::to_string(self)
            .map_err(|e| PastureOpsError::Config(format!("Failed to serialize config: {}", e)))?;

        let content = format!(
            "# PastureOps Configuration\n# Generated by `pastureops init`\n# Environment variable substitution (${{VAR}}) is supported.\n\n{}",
            yaml
        );
        std::fs::write(path, content)?;
        Ok(())
    }

    fn substitute_env_vars(content: &str) -> String {
        let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!("Env substitution disabled: {}", e);
                return content.to_string();
            }
        };

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];
            if let Ok(value) = std::env::var(var_name) {
                result = result.replace(placeholder, &value);
            }
        }

        result
    }

    pub fn data_dir(data_dir_override: Option<&PathBuf>) -> Result<PathBuf> {
        // CLI override takes priority
        if let Some(dir) = data_dir_override {
            std::fs::create_dir_all(dir)?;
            return Ok(dir.clone());
        }

        if let Ok(dir) = std::env::var("PASTUREOPS_DATA_DIR") {
            let p = PathBuf::from(dir);
            std::fs::create_dir_all(&p)?;
            return Ok(p);
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| PastureOpsError::Config("Cannot determine data directory".into()))?
            .join("pastureops");

        std::fs::create_dir_all(&data_dir)?;
        Ok(data_dir)
    }

    pub fn db_path(data_dir_override: Option<&PathBuf>) -> Result<PathBuf> {
        Ok(Self::data_dir(data_dir_override)?.join("pastureops.db"))
    }
}
