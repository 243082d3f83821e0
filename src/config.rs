use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::promotion::{PromotionPolicy, PROMOTE_CONFIDENCE, PROMOTE_SUPPORT};

pub const DEFAULT_USER: &str = "default_user";
pub const DEFAULT_EDIT_CONFIDENCE: f64 = 0.75;
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 24;

const ENV_DB_PATH: &str = "SECTION_MEMORY_DB";
const ENV_DEFAULT_USER: &str = "SECTION_MEMORY_DEFAULT_USER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Bucket consulted when the requesting user has no rule of their own.
    pub default_user: String,
    pub promote_support: u32,
    pub promote_confidence: f64,
    /// Confidence assumed for an edit whose collaborator reported none.
    pub default_confidence: f64,
    pub session_ttl_hours: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path().unwrap_or_else(|_| PathBuf::from("sections.sqlite")),
            default_user: DEFAULT_USER.to_string(),
            promote_support: PROMOTE_SUPPORT,
            promote_confidence: PROMOTE_CONFIDENCE,
            default_confidence: DEFAULT_EDIT_CONFIDENCE,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config: {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("failed to parse config: {}", path.display()))?
            }
            None => AppConfig::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db_path) = lookup(ENV_DB_PATH).filter(|value| !value.trim().is_empty()) {
            self.db_path = PathBuf::from(db_path);
        }
        if let Some(user) = lookup(ENV_DEFAULT_USER).filter(|value| !value.trim().is_empty()) {
            self.default_user = user.trim().to_string();
        }
    }

    pub fn promotion_policy(&self) -> PromotionPolicy {
        PromotionPolicy {
            min_support: self.promote_support,
            min_confidence: self.promote_confidence,
        }
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("com", "hellhbbd", "section-memory")
        .ok_or_else(|| anyhow!("unable to resolve data directory"))?;
    Ok(project_dirs.data_local_dir().join("sections.sqlite"))
}
