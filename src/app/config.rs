use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::coords::CoordinateMap;
use crate::app::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetApp {
    pub name: String,
    pub package: String,
    pub activity: String,
}

impl TargetApp {
    pub fn new(
        name: impl Into<String>,
        package: impl Into<String>,
        activity: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            activity: activity.into(),
        }
    }

    /// The three apps shipped as built-in presets, selectable by name.
    pub fn presets() -> Vec<TargetApp> {
        vec![
            TargetApp::new("douyin", "com.ss.android.ugc.aweme", ".main.MainActivity"),
            TargetApp::new("xiaohongshu", "com.xingin.xhs", ".activity.SplashActivity"),
            TargetApp::new("kuaishou", "com.smile.gifmaker", ".MainActivity"),
        ]
    }

    pub fn preset(name: &str) -> Option<TargetApp> {
        Self::presets()
            .into_iter()
            .find(|app| app.name.eq_ignore_ascii_case(name))
    }

    /// `pkg/activity` form accepted by `am start -n`.
    pub fn component(&self) -> String {
        format!("{}/{}", self.package, self.activity)
    }
}

impl Default for TargetApp {
    fn default() -> Self {
        TargetApp::new("douyin", "com.ss.android.ugc.aweme", ".main.MainActivity")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    #[serde(default)]
    pub target: TargetApp,
    #[serde(default)]
    pub user_ids: Vec<String>,
    /// Only the newest post is liked; kept for the config surface.
    #[serde(default = "default_likes_per_user")]
    pub likes_per_user: u32,
    #[serde(default = "default_delay_min")]
    pub delay_min: f64,
    #[serde(default = "default_delay_max")]
    pub delay_max: f64,
    #[serde(default = "default_cycle_count")]
    pub cycle_count: u32,
    /// Users processed between app restarts. Default 1: restart after every user.
    #[serde(default = "default_restart_interval")]
    pub app_restart_interval: u32,
    #[serde(default = "default_true")]
    pub enable_app_restart: bool,
    #[serde(default = "default_true")]
    pub enable_volume_key_stop: bool,
    #[serde(default)]
    pub coordinates: CoordinateMap,
}

fn default_likes_per_user() -> u32 {
    1
}

fn default_delay_min() -> f64 {
    2.0
}

fn default_delay_max() -> f64 {
    5.0
}

fn default_cycle_count() -> u32 {
    1
}

fn default_restart_interval() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            target: TargetApp::default(),
            user_ids: Vec::new(),
            likes_per_user: default_likes_per_user(),
            delay_min: default_delay_min(),
            delay_max: default_delay_max(),
            cycle_count: default_cycle_count(),
            app_restart_interval: default_restart_interval(),
            enable_app_restart: true,
            enable_volume_key_stop: true,
            coordinates: CoordinateMap::default(),
        }
    }
}

impl BotConfig {
    /// User ids with surrounding whitespace removed and blank lines dropped.
    pub fn trimmed_user_ids(&self) -> Vec<String> {
        self.user_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect()
    }

    /// Pre-run validation. Nothing touches the shell until this passes.
    pub fn validate_for_run(&self, trace_id: &str) -> Result<Vec<String>, AppError> {
        let user_ids = self.trimmed_user_ids();
        if user_ids.is_empty() {
            return Err(AppError::validation("User id list is empty", trace_id));
        }
        if self.delay_min < 0.0 || self.delay_max < 0.0 || self.delay_min > self.delay_max {
            return Err(AppError::validation(
                format!(
                    "Invalid delay bounds: min {} max {}",
                    self.delay_min, self.delay_max
                ),
                trace_id,
            ));
        }
        if self.cycle_count < 1 {
            return Err(AppError::validation(
                "Cycle count must be at least 1",
                trace_id,
            ));
        }
        if self.app_restart_interval < 1 {
            return Err(AppError::validation(
                "App restart interval must be at least 1",
                trace_id,
            ));
        }
        let missing = self.coordinates.missing_points();
        if !missing.is_empty() {
            return Err(AppError::validation(
                format!("Coordinate map is missing points: {}", missing.join(", ")),
                trace_id,
            ));
        }
        Ok(user_ids)
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("LIKEPILOT_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".likepilot_config.json")
}

pub fn backup_config_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".likepilot_config.backup.json")
}

pub fn load_config() -> Result<BotConfig, AppError> {
    load_config_from_path(&config_path())
}

pub fn save_config(config: &BotConfig) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path())
}

pub fn load_config_from_path(path: &Path) -> Result<BotConfig, AppError> {
    if !path.exists() {
        return Ok(BotConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), ""))?;
    let config: BotConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), ""))?;
    Ok(normalize_config(config))
}

pub fn save_config_to_path(
    config: &BotConfig,
    path: &Path,
    backup_path: &Path,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), ""))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), ""))?;
    Ok(())
}

/// Clamp out-of-range persisted values back to defaults rather than failing
/// the load; a hand-edited file should degrade, not brick the tool.
fn normalize_config(mut config: BotConfig) -> BotConfig {
    if config.likes_per_user < 1 {
        config.likes_per_user = default_likes_per_user();
    }
    if config.cycle_count < 1 {
        config.cycle_count = default_cycle_count();
    }
    if config.app_restart_interval < 1 {
        config.app_restart_interval = default_restart_interval();
    }
    if config.delay_min < 0.0 {
        config.delay_min = default_delay_min();
    }
    if config.delay_max < config.delay_min {
        config.delay_max = config.delay_min.max(default_delay_max());
    }
    if config.coordinates.screen_width < 1 || config.coordinates.screen_height < 1 {
        config.coordinates = CoordinateMap::default();
    }
    config
}
