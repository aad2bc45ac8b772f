use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::{DEFAULT_EXPIRY_WINDOW_DAYS, DEFAULT_RECENT_LIMIT};
use crate::error::AppError;
use crate::face::{DEFAULT_INTERVAL, DEFAULT_LUXAND_URL, DEFAULT_MATCH_THRESHOLD, DEFAULT_WARMUP};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://gym.db";
pub const DEFAULT_FRAME_DIR: &str = "frames";

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

/// Runtime settings read from the process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub face_api_url: String,
    pub face_api_key: Option<String>,
    pub face_match_threshold: f64,
    pub scan_warmup: Duration,
    pub scan_interval: Duration,
    pub camera_frame_dir: PathBuf,
    pub expiry_warning_days: u32,
    pub recent_activity_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            face_api_url: DEFAULT_LUXAND_URL.to_string(),
            face_api_key: None,
            face_match_threshold: DEFAULT_MATCH_THRESHOLD,
            scan_warmup: DEFAULT_WARMUP,
            scan_interval: DEFAULT_INTERVAL,
            camera_frame_dir: PathBuf::from(DEFAULT_FRAME_DIR),
            expiry_warning_days: DEFAULT_EXPIRY_WINDOW_DAYS,
            recent_activity_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

fn text(key: &str) -> Option<String> {
    dotenvy::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &str, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match text(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Validation(format!("{} has an invalid value {:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let face_match_threshold = parsed("FACE_MATCH_THRESHOLD", defaults.face_match_threshold)?;
        if !(0.0..=1.0).contains(&face_match_threshold) {
            return Err(AppError::Validation(
                "FACE_MATCH_THRESHOLD must be between 0 and 1".to_string(),
            ));
        }

        let warmup_ms = parsed("SCAN_WARMUP_MS", defaults.scan_warmup.as_millis() as u64)?;
        let interval_ms = parsed("SCAN_INTERVAL_MS", defaults.scan_interval.as_millis() as u64)?;

        let settings = Self {
            database_url: text("DATABASE_URL").unwrap_or(defaults.database_url),
            face_api_url: text("FACE_API_URL").unwrap_or(defaults.face_api_url),
            face_api_key: text("FACE_API_KEY"),
            face_match_threshold,
            scan_warmup: Duration::from_millis(warmup_ms),
            scan_interval: Duration::from_millis(interval_ms.max(1)),
            camera_frame_dir: text("CAMERA_FRAME_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.camera_frame_dir),
            expiry_warning_days: parsed("EXPIRY_WARNING_DAYS", defaults.expiry_warning_days)?,
            recent_activity_limit: parsed("RECENT_ACTIVITY_LIMIT", defaults.recent_activity_limit)?,
        };

        if settings.face_api_key.is_none() {
            warn!("FACE_API_KEY is not set; face check-in is disabled");
        }

        Ok(settings)
    }
}
