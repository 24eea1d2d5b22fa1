use std::path::PathBuf;

/// Service configuration, loaded from `ZONEMAP_*` environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the optional tuning TOML file.
    pub tuning_path: PathBuf,
    /// Upper bound on processed detector frames per second; faster
    /// frames are answered from the last snapshot.
    pub max_frame_hz: f64,
}

impl Config {
    /// Load configuration with defaults under the XDG data directory.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("zonemap");

        let db_path = std::env::var("ZONEMAP_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("zonemap.db"));

        let tuning_path = std::env::var("ZONEMAP_TUNING_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("tuning.toml"));

        Self {
            db_path,
            tuning_path,
            max_frame_hz: env_f64("ZONEMAP_MAX_FRAME_HZ", 8.0),
        }
    }

    /// Minimum interval between processed frames.
    pub fn min_frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.max_frame_hz.max(0.1))
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
