//! Logging configuration
//!
//! Persisted with the rest of the settings; the application crate turns this
//! into a tracing subscriber at startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_level")]
    pub level: String,
    /// Mirror logs to stderr
    #[serde(default = "default_console_output")]
    pub console_output: bool,
    /// Write logs to a file under `log_dir`
    #[serde(default)]
    pub file_output: bool,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// How many old log files to keep
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_level() -> String {
    "info".to_string()
}
fn default_console_output() -> bool {
    true
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_max_files() -> usize {
    5
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_output: default_console_output(),
            file_output: false,
            log_dir: default_log_dir(),
            max_files: default_max_files(),
        }
    }
}

impl LogConfig {
    /// Parse the configured level, defaulting to INFO on anything invalid.
    pub fn parse_level(&self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;
        match self.level.to_ascii_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            "off" => LevelFilter::OFF,
            _ => LevelFilter::INFO,
        }
    }

    /// Create the log directory if missing.
    pub fn ensure_log_directory(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.log_dir)
    }

    /// Path of the log file for this run.
    pub fn current_log_path(&self) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.log_dir.join(format!("phaseflow-{stamp}.log"))
    }

    /// Delete the oldest log files beyond `max_files`.
    pub fn cleanup_old_logs(&self) -> std::io::Result<()> {
        let mut logs: Vec<PathBuf> = std::fs::read_dir(&self.log_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().map(|e| e == "log").unwrap_or(false)
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with("phaseflow-"))
                        .unwrap_or(false)
            })
            .collect();

        // Timestamped names sort chronologically
        logs.sort();
        if logs.len() > self.max_files {
            let excess = logs.len() - self.max_files;
            for path in logs.into_iter().take(excess) {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_level_parsing() {
        let mut config = LogConfig::default();
        assert_eq!(config.parse_level(), LevelFilter::INFO);

        config.level = "DEBUG".to_string();
        assert_eq!(config.parse_level(), LevelFilter::DEBUG);

        config.level = "garbage".to_string();
        assert_eq!(config.parse_level(), LevelFilter::INFO);
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LogConfig {
            log_dir: dir.path().to_path_buf(),
            max_files: 2,
            ..Default::default()
        };

        for i in 0..5 {
            std::fs::write(dir.path().join(format!("phaseflow-{i:010}.log")), "x")
                .expect("write log");
        }
        config.cleanup_old_logs().expect("cleanup");

        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 2);
        assert!(dir.path().join("phaseflow-0000000004.log").exists());
    }
}
