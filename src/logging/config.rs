use std::{path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

use crate::LoggingError;

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Конфигурация консольного вывода.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub with_ansi: bool,
}

/// Конфигурация файлового вывода (ежедневная ротация).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_log_filename")]
    pub filename: String,
    #[serde(default = "default_file_format")]
    pub format: LogFormat,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Базовый уровень: `trace`, `debug`, `info`, `warn`, `error`, `off`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Дополнительные директивы `EnvFilter`, например `bobok::pubsub=trace`.
    #[serde(default)]
    pub directives: Vec<String>,
    #[serde(default)]
    pub console: ConsoleConfig,
    /// Файловый вывод; `None`: только консоль.
    #[serde(default)]
    pub file: Option<FileConfig>,
}

impl LoggingConfig {
    /// Применяет переопределения из окружения: `BOBOK_LOG_LEVEL`,
    /// `BOBOK_LOG_FORMAT`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("BOBOK_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = std::env::var("BOBOK_LOG_FORMAT") {
            match format.to_ascii_lowercase().as_str() {
                "pretty" => self.console.format = LogFormat::Pretty,
                "compact" => self.console.format = LogFormat::Compact,
                "json" => self.console.format = LogFormat::Json,
                other => eprintln!("Unknown BOBOK_LOG_FORMAT '{other}', keeping config value"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        LevelFilter::from_str(&self.level)
            .map(|_| ())
            .map_err(|_| LoggingError::InvalidLevel(self.level.clone()))
    }

    /// Директива для `EnvFilter`: базовый уровень плюс дополнительные.
    pub fn filter_directive(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directives: Vec::new(),
            console: ConsoleConfig::default(),
            file: None,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Pretty,
            with_ansi: true,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_log_dir(),
            filename: default_log_filename(),
            format: default_file_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_filename() -> String {
    "bobok.log".to_string()
}

fn default_file_format() -> LogFormat {
    LogFormat::Json
}
