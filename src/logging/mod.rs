pub mod config;
mod filters;
pub mod handle;
pub mod sinks;

pub use self::config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::LoggingError;

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный subscriber: `EnvFilter`, консольный вывод и,
/// если задан, файловый вывод. Повторный вызов вернёт
/// [`LoggingError::AlreadyInitialized`].
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.apply_env_overrides();
    config.validate()?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers = Vec::new();

    // Console layer
    if config.console.enabled {
        layers.push(sinks::console::layer(&config.console));
    }

    // File layer
    let file_guard = match &config.file {
        Some(file) if file.enabled => {
            let (file_layer, guard) = sinks::file::layer(file)?;
            layers.push(file_layer);
            Some(guard)
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        console_enabled = config.console.enabled,
        file_enabled = file_guard.is_some(),
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
