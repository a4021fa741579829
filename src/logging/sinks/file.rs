use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{registry::LookupSpan, Layer};

use super::formatted_layer;
use crate::{logging::config::FileConfig, LoggingError};

/// Файловый слой с ежедневной ротацией и неблокирующей записью.
///
/// `WorkerGuard` нужно держать, пока логирование используется: при его
/// уничтожении сбрасываются буферы.
pub fn layer<S>(
    config: &FileConfig
) -> Result<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard), LoggingError>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    std::fs::create_dir_all(&config.dir).map_err(|source| LoggingError::LogDir {
        path: config.dir.clone(),
        source,
    })?;

    let file_appender = daily(&config.dir, &config.filename);
    let (writer, guard) = non_blocking(file_appender);

    Ok((formatted_layer(config.format, false, writer), guard))
}
