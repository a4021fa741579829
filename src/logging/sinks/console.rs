use tracing_subscriber::{registry::LookupSpan, Layer};

use super::formatted_layer;
use crate::logging::config::ConsoleConfig;

/// Консольный слой (stdout) с форматом из конфигурации.
pub fn layer<S>(config: &ConsoleConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    formatted_layer(config.format, config.with_ansi, std::io::stdout)
}

#[cfg(test)]
mod tests {
    use tracing::info;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;
    use crate::logging::config::LogFormat;

    /// Тест проверяет, что слой строится и логирует без паники при
    /// любом формате.
    #[test]
    fn test_layer_logs_in_every_format() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            for with_ansi in [true, false] {
                let cfg = ConsoleConfig {
                    enabled: true,
                    format,
                    with_ansi,
                };
                let subscriber = Registry::default().with(layer(&cfg));
                tracing::subscriber::with_default(subscriber, || {
                    info!(?format, with_ansi, "console layer smoke test");
                });
            }
        }
    }
}
