use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// Собирает `EnvFilter`: `RUST_LOG` имеет приоритет над конфигурацией.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    // Директива, полученная из конфига (например "info,bobok::pubsub=trace")
    let directive = config.filter_directive();

    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => match EnvFilter::try_new(&directive) {
            Ok(filter) => filter,
            Err(e) => {
                eprintln!(
                    "Invalid log filter directive from config ('{directive}'): {e}; falling back to 'info'"
                );
                EnvFilter::new("info")
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    // Мини-буферный writer для тестов
    struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            let mut locked = self.0.lock().unwrap();
            locked.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Тест проверяет, что некорректная директива не приводит к панике:
    /// фильтр откатывается на "info", даже если в конфиге указан "trace".
    #[test]
    #[serial]
    fn test_invalid_directive_falls_back() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "trace".into(),
            directives: vec!["bobok=not_a_level".into()],
            ..Default::default()
        };
        let filter = build_filter_from_config(&cfg);

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(VecMakeWriter(buffer.clone()))
            .with_filter(filter);
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("debug must be hidden by the fallback");
            tracing::info!("info passes the fallback");
        });

        let out = buffer.lock().unwrap();
        let s = String::from_utf8_lossy(&out);
        assert!(s.contains("info passes the fallback"));
        assert!(!s.contains("debug must be hidden"));
    }

    /// Тест проверяет поведение фильтра в runtime: при уровне "warn"
    /// сообщения info отбрасываются, а warn проходят.
    #[test]
    #[serial]
    fn test_config_level_filters_events() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "warn".into(),
            ..Default::default()
        };
        let filter = build_filter_from_config(&cfg);

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(VecMakeWriter(buffer.clone()))
            .with_filter(filter);
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("this is an info message that should be filtered out");
            tracing::warn!("this is a warn message that should pass through");
        });

        let out = buffer.lock().unwrap();
        let s = String::from_utf8_lossy(&out);
        assert!(s.contains("this is a warn message"));
        assert!(!s.contains("this is an info message"));
    }

    /// Тест проверяет, что RUST_LOG перекрывает уровень из конфигурации.
    #[test]
    #[serial]
    fn test_rust_log_takes_precedence() {
        env::set_var("RUST_LOG", "error");
        let cfg = LoggingConfig {
            level: "trace".into(),
            ..Default::default()
        };
        let filter = build_filter_from_config(&cfg);
        env::remove_var("RUST_LOG");

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(VecMakeWriter(buffer.clone()))
            .with_filter(filter);
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("warn should be hidden by RUST_LOG=error");
            tracing::error!("error should pass");
        });

        let out = buffer.lock().unwrap();
        let s = String::from_utf8_lossy(&out);
        assert!(s.contains("error should pass"));
        assert!(!s.contains("warn should be hidden"));
    }
}
