pub mod console;
pub mod file;

use tracing_subscriber::{
    fmt::{self, MakeWriter},
    registry::LookupSpan,
    Layer,
};

use crate::logging::config::LogFormat;

/// Слой форматирования для произвольного writer'а.
pub(crate) fn formatted_layer<S, W>(
    format: LogFormat,
    with_ansi: bool,
    writer: W,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_ansi(with_ansi)
        .with_target(true)
        .with_writer(writer);

    match format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().boxed(),
    }
}
