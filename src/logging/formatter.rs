use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Слой форматирования для заданного writer.
///
/// Возвращаем boxed trait-объект, чтобы стереть конкретный тип формата
/// (json/pretty/compact) и writer.
pub fn build_formatter_from_config<S, W>(
    config: &LoggingConfig,
    format: LogFormat,
    with_ansi: bool,
    writer: W,
) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => Box::new(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(config.with_target),
        ),
        LogFormat::Pretty => Box::new(
            fmt::layer()
                .pretty()
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_ansi(with_ansi)
                .with_target(config.with_target),
        ),
        LogFormat::Compact => Box::new(
            fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(with_ansi)
                .with_target(config.with_target),
        ),
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;
    use crate::logging::test_writer::VecMakeWriter;

    /// Тест проверяет, что JSON-формат пишет структурированные поля.
    #[test]
    fn test_json_formatter_writes_fields() {
        let writer = VecMakeWriter::default();
        let layer = build_formatter_from_config::<Registry, _>(
            &LoggingConfig::default(),
            LogFormat::Json,
            true,
            writer.clone(),
        );
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(topic = "/user/queue/notice", "Subscribed");
        });

        let out = writer.contents();
        let line: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(line["fields"]["message"], "Subscribed");
        assert_eq!(line["fields"]["topic"], "/user/queue/notice");
    }

    /// Тест проверяет, что все форматы строятся и пишут сообщение.
    #[test]
    fn test_all_formats_write() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            let writer = VecMakeWriter::default();
            let layer = build_formatter_from_config::<Registry, _>(
                &LoggingConfig::default(),
                format,
                false,
                writer.clone(),
            );
            let subscriber = Registry::default().with(layer);
            tracing::subscriber::with_default(subscriber, || {
                tracing::warn!("connection lost");
            });
            assert!(writer.contents().contains("connection lost"), "{format:?}");
        }
    }
}
