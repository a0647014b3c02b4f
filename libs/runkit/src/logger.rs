//! Per-service labeled loggers.
//!
//! A [`ServiceLogger`] owns its own `tracing` dispatcher built from a `fmt`
//! subscriber, so its level and destination are independent of the process-wide
//! subscriber. Every line starts with a `[name]` label, colored per service on
//! ANSI sinks, and carries a `service` field with the service name.

use std::fmt;
use std::io::{IsTerminal, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::MakeWriter;

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Destination for service log lines.
///
/// Clones share one underlying writer; writes are serialized by a lock.
#[derive(Clone)]
pub struct LogSink {
    writer: SharedWriter,
    ansi: bool,
}

impl LogSink {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            ansi: false,
        }
    }

    pub fn stdout() -> Self {
        let ansi = std::io::stdout().is_terminal();
        Self {
            ansi,
            ..Self::new(std::io::stdout())
        }
    }

    pub fn stderr() -> Self {
        let ansi = std::io::stderr().is_terminal();
        Self {
            ansi,
            ..Self::new(std::io::stderr())
        }
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").field("ansi", &self.ansi).finish()
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSinkHandle;

    fn make_writer(&'a self) -> Self::Writer {
        LogSinkHandle(self.writer.clone())
    }
}

pub struct LogSinkHandle(SharedWriter);

impl Write for LogSinkHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

/// Logger handed to [`LoggerBound`](crate::LoggerBound) services.
#[derive(Clone)]
pub struct ServiceLogger {
    name: Arc<str>,
    label: Arc<str>,
    level: LevelFilter,
    sink: LogSink,
    dispatch: Dispatch,
}

impl fmt::Debug for ServiceLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLogger")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("sink", &self.sink)
            .finish()
    }
}

impl ServiceLogger {
    pub fn new(name: impl Into<Arc<str>>, level: LevelFilter, sink: LogSink) -> Self {
        let name: Arc<str> = name.into();
        let dispatch = build_dispatch(level, &sink);
        Self {
            label: label(&name, sink.ansi).into(),
            name,
            level,
            sink,
            dispatch,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Same label and sink, different level.
    pub fn with_level(&self, level: LevelFilter) -> Self {
        Self::new(self.name.clone(), level, self.sink.clone())
    }

    /// Same label and level, different sink.
    pub fn with_sink(&self, sink: LogSink) -> Self {
        Self::new(self.name.clone(), self.level, sink)
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.level >= level
    }

    /// Run `f` with this logger's dispatcher as the thread default, so plain
    /// `tracing` macros inside it go to this service's sink.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    pub fn trace(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::trace!(service = &*self.name, "{} {message}", self.label));
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::debug!(service = &*self.name, "{} {message}", self.label));
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::info!(service = &*self.name, "{} {message}", self.label));
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::warn!(service = &*self.name, "{} {message}", self.label));
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::error!(service = &*self.name, "{} {message}", self.label));
    }
}

// 256-color codes that stay readable on dark and light backgrounds.
const LABEL_COLORS: [u8; 12] = [31, 32, 33, 34, 35, 36, 69, 105, 141, 166, 172, 208];

/// FNV-1a, so a name keeps its color across runs and builds.
fn name_hash(name: &str) -> u32 {
    name.bytes()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193))
}

fn label(name: &str, ansi: bool) -> String {
    if !ansi {
        return format!("[{name}]");
    }
    let color = LABEL_COLORS[name_hash(name) as usize % LABEL_COLORS.len()];
    format!("\x1b[38;5;{color}m[{name}]\x1b[0m")
}

fn build_dispatch(level: LevelFilter, sink: &LogSink) -> Dispatch {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .with_max_level(level)
        .with_ansi(sink.ansi)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .finish();
    Dispatch::new(subscriber)
}


#[cfg(test)]
mod tests {
    use super::testing::Capture;
    use super::*;

    #[test]
    fn lines_are_labeled_with_service_name() {
        let capture = Capture::default();
        let logger = ServiceLogger::new("billing", LevelFilter::INFO, capture.sink());

        logger.info("ready to charge");

        let out = capture.contents();
        assert!(out.contains("ready to charge"), "{out}");
        assert!(out.contains("billing"), "{out}");
        assert!(out.contains("INFO"), "{out}");
    }

    #[test]
    fn messages_below_level_are_dropped() {
        let capture = Capture::default();
        let logger = ServiceLogger::new("billing", LevelFilter::WARN, capture.sink());

        logger.debug("hidden-debug");
        logger.info("hidden-info");
        logger.warn("visible-warn");
        logger.error("visible-error");

        let out = capture.contents();
        assert!(!out.contains("hidden-debug"), "{out}");
        assert!(!out.contains("hidden-info"), "{out}");
        assert!(out.contains("visible-warn"), "{out}");
        assert!(out.contains("visible-error"), "{out}");
    }

    #[test]
    fn with_level_and_with_sink_keep_the_label() {
        let first = Capture::default();
        let second = Capture::default();
        let logger = ServiceLogger::new("cache", LevelFilter::ERROR, first.sink());

        let louder = logger.with_level(LevelFilter::DEBUG).with_sink(second.sink());
        assert_eq!(louder.name(), "cache");
        assert!(louder.enabled(Level::DEBUG));
        assert!(!logger.enabled(Level::WARN));

        louder.debug("moved");
        assert!(first.contents().is_empty());
        assert!(second.contents().contains("moved"));
    }

    #[test]
    fn plain_sinks_get_a_bracketed_label() {
        let capture = Capture::default();
        ServiceLogger::new("billing", LevelFilter::INFO, capture.sink()).info("ready");

        let out = capture.contents();
        assert!(out.contains("[billing] ready"), "{out}");
        assert!(!out.contains('\x1b'), "{out}");
    }

    #[test]
    fn ansi_label_color_is_stable_per_name() {
        assert_eq!(label("billing", true), label("billing", true));
        assert!(label("billing", true).starts_with("\x1b[38;5;"));
        assert!(label("billing", true).contains("[billing]"));
        assert_eq!(label("billing", false), "[billing]");
    }
}
