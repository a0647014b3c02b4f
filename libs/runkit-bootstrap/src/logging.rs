//! Process-wide `tracing` subscriber.
//!
//! Console output goes to a non-blocking stderr writer; records whose target
//! matches a section with a `file` also go, as JSON, to a size-rotated file.
//! Section keys are target prefixes ("runkit", "runkit_demo::services"); the
//! "default" section covers everything else. `RUST_LOG`, when set, caps both sinks.

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use runkit::logger::LogSinkHandle;
use runkit::{parse_level_filter, LogSink};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{AppConfig, LoggingConfig, Section};

// Keep a guard for non-blocking console to avoid being dropped.
static CONSOLE_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

const DEFAULT_SECTION: &str = "default";
const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// Returns true if target == prefix or target starts with "prefix::"
fn matches_target_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

// ================= file routing =================

/// Routes each record to the file of the longest matching target prefix,
/// falling back to the default file. Records with no file are dropped.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<LogSink>,
    // Sorted longest prefix first.
    by_prefix: Vec<(String, LogSink)>,
}

impl FileRouter {
    fn route(&self, target: &str) -> Option<&LogSink> {
        self.by_prefix
            .iter()
            .find(|(prefix, _)| matches_target_prefix(target, prefix))
            .map(|(_, sink)| sink)
            .or(self.default.as_ref())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }
}

struct RoutedWriter(Option<LogSinkHandle>);

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for FileRouter {
    type Writer = RoutedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedWriter(self.default.as_ref().map(|s| s.make_writer()))
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RoutedWriter(self.route(meta.target()).map(|s| s.make_writer()))
    }
}

fn rotating_sink(section: &Section, base_dir: &Path) -> std::io::Result<LogSink> {
    let log_path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Prefer a file count if given, else an age limit.
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            i64::from(section.max_age_days.unwrap_or(1)),
        )),
    };
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024;

    let rot = FileRotate::new(
        log_path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Ok(LogSink::new(rot))
}

// ================= plan =================

/// Console and file filters plus file writers derived from one `LoggingConfig`.
struct SinkPlan {
    console: Targets,
    file: Targets,
    router: FileRouter,
}

fn plan(cfg: &LoggingConfig, base_dir: &Path) -> SinkPlan {
    let default = cfg.get(DEFAULT_SECTION);
    let mut router = FileRouter::default();

    let has_file = |s: &Section| !s.file.trim().is_empty();
    let open = |name: &str, s: &Section| match rotating_sink(s, base_dir) {
        Ok(sink) => Some(sink),
        Err(e) => {
            eprintln!(
                "Failed to init log file for '{name}': {} ({e})",
                resolve_log_path(&s.file, base_dir).display()
            );
            None
        }
    };

    if let Some(section) = default.filter(|s| has_file(*s)) {
        router.default = open(DEFAULT_SECTION, section);
    }

    let console_default = default
        .map(|s| parse_level_filter(&s.console_level))
        .unwrap_or(LevelFilter::INFO);
    let file_default = match default {
        Some(s) if router.default.is_some() => parse_level_filter(&s.file_level),
        _ => LevelFilter::OFF,
    };
    let mut console = Targets::new().with_default(console_default);
    let mut file = Targets::new().with_default(file_default);

    for (prefix, section) in cfg.iter().filter(|(k, _)| k.as_str() != DEFAULT_SECTION) {
        console = console.with_target(prefix.clone(), parse_level_filter(&section.console_level));
        if has_file(section) {
            if let Some(sink) = open(prefix.as_str(), section) {
                router.by_prefix.push((prefix.clone(), sink));
                file = file.with_target(prefix.clone(), parse_level_filter(&section.file_level));
            }
        }
    }
    router
        .by_prefix
        .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));

    SinkPlan {
        console,
        file,
        router,
    }
}

// ================= public init =================

/// Installs the global subscriber described by `config.logging` (or the
/// built-in defaults), resolving relative log files against `home_dir`.
pub fn init_logging(config: &AppConfig) {
    let logging = config
        .logging
        .clone()
        .unwrap_or_else(crate::config::default_logging_config);
    init_logging_unified(&logging, &config.home_path());
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init_logging_unified(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` → `tracing` *before* installing the subscriber
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    if cfg.is_empty() {
        init_minimal();
        return;
    }

    let SinkPlan {
        console,
        file,
        router,
    } = plan(cfg, base_dir);

    // RUST_LOG acts as a global upper bound when present.
    let env = EnvFilter::try_from_default_env().ok();

    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(nb_stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console);

    let file_layer = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(file)
    });

    let _ = tracing_subscriber::registry()
        .with(env)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// INFO to stderr, honoring RUST_LOG.
fn init_minimal() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339()),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_age_days: None,
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn prefix_matching_respects_path_boundaries() {
        assert!(matches_target_prefix("runkit", "runkit"));
        assert!(matches_target_prefix("runkit::registry", "runkit"));
        assert!(!matches_target_prefix("runkit_bootstrap", "runkit"));
        assert!(!matches_target_prefix("run", "runkit"));
    }

    #[test]
    fn plan_opens_files_and_routes_longest_prefix_first() {
        let tmp = tempdir().unwrap();
        let mut cfg: LoggingConfig = HashMap::new();
        cfg.insert("default".into(), section("info", "logs/all.log", "debug"));
        cfg.insert("runkit".into(), section("warn", "logs/runkit.log", "info"));
        cfg.insert(
            "runkit::runtime".into(),
            section("debug", "logs/runtime.log", "trace"),
        );
        cfg.insert("noisy".into(), section("off", "", ""));

        let plan = plan(&cfg, tmp.path());

        assert!(tmp.path().join("logs").is_dir());
        assert!(plan.router.default.is_some());
        let prefixes: Vec<&str> = plan
            .router
            .by_prefix
            .iter()
            .map(|(p, _)| p.as_str())
            .collect();
        assert_eq!(prefixes, ["runkit::runtime", "runkit"]);
        assert!(plan.router.route("runkit::runtime::shutdown").is_some());
        assert!(plan.router.route("elsewhere").is_some());
    }

    #[test]
    fn no_default_file_means_file_sink_is_off_by_default() {
        let tmp = tempdir().unwrap();
        let mut cfg: LoggingConfig = HashMap::new();
        cfg.insert("default".into(), section("debug", "", "debug"));

        let plan = plan(&cfg, tmp.path());

        assert!(plan.router.is_empty());
        assert!(plan.router.route("anything").is_none());
    }
}
