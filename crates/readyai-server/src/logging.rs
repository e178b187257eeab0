//! Tracing setup.
//!
//! Filters come from `RUST_LOG` when set; otherwise from a preset chosen on
//! the command line plus any `--log target=level` overrides. Output is plain
//! text or JSON lines.

use std::collections::BTreeMap;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const TARGET_PREFIX: &str = "readyai::";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Lifecycle events, settings edits and nudges.
    #[default]
    Production,
    Verbose,
    Debug,
    /// Everything, including per-message bridge traffic.
    Trace,
    /// Warnings and errors only.
    Quiet,
}

impl LogPreset {
    fn directives(self) -> &'static [&'static str] {
        match self {
            LogPreset::Production => &[
                "readyai::startup=info",
                "readyai::api=info",
                "readyai::settings=info",
                "readyai::sites=info",
                "readyai::coordinator=info",
                "readyai::probe=info",
                "readyai::bridge=info",
                "readyai::aggregator=warn",
                "readyai::frames=warn",
                "readyai::reporter=warn",
                "readyai::detector=warn",
                "tower_http=warn",
            ],
            LogPreset::Verbose => &["readyai=info", "tower_http=info"],
            LogPreset::Debug => &["readyai=debug", "tower_http=debug"],
            LogPreset::Trace => &["readyai=trace", "tower_http=trace"],
            LogPreset::Quiet => &["readyai=warn", "tower_http=error"],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Full target name to level.
    pub overrides: BTreeMap<String, Level>,
    pub format: LogFormat,
}

impl LogConfig {
    /// The most restrictive preset flag wins: quiet, then trace, debug, verbose.
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        let preset = match (quiet, trace, debug, verbose) {
            (true, ..) => LogPreset::Quiet,
            (_, true, ..) => LogPreset::Trace,
            (_, _, true, _) => LogPreset::Debug,
            (_, _, _, true) => LogPreset::Verbose,
            _ => LogPreset::Production,
        };

        let overrides = log_overrides
            .iter()
            .flat_map(|arg| arg.split(','))
            .filter_map(parse_override)
            .collect();

        Self {
            preset,
            overrides,
            format,
        }
    }

    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }

        let directives: Vec<String> = self
            .preset
            .directives()
            .iter()
            .map(|d| d.to_string())
            .chain(
                self.overrides
                    .iter()
                    .map(|(target, level)| format!("{}={}", target, level.as_str().to_lowercase())),
            )
            .collect();

        EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// `probe=debug` becomes `readyai::probe` at DEBUG. Unparseable entries are dropped.
fn parse_override(entry: &str) -> Option<(String, Level)> {
    let (target, level) = entry.split_once('=')?;
    let target = target.trim();
    let level = match level.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => return None,
    };
    let target = if target.starts_with(TARGET_PREFIX) || target == "tower_http" {
        target.to_string()
    } else {
        format!("{}{}", TARGET_PREFIX, target)
    };
    Some((target, level))
}

pub fn init(config: &LogConfig) {
    let filter = config.build_filter();
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_file(false).with_line_number(false))
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init(),
    }
}
