// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log routing.
//!
//! The library logs through the `log` facade, with targets of the form
//! `ftl::<element>::...` (`ftl::queue`, `ftl::realm`, ...). Applications that
//! already install a `log` backend (for example `env_logger`) need nothing
//! from this module except, optionally, [`set_log_level`].
//!
//! Applications without a backend can install one of the built-in sinks:
//!
//! ```no_run
//! ftl::logging::init_console("info,queue=debug").unwrap();
//! ftl::logging::set_log_callback("warn", |level, line| {
//!     eprintln!("{}: {}", level, line);
//! })
//! .unwrap();
//! ```
//!
//! A level spec is a default level optionally followed by per-element
//! overrides: `"<level>[,<element>=<level>]*"`. Levels are `off`, `severe`,
//! `warn`, `info`, `verbose` and `debug`.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Log verbosity, least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Off,
    Severe,
    Warn,
    Info,
    Verbose,
    Debug,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Severe => "severe",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
        }
    }

    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Severe => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Verbose => log::LevelFilter::Debug,
            Self::Debug => log::LevelFilter::Trace,
        }
    }

    fn from_log_level(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Severe,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Verbose,
            log::Level::Trace => Self::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "severe" => Ok(Self::Severe),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "verbose" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            other => Err(Error::InvalidArg(format!("unknown log level '{}'", other))),
        }
    }
}

/// Default level plus per-element overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSpec {
    default: LogLevel,
    elements: Vec<(String, LogLevel)>,
}

impl LevelSpec {
    pub fn new(default: LogLevel) -> Self {
        Self {
            default,
            elements: Vec::new(),
        }
    }

    /// Effective level for a `log` target.
    pub fn level_for(&self, target: &str) -> LogLevel {
        let element = target
            .strip_prefix("ftl::")
            .map(|rest| rest.split("::").next().unwrap_or(rest));
        element
            .and_then(|el| {
                self.elements
                    .iter()
                    .find(|(name, _)| name == el)
                    .map(|(_, level)| *level)
            })
            .unwrap_or(self.default)
    }

    /// Most verbose level any target can reach.
    pub fn max_level(&self) -> LogLevel {
        self.elements
            .iter()
            .map(|(_, l)| *l)
            .fold(self.default, LogLevel::max)
    }
}

impl FromStr for LevelSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(',');
        let default = parts.next().unwrap_or_default().parse()?;
        let mut elements = Vec::new();
        for part in parts {
            let (name, level) = part.split_once('=').ok_or_else(|| {
                Error::InvalidArg(format!("expected <element>=<level>, got '{}'", part))
            })?;
            let name = name.trim();
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
                return Err(Error::InvalidArg(format!("bad log element '{}'", name)));
            }
            elements.push((name.to_string(), level.parse()?));
        }
        Ok(Self { default, elements })
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Destination for formatted log lines.
pub trait Output: Send + Sync {
    fn write(&self, level: LogLevel, line: &str) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes to stderr.
pub struct ConsoleOutput;

impl Output for ConsoleOutput {
    fn write(&self, _level: LogLevel, line: &str) -> io::Result<()> {
        let mut err = io::stderr().lock();
        writeln!(err, "{}", line)
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Hands each line to an application closure.
pub struct CallbackOutput {
    callback: Box<dyn Fn(LogLevel, &str) + Send + Sync>,
}

impl CallbackOutput {
    pub fn new(callback: impl Fn(LogLevel, &str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl Output for CallbackOutput {
    fn write(&self, level: LogLevel, line: &str) -> io::Result<()> {
        (self.callback)(level, line);
        Ok(())
    }
}

struct FileState {
    file: File,
    written: u64,
}

/// Size-rotated log files: `<prefix>.log`, `<prefix>.1.log`, ...
pub struct FileOutput {
    prefix: PathBuf,
    max_file_size: u64,
    max_files: u32,
    state: Mutex<FileState>,
}

impl FileOutput {
    pub fn new(prefix: impl Into<PathBuf>, max_file_size: u64, max_files: u32) -> Result<Self> {
        if max_file_size == 0 || max_files == 0 {
            return Err(Error::InvalidArg(
                "log file size and count must be positive".into(),
            ));
        }
        let prefix = prefix.into();
        let file = Self::open(&Self::path_for(&prefix, 0))?;
        Ok(Self {
            prefix,
            max_file_size,
            max_files,
            state: Mutex::new(FileState { file, written: 0 }),
        })
    }

    fn path_for(prefix: &std::path::Path, index: u32) -> PathBuf {
        let mut name = prefix.as_os_str().to_os_string();
        if index == 0 {
            name.push(".log");
        } else {
            name.push(format!(".{}.log", index));
        }
        PathBuf::from(name)
    }

    fn open(path: &std::path::Path) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }

    fn rotate(&self, state: &mut FileState) -> io::Result<()> {
        state.file.flush()?;
        for index in (0..self.max_files.saturating_sub(1)).rev() {
            let from = Self::path_for(&self.prefix, index);
            if from.exists() {
                fs::rename(&from, Self::path_for(&self.prefix, index + 1))?;
            }
        }
        state.file = Self::open(&Self::path_for(&self.prefix, 0))?;
        state.written = 0;
        Ok(())
    }
}

impl Output for FileOutput {
    fn write(&self, _level: LogLevel, line: &str) -> io::Result<()> {
        let mut state = self.state.lock();
        let len = line.len() as u64 + 1;
        if state.written > 0 && state.written + len > self.max_file_size {
            self.rotate(&mut state)?;
        }
        writeln!(state.file, "{}", line)?;
        state.written += len;
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        self.state.lock().file.flush()
    }
}

// ============================================================================
// Global logger
// ============================================================================

struct Sink {
    output: Arc<dyn Output>,
    spec: LevelSpec,
}

struct FtlLogger {
    sink: ArcSwapOption<Sink>,
}

static LOGGER: FtlLogger = FtlLogger {
    sink: ArcSwapOption::const_empty(),
};

impl log::Log for FtlLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        let guard = self.sink.load();
        match &*guard {
            Some(sink) => {
                sink.spec.level_for(metadata.target()) >= LogLevel::from_log_level(metadata.level())
            }
            None => false,
        }
    }

    fn log(&self, record: &log::Record<'_>) {
        let guard = self.sink.load();
        let Some(sink) = &*guard else {
            return;
        };
        let level = LogLevel::from_log_level(record.level());
        if sink.spec.level_for(record.target()) < level {
            return;
        }
        let line = format!(
            "[{:<7}] {}: {}",
            level.as_str().to_ascii_uppercase(),
            record.target(),
            record.args()
        );
        // A failing sink has nowhere to report to.
        let _ = sink.output.write(level, &line);
    }

    fn flush(&self) {
        if let Some(sink) = self.sink.load_full() {
            let _ = sink.output.flush();
        }
    }
}

fn install(output: Arc<dyn Output>, spec: LevelSpec) -> Result<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let registered = *REGISTERED.get_or_init(|| log::set_logger(&LOGGER).is_ok());
    if !registered {
        return Err(Error::IllegalState(
            "another log backend is already installed".into(),
        ));
    }
    log::set_max_level(spec.max_level().to_level_filter());
    LOGGER.sink.store(Some(Arc::new(Sink { output, spec })));
    Ok(())
}

/// Log to stderr at `spec`.
pub fn init_console(spec: &str) -> Result<()> {
    install(Arc::new(ConsoleOutput), spec.parse()?)
}

/// Route log lines to `callback`.
pub fn set_log_callback(
    spec: &str,
    callback: impl Fn(LogLevel, &str) + Send + Sync + 'static,
) -> Result<()> {
    install(Arc::new(CallbackOutput::new(callback)), spec.parse()?)
}

/// Log to size-rotated files starting at `<prefix>.log`.
pub fn set_log_files(prefix: &str, max_file_size: u64, max_files: u32, spec: &str) -> Result<()> {
    let spec: LevelSpec = spec.parse()?;
    install(
        Arc::new(FileOutput::new(prefix, max_file_size, max_files)?),
        spec,
    )
}

/// Change verbosity.
///
/// Applies to the installed built-in sink; with a foreign `log` backend only
/// the global maximum level is adjusted.
pub fn set_log_level(spec: &str) -> Result<()> {
    let spec: LevelSpec = spec.parse()?;
    log::set_max_level(spec.max_level().to_level_filter());
    if let Some(current) = LOGGER.sink.load_full() {
        LOGGER.sink.store(Some(Arc::new(Sink {
            output: Arc::clone(&current.output),
            spec,
        })));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names_and_order() {
        for level in [
            LogLevel::Off,
            LogLevel::Severe,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Verbose,
            LogLevel::Debug,
        ] {
            assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), level);
        }
        assert!(LogLevel::Severe < LogLevel::Debug);
        assert_eq!(LogLevel::Verbose.to_level_filter(), log::LevelFilter::Debug);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_spec() {
        let spec: LevelSpec = "warn,queue=debug,realm=off".parse().unwrap();
        assert_eq!(spec.level_for("ftl::queue::timer"), LogLevel::Debug);
        assert_eq!(spec.level_for("ftl::realm"), LogLevel::Off);
        assert_eq!(spec.level_for("ftl::matcher"), LogLevel::Warn);
        assert_eq!(spec.level_for("other_crate"), LogLevel::Warn);
        assert_eq!(spec.max_level(), LogLevel::Debug);

        assert!("info,Queue=debug".parse::<LevelSpec>().is_err());
        assert!("info,queue".parse::<LevelSpec>().is_err());
        assert!("".parse::<LevelSpec>().is_err());
    }

    #[test]
    fn test_file_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("ftl");
        let out = FileOutput::new(&prefix, 32, 3).unwrap();

        for i in 0..10 {
            out.write(LogLevel::Info, &format!("line number {:02}", i)).unwrap();
        }
        out.flush().unwrap();

        let current = fs::read_to_string(FileOutput::path_for(&prefix, 0)).unwrap();
        assert!(current.contains("line number 09"));
        assert!(FileOutput::path_for(&prefix, 1).exists());
        assert!(FileOutput::path_for(&prefix, 2).exists());
        assert!(!FileOutput::path_for(&prefix, 3).exists());

        assert!(FileOutput::new(&prefix, 0, 1).is_err());
    }

    #[test]
    fn test_callback_sink_receives_lines() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&lines);
        set_log_callback("info", move |level, line| {
            sink_lines.lock().push((level, line.to_string()));
        })
        .unwrap();

        log::info!(target: "ftl::logging_test", "hello {}", 1);
        log::debug!(target: "ftl::logging_test", "hidden");

        set_log_level("info,logging_test=off").unwrap();
        log::warn!(target: "ftl::logging_test", "suppressed");

        let got = lines.lock();
        let ours: Vec<_> = got
            .iter()
            .filter(|(_, l)| l.contains("ftl::logging_test"))
            .collect();
        assert_eq!(ours.len(), 1);
        assert_eq!(ours[0].0, LogLevel::Info);
        assert!(ours[0].1.ends_with("hello 1"));
    }
}
