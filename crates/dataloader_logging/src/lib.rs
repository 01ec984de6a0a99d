//! Shared logging setup for binaries embedding the dataloader schema engine.
//!
//! Engine events (inference collisions, validation drift, registrations) go
//! to `$DATALOADER_HOME/logs/<app>.log` and to stderr. The log file rolls over
//! by size. `RUST_LOG` overrides the default filter unless the config names
//! one explicitly.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "dataloader=info,dataloader_schema=info";
const VERBOSE_LOG_FILTER: &str = "dataloader=debug,dataloader_schema=debug";

/// When the log file rolls over and how many old files survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Roll before a write would take the file past this size.
    pub max_bytes: u64,
    /// Rolled files kept as `<app>.log.1` (newest) to `<app>.log.<keep>`.
    /// Zero truncates the live file instead.
    pub keep: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            keep: 4,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Show debug events on stderr
    pub verbose: bool,
    /// Filter directives used instead of `RUST_LOG` and the defaults.
    pub filter: Option<&'a str>,
    pub rotation: RotationPolicy,
}

impl<'a> LogConfig<'a> {
    pub fn new(app_name: &'a str) -> Self {
        Self {
            app_name,
            verbose: false,
            filter: None,
            rotation: RotationPolicy::default(),
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn filter(mut self, directives: &'a str) -> Self {
        self.filter = Some(directives);
        self
    }

    pub fn rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }

    fn env_filter(&self, fallback: &str) -> EnvFilter {
        match self.filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        }
    }
}

/// Install the global subscriber, logging under [`ensure_logs_dir`].
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    init_logging_in(&log_dir, config)
}

/// Like [`init_logging`], writing log files to `log_dir`.
pub fn init_logging_in(log_dir: &Path, config: LogConfig<'_>) -> Result<()> {
    subscriber(log_dir, &config)?
        .try_init()
        .context("A global tracing subscriber is already installed")?;
    tracing::debug!("Logging {} to {}", config.app_name, log_dir.display());
    Ok(())
}

/// The subscriber [`init_logging_in`] installs, for callers that scope it
/// with `tracing::subscriber::with_default` instead.
pub fn subscriber(log_dir: &Path, config: &LogConfig<'_>) -> Result<impl Subscriber + Send + Sync> {
    let log_file = SizeRotatingFile::open(log_dir, config.app_name, config.rotation)
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;

    let console_fallback = if config.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };

    Ok(tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false)
                .with_filter(config.env_filter(DEFAULT_LOG_FILTER)),
        )
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_filter(config.env_filter(console_fallback)),
        ))
}

/// The dataloader home directory: `$DATALOADER_HOME`, else `~/.dataloader`.
pub fn dataloader_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("DATALOADER_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".dataloader"))
}

/// The logs directory: `<home>/logs`
pub fn logs_dir() -> Result<PathBuf> {
    Ok(dataloader_home()?.join("logs"))
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// An append-only log file that rolls over by size.
struct SizeRotatingFile {
    path: PathBuf,
    policy: RotationPolicy,
    // None only while rolling
    file: Option<File>,
    written: u64,
}

impl SizeRotatingFile {
    fn open(dir: &Path, app_name: &str, policy: RotationPolicy) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.log", file_stem(app_name)));
        let file = append_to(&path)?;
        let written = file.metadata()?.len();

        let mut log = Self {
            path,
            policy,
            file: Some(file),
            written,
        };
        if log.written > policy.max_bytes {
            log.roll()?;
        }
        Ok(log)
    }

    fn rolled(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut old) = self.file.take() {
            old.flush()?;
        }

        if self.policy.keep == 0 {
            self.file = Some(File::create(&self.path)?);
            self.written = 0;
            return Ok(());
        }

        // rename replaces the target, so the oldest file falls off the end
        for n in (1..self.policy.keep).rev() {
            let from = self.rolled(n);
            if from.exists() {
                fs::rename(&from, self.rolled(n + 1))?;
            }
        }
        if self.path.exists() {
            fs::rename(&self.path, self.rolled(1))?;
        }

        self.file = Some(append_to(&self.path)?);
        self.written = 0;
        Ok(())
    }
}

impl Write for SizeRotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.policy.max_bytes {
            self.roll()?;
        }
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => self.file.insert(append_to(&self.path)?),
        };
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn file_stem(app_name: &str) -> String {
    app_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
