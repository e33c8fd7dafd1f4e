//! Shared logging utilities for fstriage binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "fstriage=info,fstriage_db=warn";
const VERBOSE_LOG_FILTER: &str = "fstriage=debug,fstriage_db=debug";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration shared by fstriage binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Directory for the rolling log file. `None` logs to stderr only.
    pub log_dir: Option<&'a Path>,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// A log directory that cannot be opened degrades to stderr-only logging.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let file_layer = match config.log_dir {
        Some(dir) => match RotatingWriter::new(dir, config.app_name) {
            Ok(writer) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(file_filter),
            ),
            Err(err) => {
                eprintln!("Warning: file logging disabled: {:#}", err);
                None
            }
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Size-bounded log file with numbered generations.
///
/// `<name>.log` is the live file; on overflow it becomes `<name>.log.1`, older
/// generations shift up by one and anything past `generations - 1` is removed.
struct RotatingLog {
    dir: PathBuf,
    name: String,
    generations: usize,
    max_bytes: u64,
    live: Option<File>,
    written: u64,
}

impl RotatingLog {
    fn open(dir: &Path, name: &str, generations: usize, max_bytes: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut log = Self {
            dir: dir.to_path_buf(),
            name: sanitize_name(name),
            generations: generations.max(1),
            max_bytes,
            live: None,
            written: 0,
        };
        log.reopen()?;
        if log.written > log.max_bytes {
            log.roll()?;
        }
        Ok(log)
    }

    fn generation_path(&self, n: usize) -> PathBuf {
        if n == 0 {
            self.dir.join(format!("{}.log", self.name))
        } else {
            self.dir.join(format!("{}.log.{}", self.name, n))
        }
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.generation_path(0))?;
        self.written = file.metadata()?.len();
        self.live = Some(file);
        Ok(())
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.live.take() {
            let _ = file.flush();
        }

        let last = self.generations - 1;
        if last == 0 {
            let live = self.generation_path(0);
            if live.exists() {
                fs::remove_file(&live)?;
            }
        } else {
            let oldest = self.generation_path(last);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for n in (0..last).rev() {
                let from = self.generation_path(n);
                if from.exists() {
                    fs::rename(&from, self.generation_path(n + 1))?;
                }
            }
        }

        self.reopen()
    }

    fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.max_bytes {
            self.roll()?;
        }
        let file = self
            .live
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.live.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// `MakeWriter` handing out handles to one shared [`RotatingLog`].
#[derive(Clone)]
struct RotatingWriter(Arc<Mutex<RotatingLog>>);

impl RotatingWriter {
    fn new(dir: &Path, app_name: &str) -> Result<Self> {
        let log = RotatingLog::open(dir, app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
        Ok(Self(Arc::new(Mutex::new(log))))
    }

    fn with_log<T>(&self, op: impl FnOnce(&mut RotatingLog) -> io::Result<T>) -> io::Result<T> {
        let mut log = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        op(&mut log)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_log(|log| log.append(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_log(RotatingLog::flush)
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
