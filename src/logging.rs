//! Global tracing subscriber and the installer log file.
//!
//! The log file location is only known once a scenario is loaded, so early
//! records are kept in memory and written out when [`LogFile::open`] runs.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, Registry};

/// Target used for classified provisioning output.
pub const PROVISION_TARGET: &str = "provision";

enum LogTarget {
    Buffer(Vec<u8>),
    File(File),
}

/// Shared sink behind the file layer.
#[derive(Clone)]
pub struct LogFile(Arc<Mutex<LogTarget>>);

impl Default for LogFile {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(LogTarget::Buffer(Vec::new()))))
    }
}

impl LogFile {
    fn lock(&self) -> MutexGuard<'_, LogTarget> {
        // a poisoned lock still holds usable bytes
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start appending to `dir/name`, falling back to the user cache
    /// directory when `dir` cannot be created. Returns the path in use.
    pub fn open(&self, dir: &Path, name: &str) -> io::Result<PathBuf> {
        let dir = match fs::create_dir_all(dir) {
            Ok(()) => dir.to_path_buf(),
            Err(e) => {
                let fallback = dirs::cache_dir()
                    .map(|d| d.join("scenario-installer"))
                    .ok_or(e)?;
                fs::create_dir_all(&fallback)?;
                fallback
            }
        };
        let path = dir.join(name);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut target = self.lock();
        if let LogTarget::Buffer(buffered) = &*target {
            file.write_all(buffered)?;
        }
        *target = LogTarget::File(file);
        Ok(path)
    }

    pub fn flush(&self) -> io::Result<()> {
        match &mut *self.lock() {
            LogTarget::File(file) => file.flush(),
            LogTarget::Buffer(_) => Ok(()),
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> Option<Vec<u8>> {
        match &*self.lock() {
            LogTarget::Buffer(b) => Some(b.clone()),
            LogTarget::File(_) => None,
        }
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut *self.lock() {
            LogTarget::Buffer(b) => {
                b.extend_from_slice(buf);
                Ok(buf.len())
            }
            LogTarget::File(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        LogFile::flush(self)
    }
}

/// Handles kept after the subscriber is installed.
pub struct Logging {
    pub file: LogFile,
    file_level: reload::Handle<LevelFilter, Registry>,
}

impl Logging {
    /// Change the file layer's level once the scenario's `log_level` is known.
    pub fn set_file_level(&self, level: LevelFilter) {
        if let Err(e) = self.file_level.reload(level) {
            warn!("could not change log level: {e}");
        }
    }
}

/// Install the global subscriber. With `verbose` set, everything at or above
/// that level is echoed to stdout; otherwise warnings and errors from the
/// installer itself go to stderr.
pub fn init(file_level: LevelFilter, verbose: Option<LevelFilter>) -> Logging {
    let file = LogFile::default();
    let (level, file_level) = reload::Layer::new(file_level);

    let writer = file.clone();
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .with_filter(level);

    let verbose_layer = verbose.map(|level| {
        fmt::layer()
            .with_writer(io::stdout)
            .without_time()
            .with_target(false)
            .with_filter(level)
    });
    let quiet_layer = verbose.is_none().then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .without_time()
            .with_target(false)
            .with_filter(
                Targets::new()
                    .with_target(PROVISION_TARGET, LevelFilter::OFF)
                    .with_default(LevelFilter::WARN),
            )
    });

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(verbose_layer)
        .with(quiet_layer)
        .try_init();
    if let Err(e) = installed {
        eprintln!("logging already initialized: {e}");
    }

    Logging { file, file_level }
}
