use std::{
    fs::{create_dir_all, File},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use chrono::Local;
use indicatif::ProgressBar;
use log::{Log, Metadata, Record};
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

/// Bar currently drawn on stderr, if any.
static ACTIVE_BAR: Mutex<Option<ProgressBar>> = Mutex::new(None);

/// Print terminal log lines above `bar` until [`detach_progress`] is called.
pub fn attach_progress(bar: &ProgressBar) {
    if let Ok(mut slot) = ACTIVE_BAR.lock() {
        *slot = Some(bar.clone());
    }
}

pub fn detach_progress() {
    if let Ok(mut slot) = ACTIVE_BAR.lock() {
        *slot = None;
    }
}

fn active_bar() -> Option<ProgressBar> {
    ACTIVE_BAR.lock().ok().and_then(|slot| slot.clone())
}

/// Terminal logger that clears the attached progress bar while it writes.
struct BarAwareLogger(Box<TermLogger>);

impl Log for BarAwareLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.0.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        match active_bar() {
            Some(bar) => bar.suspend(|| self.0.log(record)),
            None => self.0.log(record),
        }
    }

    fn flush(&self) {
        self.0.flush()
    }
}

impl SharedLogger for BarAwareLogger {
    fn level(&self) -> LevelFilter {
        self.0.level()
    }

    fn config(&self) -> Option<&Config> {
        self.0.config()
    }

    fn as_log(self: Box<Self>) -> Box<dyn Log> {
        Box::new(*self)
    }
}

/// Log everything at `level` to `<log_dir>/<tool>_<timestamp>.log` and echo
/// warnings and errors to stderr. Returns the log file path.
pub fn init(log_dir: &Path, tool: &str, level: LevelFilter) -> Result<PathBuf> {
    create_dir_all(log_dir).with_context(|| format!("Creating log dir {}", log_dir.display()))?;
    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let log_path = log_dir.join(format!("{tool}_{ts}.log"));

    CombinedLogger::init(vec![
        WriteLogger::new(
            level,
            ConfigBuilder::new().build(),
            File::create(&log_path)
                .with_context(|| format!("Creating log file {}", log_path.display()))?,
        ),
        Box::new(BarAwareLogger(TermLogger::new(
            LevelFilter::Warn,
            ConfigBuilder::new().build(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ))),
    ])
    .context("Failed to initialise logger")?;

    Ok(log_path)
}
