use crate::config::RuntimeConfig;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Keeps the log file open for the lifetime of the process.
pub struct LogGuard {
    file: Option<Arc<Mutex<File>>>,
    path: Option<PathBuf>,
}

impl LogGuard {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// The terminal owns stdout, so stdout logging is opt-in; with neither a log
/// directory nor stdout enabled, records go nowhere.
struct MultiWriter {
    stdout_enabled: bool,
    file: Option<Arc<Mutex<File>>>,
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stdout_enabled {
            let _ = io::stdout().write_all(buf);
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.stdout_enabled {
            let _ = io::stdout().flush();
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

pub fn init_logging(config: &RuntimeConfig) -> Option<LogGuard> {
    let level = std::env::var("LTAIL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let guard = match open_log_file(&config.log_dir, std::process::id()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard {
                file: None,
                path: None,
            }
        }
    };
    let file = guard.file.clone();
    let stdout_enabled = config.log_stdout;
    let make_writer = BoxMakeWriter::new(move || MultiWriter {
        stdout_enabled,
        file: file.clone(),
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

fn open_log_file(log_dir: &str, pid: u32) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard {
            file: None,
            path: None,
        });
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("ltail-{pid}.log"));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
        path: Some(path),
    })
}
