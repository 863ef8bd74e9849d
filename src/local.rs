use crate::record::{LogDocument, LogLevel};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;

/// File receiving every document that passes the level filter.
pub const COMBINED_FILE: &str = "combined.log";
/// File receiving `error` documents only.
pub const ERROR_FILE: &str = "error.log";

#[derive(thiserror::Error, Debug)]
pub enum LocalSinkError {
    #[error("could not open log file in {dir}: {source}")]
    Init {
        dir: PathBuf,
        #[source]
        source: InitError,
    },

    #[error("could not write local log: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode log document: {0}")]
    Encode(#[from] serde_json::Error),
}

struct LogFiles {
    combined: RollingFileAppender,
    errors: RollingFileAppender,
}

/// Synchronous in-process sink: a console line per document plus
/// append-only JSON-lines files.
///
/// Never touches the network. Failures are returned to the caller, which
/// decides whether to drop them.
pub struct LocalSink {
    console: bool,
    min_level: LogLevel,
    files: Option<LogFiles>,
}

impl LocalSink {
    /// Console only, no files.
    pub fn console(min_level: LogLevel) -> Self {
        LocalSink {
            console: true,
            min_level,
            files: None,
        }
    }

    /// Open (or create) `combined.log` and `error.log` under `dir`.
    pub fn with_files(dir: impl AsRef<Path>, console: bool, min_level: LogLevel) -> Result<Self, LocalSinkError> {
        let dir = dir.as_ref();
        Ok(LocalSink {
            console,
            min_level,
            files: Some(LogFiles {
                combined: open_appender(dir, COMBINED_FILE)?,
                errors: open_appender(dir, ERROR_FILE)?,
            }),
        })
    }

    pub fn min_level(&self) -> &LogLevel {
        &self.min_level
    }

    /// Write `document` to the console and files.
    ///
    /// Documents below the minimum level are skipped silently. Every
    /// target is attempted even when an earlier one fails; the first
    /// failure is returned afterwards.
    pub fn write(&self, document: &LogDocument) -> Result<(), LocalSinkError> {
        if !document.level.enabled_at(&self.min_level) {
            return Ok(());
        }

        let mut first_error = None;
        let mut keep = |result: Result<(), LocalSinkError>| {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        };

        if self.console {
            keep(self.write_console(document));
        }

        if let Some(files) = &self.files {
            match serde_json::to_vec(document) {
                Ok(mut line) => {
                    line.push(b'\n');
                    keep(append(&files.combined, &line));
                    if document.level == LogLevel::Error {
                        keep(append(&files.errors, &line));
                    }
                }
                Err(e) => keep(Err(e.into())),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write_console(&self, document: &LogDocument) -> Result<(), LocalSinkError> {
        let mut out = std::io::stdout().lock();
        writeln!(
            out,
            "{} {:>5} [{}::{}] {}",
            document.timestamp_string(),
            document.level.as_str().to_uppercase(),
            document.scope,
            document.method_name,
            document.message,
        )?;
        Ok(())
    }
}

fn append(file: &RollingFileAppender, line: &[u8]) -> Result<(), LocalSinkError> {
    file.make_writer().write_all(line)?;
    Ok(())
}

fn open_appender(dir: &Path, file_name: &str) -> Result<RollingFileAppender, LocalSinkError> {
    let (prefix, suffix) = file_name.rsplit_once('.').unwrap_or((file_name, "log"));
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(prefix)
        .filename_suffix(suffix)
        .build(dir)
        .map_err(|source| LocalSinkError::Init {
            dir: dir.to_path_buf(),
            source,
        })
}
