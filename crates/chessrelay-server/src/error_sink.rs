use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The out-of-scope "error log sink" collaborator: something that wants to
/// know about every relay error, independent of `tracing`. Tests swap in
/// [`VecErrorSink`] to assert on what got logged without touching the
/// filesystem; production uses [`FileErrorSink`], the direct descendant of
/// the original server's append-only `errorLog.txt`.
pub trait ErrorSink: Send + Sync {
    fn record(&self, message: &str);
}

/// Appends a timestamped line to a file, the same contract as the original
/// server's `errorLogger.c`.
pub struct FileErrorSink {
    path: PathBuf,
}

impl FileErrorSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ErrorSink for FileErrorSink {
    fn record(&self, message: &str) {
        let opened = OpenOptions::new().create(true).append(true).open(&self.path);
        let timestamp = chrono::Local::now().to_rfc3339();
        match opened {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "[{timestamp}] {message}") {
                    tracing::error!(path = %self.path.display(), error = %e, "failed to append to error log");
                }
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to open error log");
            }
        }
    }
}

/// Discards everything. Used where an `ErrorSink` is required but nothing
/// downstream consumes the error log.
pub struct NullErrorSink;

impl ErrorSink for NullErrorSink {
    fn record(&self, _message: &str) {}
}

/// Collects every recorded message in memory, for assertions in tests.
#[derive(Default)]
pub struct VecErrorSink {
    messages: Mutex<Vec<String>>,
}

impl VecErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("VecErrorSink mutex poisoned").clone()
    }
}

impl ErrorSink for VecErrorSink {
    fn record(&self, message: &str) {
        self.messages.lock().expect("VecErrorSink mutex poisoned").push(message.to_string());
    }
}

pub fn log_and_record(sink: &dyn ErrorSink, context: &str, err: &crate::error::RelayError) {
    let message = format!("{context}: {err}");
    tracing::warn!(%message, "relay error");
    sink.record(&message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_collects_messages() {
        let sink = VecErrorSink::new();
        sink.record("one");
        sink.record("two");
        assert_eq!(sink.messages(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errorLog.txt");
        let sink = FileErrorSink::new(&path);
        sink.record("first failure");
        sink.record("second failure");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("first failure"));
        assert!(contents.contains("second failure"));
        let year = chrono::Local::now().format("%Y").to_string();
        assert!(contents.contains(&year), "expected a timestamp prefix on each line");
    }
}
