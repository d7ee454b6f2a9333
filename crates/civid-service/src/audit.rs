//! Append-only audit sinks, one file per category.
//!
//! Each operation attempt appends exactly one JSON object per line to
//! the sink of its category. The sink never fails or blocks the calling
//! operation: a write failure is downgraded to a `tracing` warning and
//! swallowed, so audit problems can never change an operation's outcome.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use civid_core::audit::AuditEvent;

/// Durable per-category audit log.
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    /// Opens the audit log rooted at `dir`, creating the directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created. This is the
    /// only fallible moment; [`AuditLog::record`] itself never fails.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Appends one event line to its category sink.
    ///
    /// Never returns an error and never panics: serialization or I/O
    /// failures are logged and swallowed so the calling operation's
    /// control flow is unaffected.
    pub fn record(&self, event: &AuditEvent) {
        let path = self.sink_path(event);
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to serialize audit event, dropping");
                return;
            },
        };
        if let Err(err) = append_line(&path, &line) {
            warn!(error = %err, path = %path.display(), "failed to append audit event");
        }
    }

    fn sink_path(&self, event: &AuditEvent) -> PathBuf {
        self.dir
            .join(format!("{}.log.jsonl", event.category.file_stem()))
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use civid_core::audit::AuditCategory;

    use super::*;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .expect("read sink")
            .lines()
            .map(|line| serde_json::from_str(line).expect("well-formed JSON line"))
            .collect()
    }

    #[test]
    fn test_one_line_per_event_in_category_sink() {
        let dir = TempDir::new().expect("temp dir");
        let log = AuditLog::open(dir.path()).expect("open");

        log.record(&AuditEvent::new(
            AuditCategory::Registration,
            "david",
            serde_json::json!({"id": 7459}),
            true,
        ));
        log.record(&AuditEvent::new(
            AuditCategory::Registration,
            "erin",
            serde_json::json!({"id": null}),
            false,
        ));

        let lines = read_lines(&dir.path().join("registration.log.jsonl"));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["actor"], "david");
        assert_eq!(lines[1]["successful"], false);
    }

    #[test]
    fn test_categories_route_to_separate_sinks() {
        let dir = TempDir::new().expect("temp dir");
        let log = AuditLog::open(dir.path()).expect("open");

        log.record(&AuditEvent::new(
            AuditCategory::Insert,
            "7459",
            serde_json::json!({}),
            true,
        ));
        log.record(&AuditEvent::new(
            AuditCategory::Query,
            "welfare_dept",
            serde_json::json!({}),
            false,
        ));

        assert_eq!(read_lines(&dir.path().join("insert.log.jsonl")).len(), 1);
        assert_eq!(read_lines(&dir.path().join("query.log.jsonl")).len(), 1);
        assert!(!dir.path().join("update.log.jsonl").exists());
    }

    #[test]
    fn test_sink_failure_does_not_propagate() {
        let dir = TempDir::new().expect("temp dir");
        let log = AuditLog::open(dir.path()).expect("open");

        // Turn the sink path into a directory so the append must fail.
        std::fs::create_dir(dir.path().join("update.log.jsonl")).expect("block sink");

        log.record(&AuditEvent::new(
            AuditCategory::Update,
            "operator",
            serde_json::json!({"record_updated": 1}),
            true,
        ));
        // Reaching this point is the assertion: record() swallowed the error.
    }
}
