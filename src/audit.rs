//! JSONL audit log of tool executions.
//!
//! One line per execution in `<dir>/YYYY-MM-DD.jsonl` (UTC date). Best effort:
//! write failures are logged and never reach the caller.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::events::ToolCompletion;

#[derive(Serialize)]
struct AuditEntry<'a> {
    ts: u64,
    correlation_id: &'a str,
    tool: &'a str,
    target: Option<&'a str>,
    ok: bool,
    errors: &'a [String],
    duration_ms: u64,
}

/// Appends tool executions to daily JSONL files. Clones of the surrounding
/// `Arc` may be shared between conversations; appends are serialized.
#[derive(Debug)]
pub struct AuditLog {
    dir: PathBuf,
    write: Mutex<()>,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file an entry written at `epoch_secs` goes to.
    pub fn file_for(&self, epoch_secs: u64) -> PathBuf {
        self.dir.join(format!("{}.jsonl", date_from_epoch(epoch_secs)))
    }

    pub fn record(&self, completion: &ToolCompletion) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if let Err(e) = self.append(now, completion) {
            warn!(dir = %self.dir.display(), error = %e, "failed to write audit entry");
        }
    }

    fn append(&self, ts: u64, completion: &ToolCompletion) -> std::io::Result<()> {
        let entry = AuditEntry {
            ts,
            correlation_id: &completion.correlation_id,
            tool: completion.request.name(),
            target: completion.request.target_id(),
            ok: completion.success,
            errors: &completion.errors,
            duration_ms: completion.duration_ms,
        };
        let line = serde_json::to_string(&entry)?;

        let _guard = self.write.lock();
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(self.file_for(ts))?;
        writeln!(file, "{line}")
    }
}

/// Format epoch seconds as `YYYY-MM-DD` (civil-from-days, Hinnant).
#[allow(clippy::unreadable_literal, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn date_from_epoch(epoch_secs: u64) -> String {
    let days = (epoch_secs / 86400) as i64;
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe as i64 + era * 400 + i64::from(month <= 2);

    format!("{year:04}-{month:02}-{day:02}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::events::correlation_id;
    use crate::tools::ToolRequest;

    fn completion(success: bool) -> ToolCompletion {
        ToolCompletion {
            correlation_id: correlation_id("remove_shape"),
            request: ToolRequest::RemoveShape {
                id: "s1".into(),
                removed: None,
            },
            success,
            errors: if success { vec![] } else { vec!["shape \"s1\" not found".into()] },
            duration_ms: 3,
            image: None,
        }
    }

    #[test]
    fn test_date_from_epoch() {
        assert_eq!(date_from_epoch(0), "1970-01-01");
        assert_eq!(date_from_epoch(946_684_800), "2000-01-01");
        assert_eq!(date_from_epoch(1_740_355_200), "2025-02-24");
        assert_eq!(date_from_epoch(1_740_355_200 + 86399), "2025-02-24");
        // Leap day
        assert_eq!(date_from_epoch(1_709_164_800), "2024-02-29");
    }

    #[test]
    fn test_record_appends_one_line_per_call() {
        let dir = std::env::temp_dir().join("scene_agent_test_audit");
        let _ = std::fs::remove_dir_all(&dir);
        let log = AuditLog::new(&dir);

        log.record(&completion(true));
        log.record(&completion(false));

        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        let path = files[0].as_ref().unwrap().path();
        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<serde_json::Value> = contents.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tool"], "remove_shape");
        assert_eq!(lines[0]["target"], "s1");
        assert_eq!(lines[0]["ok"], true);
        assert_eq!(lines[1]["ok"], false);
        assert_eq!(lines[1]["errors"][0], "shape \"s1\" not found");
        assert!(lines[1]["correlation_id"].as_str().unwrap().starts_with("remove_shape-"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unwritable_dir_does_not_panic() {
        let file = std::env::temp_dir().join("scene_agent_test_audit_blocker");
        std::fs::write(&file, b"not a directory").unwrap();
        AuditLog::new(file.join("nested")).record(&completion(true));
        let _ = std::fs::remove_file(&file);
    }
}
