//! Best-effort token-usage accounting.
//!
//! Records are appended as JSON lines under the state dir. Failures are
//! logged and swallowed so accounting can never take down a turn.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use pf_domain::usage::{TokenUsageRecord, UsageSink};

/// Appends one JSON line per usage record to `state_dir/usage/usage.jsonl`.
pub struct FileUsageSink {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl FileUsageSink {
    pub fn new(state_path: &Path) -> std::io::Result<Self> {
        let dir = state_path.join("usage");
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join("usage.jsonl"),
            write_guard: Mutex::new(()),
        })
    }

    fn append(&self, record: &TokenUsageRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let _guard = self.write_guard.lock();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl UsageSink for FileUsageSink {
    fn record(&self, record: TokenUsageRecord) {
        if let Err(e) = self.append(&record) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "token usage record dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> TokenUsageRecord {
        TokenUsageRecord {
            user_id: Some("u1".into()),
            conversation_id: Some("c1".into()),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            prompt_tokens: 120,
            completion_tokens: 48,
            total_tokens: 168,
            cost_usd: 0.0001,
            endpoint: "chat".into(),
            tool_calls: 2,
            cached: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn records_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileUsageSink::new(dir.path()).unwrap();
        sink.record(record());
        sink.record(record());

        let raw = std::fs::read_to_string(dir.path().join("usage/usage.jsonl")).unwrap();
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: TokenUsageRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.total_tokens, 168);
        assert_eq!(parsed.provider, "openai");
    }
}
