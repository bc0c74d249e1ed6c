//! Per-session append-only event log.
//!
//! One JSONL file per session under `{data_dir}/sessions/{session_id}.jsonl`,
//! rotated into an archive directory once it grows past a configured size,
//! with an `archives/index.json` recording each rotation — the same
//! rotate/prune shape as the single global event log the reference
//! implementation used, generalized to one file per session since this
//! gateway multiplexes many sessions concurrently rather than running one
//! conversation per process.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};
use sa_domain::event::Event;

fn sanitize(session_id: &str) -> String {
    session_id.replace(['/', '\\'], "-")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub session_id: String,
    pub path: String,
    pub rotated_at_ms: i64,
    pub bytes: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ArchiveIndex {
    #[serde(default)]
    archives: Vec<ArchiveRecord>,
}

pub struct EventLog {
    sessions_dir: PathBuf,
    archive_dir: PathBuf,
}

impl EventLog {
    pub fn new(sessions_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Result<Self> {
        let sessions_dir = sessions_dir.into();
        let archive_dir = archive_dir.into();
        std::fs::create_dir_all(&sessions_dir)?;
        std::fs::create_dir_all(&archive_dir)?;
        Ok(Self { sessions_dir, archive_dir })
    }

    fn active_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.jsonl", sanitize(session_id)))
    }

    /// Append one event, writing a `session_init` header first if this is
    /// the session's first append. Durable before returning.
    pub fn append(&self, session_id: &str, event: &Event) -> Result<()> {
        let path = self.active_path(session_id);
        let is_new = !path.exists();

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if is_new {
            let header = Event::SessionInit {
                timestamp: Utc::now(),
                session_id: session_id.to_string(),
            };
            writeln!(file, "{}", serde_json::to_string(&header)?)?;
        }
        writeln!(file, "{}", serde_json::to_string(event)?)?;
        file.sync_data().ok();
        Ok(())
    }

    /// Replay all events for a session in order, skipping the header.
    /// Tolerates truncation at the last line (a writer may be mid-append).
    pub fn replay(&self, session_id: &str) -> Result<Vec<Event>> {
        let path = self.active_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(Event::SessionInit { .. }) => continue,
                Ok(event) => events.push(event),
                Err(_) => break, // last line truncated mid-write; stop here
            }
        }
        Ok(events)
    }

    pub fn size_bytes(&self, session_id: &str) -> u64 {
        std::fs::metadata(self.active_path(session_id)).map(|m| m.len()).unwrap_or(0)
    }

    /// Enumerate session ids with an event log on disk.
    pub fn list_session_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.sessions_dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Rotate a session's active file into the archive directory if it has
    /// grown past `max_bytes`. Rotation never rewrites events, only moves
    /// the whole file.
    pub fn rotate_if_needed(&self, session_id: &str, max_bytes: u64) -> Result<Option<ArchiveRecord>> {
        if max_bytes == 0 {
            return Ok(None);
        }
        let active = self.active_path(session_id);
        let Ok(meta) = std::fs::metadata(&active) else {
            return Ok(None);
        };
        if meta.len() < max_bytes {
            return Ok(None);
        }

        let rotated_at = Utc::now();
        let ts = rotated_at.format("%Y%m%d_%H%M%S");
        let dst = self.archive_dir.join(format!("{}_{}.jsonl", sanitize(session_id), ts));
        std::fs::rename(&active, &dst)?;
        std::fs::write(&active, "")?;

        let record = ArchiveRecord {
            session_id: session_id.to_string(),
            path: dst.to_string_lossy().into_owned(),
            rotated_at_ms: rotated_at.timestamp_millis(),
            bytes: meta.len(),
        };
        self.append_index_record(&record)?;
        Ok(Some(record))
    }

    fn index_path(&self) -> PathBuf {
        self.archive_dir.join("index.json")
    }

    fn load_index(&self) -> ArchiveIndex {
        std::fs::read_to_string(self.index_path())
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn save_index(&self, index: &ArchiveIndex) -> Result<()> {
        let json = serde_json::to_string_pretty(index)?;
        std::fs::write(self.index_path(), json)?;
        Ok(())
    }

    fn append_index_record(&self, record: &ArchiveRecord) -> Result<()> {
        let mut index = self.load_index();
        index.archives.push(record.clone());
        self.save_index(&index)
    }

    /// Remove archived files for `session_id` older than `keep_days` or
    /// past `keep_max_files` (oldest first), rebuilding the index.
    pub fn prune(&self, session_id: &str, keep_days: u32, keep_max_files: usize) -> Result<(usize, usize)> {
        let prefix = format!("{}_", sanitize(session_id));
        let mut files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        for entry in std::fs::read_dir(&self.archive_dir)?.flatten() {
            let path = entry.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if name.starts_with(&prefix) && name.ends_with(".jsonl") {
                if let Ok(meta) = entry.metadata() {
                    files.push((path, meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH)));
                }
            }
        }
        files.sort_by(|a, b| b.1.cmp(&a.1));

        let cutoff = if keep_days > 0 {
            Some(std::time::SystemTime::now() - std::time::Duration::from_secs(keep_days as u64 * 86_400))
        } else {
            None
        };

        let mut removed = 0usize;
        let mut kept = Vec::new();
        for (path, modified) in files {
            if let Some(cutoff) = cutoff {
                if modified < cutoff {
                    if std::fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                    continue;
                }
            }
            kept.push(path);
        }
        if keep_max_files > 0 && kept.len() > keep_max_files {
            for path in kept.split_off(keep_max_files) {
                if std::fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
        }

        let mut index = self.load_index();
        index.archives.retain(|r| r.session_id != session_id || Path::new(&r.path).exists());
        self.save_index(&index)?;

        Ok((removed, kept.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::event::MessageRole;

    fn sample_event(id: &str) -> Event {
        Event::Message {
            timestamp: Utc::now(),
            message_id: id.into(),
            role: MessageRole::User,
            content: "hello".into(),
            tool_calls: vec![],
        }
    }

    #[test]
    fn append_writes_session_init_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("sessions"), dir.path().join("archives")).unwrap();
        log.append("sess_1", &sample_event("m1")).unwrap();
        log.append("sess_1", &sample_event("m2")).unwrap();

        let events = log.replay("sess_1").unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn rotate_moves_file_into_archive_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("sessions"), dir.path().join("archives")).unwrap();
        log.append("sess_1", &sample_event("m1")).unwrap();

        let size = log.size_bytes("sess_1");
        let record = log.rotate_if_needed("sess_1", size).unwrap();
        assert!(record.is_some());
        assert_eq!(log.size_bytes("sess_1"), 0);
    }

    #[test]
    fn list_session_ids_enumerates_active_logs() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("sessions"), dir.path().join("archives")).unwrap();
        log.append("sess_a", &sample_event("m1")).unwrap();
        log.append("sess_b", &sample_event("m1")).unwrap();

        let mut ids = log.list_session_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["sess_a".to_string(), "sess_b".to_string()]);
    }
}
