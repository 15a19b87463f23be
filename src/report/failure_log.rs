use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::Serialize;
use tracing::warn;

use crate::Result;
use crate::error::RuloadError;
use crate::runner::types::ExecutionResult;

/// One structured record per failed response, JSON Lines format.
#[derive(Debug, Serialize)]
struct FailureRecord<'a> {
    captured_at: chrono::DateTime<chrono::Utc>,
    step_name: &'a str,
    method: &'a str,
    url: &'a str,
    status_code: u16,
    response_time_ms: u64,
    reasons: &'a [String],
    error: Option<&'a str>,
}

/// 失败日志：按逻辑端点分文件追加
///
/// Appends are serialised by a process-local lock plus `fs2::lock_exclusive`,
/// same strategy as any multi-writer jsonl file on Windows and Unix alike.
pub struct FailureLogger {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FailureLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Best-effort append; IO problems are logged, never propagated.
    pub fn log_failure(&self, result: &ExecutionResult) {
        if let Err(e) = self.append(result) {
            warn!("Failed to append failure record: {}", e);
        }
    }

    fn append(&self, result: &ExecutionResult) -> Result<()> {
        let key = endpoint_key(&result.step_name, &result.url);
        let path = self.dir.join(format!("{}.jsonl", key));

        let record = FailureRecord {
            captured_at: result.captured_at,
            step_name: &result.step_name,
            method: &result.method,
            url: &result.url,
            status_code: result.status_code,
            response_time_ms: result.response_time_ms,
            reasons: &result.verdict.reasons,
            error: result.error_message.as_deref(),
        };
        let json = serde_json::to_string(&record)?;

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(RuloadError::IoError)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(RuloadError::IoError)?;

        // Lock for writing
        file.lock_exclusive().map_err(RuloadError::IoError)?;
        writeln!(file, "{}", json).map_err(RuloadError::IoError)?;
        drop(file);

        Ok(())
    }
}

/// Logical endpoint: the step name when present, otherwise the first three
/// path segments of the URL. Sanitised for use as a file name.
pub fn endpoint_key(step_name: &str, url: &str) -> String {
    let raw = if !step_name.is_empty() {
        step_name.to_string()
    } else {
        url::Url::parse(url)
            .map(|u| {
                u.path_segments()
                    .map(|segments| {
                        segments
                            .filter(|s| !s.is_empty())
                            .take(3)
                            .collect::<Vec<_>>()
                            .join("_")
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    };

    let sanitised: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitised.is_empty() {
        "unknown".to_string()
    } else {
        sanitised
    }
}
