//! Machine-readable record of a pipeline run, written next to the
//! human-readable output when `--json` is given.

use crate::coverage::ReportStatus;
use chrono::{DateTime, Utc};
use pipeline::{CoverageSummary, ExecutionResult, GateVerdict};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RecordResult<T> = Result<T, RecordError>;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "pipeline", rename_all = "snake_case")]
pub enum RecordBody {
    Test {
        filter: Option<String>,
        passed_count: usize,
        total_count: usize,
        results: Vec<ExecutionResult>,
        error: Option<String>,
    },
    Coverage {
        summary: Option<CoverageSummary>,
        verdict: Option<GateVerdict>,
        report: Option<ReportStatus>,
        error: Option<String>,
    },
    Clean {
        removed: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub exit_code: u8,
    #[serde(flatten)]
    pub body: RecordBody,
}

impl RunRecord {
    pub fn new(exit_code: u8, body: RecordBody) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            exit_code,
            body,
        }
    }

    pub fn to_json(&self) -> RecordResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> RecordResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::FailureKind;

    #[test]
    fn test_test_record_shape() {
        let record = RunRecord::new(
            1,
            RecordBody::Test {
                filter: Some("core".to_string()),
                passed_count: 0,
                total_count: 1,
                results: vec![ExecutionResult::not_compiled(
                    "Core-Rect",
                    FailureKind::MissingSource {
                        path: "test/unit/test_rect/test_rect.cpp".to_string(),
                    },
                )],
                error: None,
            },
        );

        let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(json["pipeline"], "test");
        assert_eq!(json["exit_code"], 1);
        assert_eq!(json["filter"], "core");
        assert_eq!(json["results"][0]["failure"]["kind"], "missing_source");
        assert!(json["run_id"].is_string());
        assert!(json["generated_at"].is_string());
    }

    #[test]
    fn test_coverage_record_with_error() {
        let record = RunRecord::new(
            1,
            RecordBody::Coverage {
                summary: None,
                verdict: None,
                report: None,
                error: Some("capture failed (exit Some(1))".to_string()),
            },
        );

        let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(json["pipeline"], "coverage");
        assert!(json["summary"].is_null());
        assert_eq!(json["error"], "capture failed (exit Some(1))");
    }

    #[test]
    fn test_write_record_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");

        RunRecord::new(0, RecordBody::Clean { removed: 3 })
            .write_to(&path)
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["pipeline"], "clean");
        assert_eq!(json["removed"], 3);
        assert_eq!(json["exit_code"], 0);
    }
}
