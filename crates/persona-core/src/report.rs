//! JSON report persistence.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::result::TestRunResult;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Writes one pretty-printed JSON document per run.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    results_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// File name: `<persona_id>_<YYYYmmdd_HHMMSS>.json`, stamped with the start time.
    pub fn report_path(&self, result: &TestRunResult) -> PathBuf {
        let stamp = result.started_at.format("%Y%m%d_%H%M%S");
        self.results_dir
            .join(format!("{}_{stamp}.json", result.persona_id))
    }

    pub fn write(&self, result: &TestRunResult) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.results_dir)?;
        let path = self.report_path(result);
        let body = serde_json::to_string_pretty(&result.to_report())?;
        std::fs::write(&path, body)?;
        tracing::debug!(path = %path.display(), persona_id = %result.persona_id, "report written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::PersonaDefinition;
    use crate::types::Language;
    use tempfile::TempDir;

    #[test]
    fn write_creates_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path().join("output/results"));
        let persona =
            PersonaDefinition::with_phases("budget_backpacker", Language::Fr, &["greeting"]);
        let result = TestRunResult::skipped(&persona, Some("batch-x"));

        let path = writer.write(&result).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("budget_backpacker_"));
        assert!(name.ends_with(".json"));
        // persona id, date, time
        assert_eq!(name.trim_end_matches(".json").len(), "budget_backpacker_".len() + 15);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["status"], "failed");
        assert_eq!(written["batch_id"], "batch-x");
    }
}
