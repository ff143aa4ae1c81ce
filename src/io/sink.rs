use crate::error::PipelineError;
use crate::pipeline::PipelineReport;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Separator placed between consecutive unit outputs.
pub const UNIT_SEPARATOR: &str = "\n\n";

/// Receives the reassembled unit outputs, in index order.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write(&self, outputs: &[String]) -> Result<(), PipelineError>;
}

/// Writes the outputs to a single text file, one blank line between units.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
    separator: String,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            separator: UNIT_SEPARATOR.to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render(&self, outputs: &[String]) -> String {
        outputs.join(&self.separator)
    }
}

async fn ensure_parent(path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl OutputSink for FileSink {
    async fn write(&self, outputs: &[String]) -> Result<(), PipelineError> {
        ensure_parent(&self.path).await?;
        tokio::fs::write(&self.path, self.render(outputs)).await?;
        tracing::info!("Wrote {} units to {}", outputs.len(), self.path.display());
        Ok(())
    }
}

/// Save the run report (status, counts, failed indices and messages) as JSON.
pub async fn write_report(report: &PipelineReport, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    ensure_parent(path).await?;
    tokio::fs::write(path, json).await?;
    tracing::info!("Report saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnitError;
    use crate::pipeline::{FailedUnit, Metrics, PipelinePhase};
    use std::time::Duration;

    #[tokio::test]
    async fn test_file_sink_joins_with_blank_line() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("nested/out/output.txt"));

        sink.write(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        let written = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(written, "first\n\nsecond");
    }

    #[tokio::test]
    async fn test_file_sink_empty_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("empty.txt"));

        sink.write(&[]).await.unwrap();
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "");
    }

    #[test]
    fn test_custom_separator() {
        let sink = FileSink::new("unused.txt").with_separator("\n---\n");
        assert_eq!(sink.render(&["a".into(), "b".into()]), "a\n---\nb");
    }

    #[tokio::test]
    async fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = PipelineReport {
            status: PipelinePhase::Cancelled,
            total_units: 3,
            succeeded: 1,
            failed: vec![
                FailedUnit {
                    index: 1,
                    error: UnitError::Cancelled,
                    message: "cancelled".into(),
                },
                FailedUnit {
                    index: 2,
                    error: UnitError::Cancelled,
                    message: "cancelled".into(),
                },
            ],
            outputs: vec!["x".into(); 3],
            elapsed: Duration::from_secs(2),
            metrics: Metrics::new().snapshot(),
        };

        write_report(&report, &path).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["total_units"], 3);
        assert_eq!(json["failed"].as_array().unwrap().len(), 2);
        assert_eq!(json["elapsed"], 2.0);
    }
}
