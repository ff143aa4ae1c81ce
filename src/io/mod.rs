//! Reading the source text and persisting results.

mod sink;

pub use sink::{write_report, FileSink, OutputSink, UNIT_SEPARATOR};

use crate::error::PipelineError;
use std::path::Path;

/// Read the source document. An unreadable, empty or whitespace-only file
/// cannot be segmented meaningfully and is rejected.
///
/// Invalid UTF-8 sequences are replaced with U+FFFD rather than failing the
/// run.
pub async fn load_source(path: &Path) -> Result<String, PipelineError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        PipelineError::Segmentation(format!("cannot read {}: {}", path.display(), e))
    })?;

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let text = String::from_utf8_lossy(e.as_bytes()).into_owned();
            tracing::warn!(
                "{} is not valid UTF-8; replaced {} invalid sequences",
                path.display(),
                text.matches(char::REPLACEMENT_CHARACTER).count()
            );
            text
        }
    };

    if text.trim().is_empty() {
        return Err(PipelineError::Segmentation(format!(
            "{} is empty",
            path.display()
        )));
    }

    tracing::info!("Loaded {} characters from {}", text.chars().count(), path.display());
    Ok(text)
}
