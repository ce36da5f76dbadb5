use std::path::{Path, PathBuf};

use export_logging::export_info;
use serde::Serialize;
use serde_json::json;

use crate::persist::{DatasetWriter, PersistError};

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub dataset: String,
    pub output_filename: String,
    pub manifest_filename: Option<String>,
}

impl ExportOptions {
    /// `{dataset}.json` plus a `manifest.json` next to it.
    pub fn for_dataset(dataset: impl Into<String>) -> Self {
        let dataset = dataset.into();
        Self {
            output_filename: format!("{dataset}.json"),
            manifest_filename: Some("manifest.json".to_string()),
            dataset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub row_count: usize,
    pub output_path: PathBuf,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

/// Writes `rows` as a JSON array, then the manifest describing it.
pub fn write_export<R: Serialize>(
    output_dir: &Path,
    options: &ExportOptions,
    rows: &[R],
    generated_utc: &str,
) -> Result<ExportSummary, ExportError> {
    let writer = DatasetWriter::new(output_dir);
    let output_path = writer.write_json(&options.output_filename, rows)?;

    let manifest_path = match &options.manifest_filename {
        Some(name) => {
            let manifest = json!({
                "dataset": options.dataset,
                "row_count": rows.len(),
                "file": options.output_filename,
                "generated_utc": generated_utc,
            });
            Some(writer.write_json(name, &manifest)?)
        }
        None => None,
    };

    export_info!(
        "wrote {} {} rows to {:?}",
        rows.len(),
        options.dataset,
        output_path
    );

    Ok(ExportSummary {
        row_count: rows.len(),
        output_path,
        manifest_path,
    })
}
