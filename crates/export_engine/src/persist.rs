use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{} exists and is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("cannot prepare {}: {source}", .path.display())]
    Prepare { path: PathBuf, source: io::Error },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Creates `dir` and its parents unless it is already a directory.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PersistError::NotADirectory(dir.to_path_buf())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|source| PersistError::Prepare {
                path: dir.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(PersistError::Prepare {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Serializes datasets straight into a hidden sibling file and renames it
/// over the target once complete.
pub struct DatasetWriter {
    dir: PathBuf,
}

impl DatasetWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        filename: &str,
        value: &T,
    ) -> Result<PathBuf, PersistError> {
        self.commit(filename, |out| {
            serde_json::to_writer_pretty(&mut *out, value)?;
            out.write_all(b"\n")?;
            Ok(())
        })
    }

    fn commit<F>(&self, filename: &str, fill: F) -> Result<PathBuf, PersistError>
    where
        F: FnOnce(&mut BufWriter<&mut File>) -> Result<(), PersistError>,
    {
        ensure_output_dir(&self.dir)?;
        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{filename}."))
            .suffix(".partial")
            .tempfile_in(&self.dir)?;

        {
            let mut out = BufWriter::new(staged.as_file_mut());
            fill(&mut out)?;
            out.flush()?;
        }
        staged.as_file().sync_all()?;

        let target = self.dir.join(filename);
        staged.persist(&target).map_err(|err| PersistError::Io(err.error))?;
        Ok(target)
    }
}
