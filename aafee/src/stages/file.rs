//! File read and write stages.

use super::Stage;
use crate::core::StageValue;
use crate::errors::{FileStageError, FlowError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes the text of its input to `base_dir/file_name` and passes the
/// input through.
///
/// Absent input fails with [`FileStageError::NoInput`]. `None` and
/// `Structured` values fail with [`FileStageError::Unsupported`]; there is
/// no silent fallback.
#[derive(Debug, Clone)]
pub struct WriteToFileStage {
    name: String,
    path: PathBuf,
    create_dirs: bool,
}

impl WriteToFileStage {
    /// Creates a stage writing to `base_dir/file_name`.
    pub fn new(base_dir: impl AsRef<Path>, file_name: impl AsRef<Path>) -> Self {
        Self {
            name: "write-to-file".to_string(),
            path: base_dir.as_ref().join(file_name),
            create_dirs: false,
        }
    }

    /// Creates missing parent directories before writing.
    #[must_use]
    pub const fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    /// Sets the stage name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> FileStageError {
        FileStageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn write_text(&self, text: &str) -> Result<(), FileStageError> {
        if self.create_dirs {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| self.io_error(e))?;
        info!(path = %self.path.display(), bytes = text.len(), "wrote stage output to file");
        Ok(())
    }
}

#[async_trait]
impl Stage for WriteToFileStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        let Some(value) = input else {
            return Err(FileStageError::NoInput {
                path: self.path.clone(),
            }
            .into());
        };
        match value.as_text() {
            Ok(text) => self.write_text(&text).await?,
            Err(_) => {
                return Err(FileStageError::Unsupported {
                    variant: value.variant_name(),
                    path: self.path.clone(),
                }
                .into())
            }
        }
        Ok(value)
    }
}

/// Reads `base_dir/file_name` into a value typed by its extension:
/// `.json` becomes `Json`, `.md` becomes `Markdown`, anything else `Text`.
///
/// The input is ignored.
#[derive(Debug, Clone)]
pub struct ReadFromFileStage {
    name: String,
    path: PathBuf,
}

impl ReadFromFileStage {
    /// Creates a stage reading `base_dir/file_name`.
    pub fn new(base_dir: impl AsRef<Path>, file_name: impl AsRef<Path>) -> Self {
        Self {
            name: "read-from-file".to_string(),
            path: base_dir.as_ref().join(file_name),
        }
    }

    /// Sets the stage name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Stage for ReadFromFileStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: Option<StageValue>) -> Result<StageValue, FlowError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FileStageError::Io {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), bytes = text.len(), "read file");

        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        Ok(match extension.as_deref() {
            Some("json") => StageValue::Json(text),
            Some("md" | "markdown") => StageValue::Markdown(text),
            _ => StageValue::Text(text),
        })
    }
}
