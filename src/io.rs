//! JSON documents on disk.
//!
//! Reading distinguishes a document that does not exist (`Ok(None)`) from one
//! that cannot be read or decoded (`Err`). Each call site decides whether
//! absence is recoverable.

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;

use crate::error::{Result, ServerError};

/// Read and decode a JSON document.
///
/// Surrounding whitespace is ignored. Returns `Ok(None)` when the file does
/// not exist.
pub async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ServerError::Io {
                path: path.to_path_buf(),
                source,
            });
        },
    };

    serde_json::from_str(content.trim())
        .map(Some)
        .map_err(|source| ServerError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Encode `value` and overwrite the file at `path`.
pub async fn write_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec(value).map_err(|source| ServerError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    fs::write(path, content)
        .await
        .map_err(|source| ServerError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Create `path` as a directory unless it already is one.
pub async fn ensure_directory(path: &Path) -> Result<()> {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        _ => {
            tracing::debug!(path = %path.display(), "creating directory");

            fs::create_dir_all(path)
                .await
                .map_err(|source| ServerError::Io {
                    path: path.to_path_buf(),
                    source,
                })
        },
    }
}
