//! Manifest: a Markdown note embedding every image of a work folder.
//!
//! The file is named after the folder (`1.2.3/1.2.3.md`) and holds one
//! wiki-style embed per image, in extraction order:
//!
//! ```text
//! ![[page1_img1.jpeg]]
//! ![[page1_img2.png]]
//! ```
//!
//! It is written to a temporary sibling first and renamed into place, so an
//! interrupted run never leaves a half-written manifest behind.

use crate::error::PdfImgError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Manifest body for the given image file names. Every line ends in `\n`.
pub fn render_manifest<S: AsRef<str>>(file_names: &[S]) -> String {
    file_names
        .iter()
        .map(|name| format!("![[{}]]\n", name.as_ref()))
        .collect()
}

/// Path of the manifest inside `folder`: `<folder>/<folder name>.<extension>`.
pub fn manifest_path(folder: &Path, extension: &str) -> PathBuf {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    folder.join(format!("{name}.{extension}"))
}

/// Write (or overwrite) the manifest for `file_names` into `folder`.
pub async fn write_manifest<S: AsRef<str>>(
    folder: &Path,
    file_names: &[S],
    extension: &str,
) -> Result<PathBuf, PdfImgError> {
    let path = manifest_path(folder, extension);
    let tmp = path.with_extension(format!("{extension}.tmp"));
    let err = |source| PdfImgError::ManifestWriteFailed {
        path: path.clone(),
        source,
    };

    tokio::fs::write(&tmp, render_manifest(file_names))
        .await
        .map_err(err)?;
    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err(e));
    }

    info!(
        "Wrote manifest '{}' ({} images)",
        path.display(),
        file_names.len()
    );
    Ok(path)
}
