//! Naming and placement: derive a work folder from the document's name,
//! move the document into it, and move it back out afterwards.
//!
//! ## Folder identifier
//!
//! Documents are named like `4.1.2 Lecture notes.pdf`. The leading run of
//! digits and dots of the file stem (`4.1.2`) becomes the work folder name,
//! created next to the document (same parent directory, not the working
//! directory). A stem without such a run is skipped entirely.
//!
//! ## Restoring
//!
//! Once the pipeline is done the document goes back to its original directory,
//! unless something with the same name has appeared there in the meantime.
//! Overwriting it would silently lose data, so the document stays in its work
//! folder instead and the caller reports the conflict. The check compares
//! existence only, never content.

use crate::error::PdfImgError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

static PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d.]+").expect("valid regex"));

/// Extract the folder identifier from a document file name.
///
/// The `.pdf` extension (any case) is removed first so that `1.2.3.pdf`
/// yields `1.2.3` rather than `1.2.3.`. Runs consisting only of dots are
/// rejected: `..` as a folder name would point outside the parent directory.
///
/// ```
/// use edgequake_pdfimg::pipeline::placement::folder_identifier;
///
/// assert_eq!(folder_identifier("1.2.3.pdf").as_deref(), Some("1.2.3"));
/// assert_eq!(folder_identifier("4.1 Intro.PDF").as_deref(), Some("4.1"));
/// assert_eq!(folder_identifier("notes.pdf"), None);
/// ```
pub fn folder_identifier(file_name: &str) -> Option<String> {
    let stem = strip_pdf_extension(file_name);
    let run = PREFIX_RE.find(stem)?.as_str();
    if run.chars().any(|c| c != '.') {
        Some(run.to_string())
    } else {
        None
    }
}

fn strip_pdf_extension(file_name: &str) -> &str {
    let len = file_name.len();
    if len >= 4
        && file_name.is_char_boundary(len - 4)
        && file_name[len - 4..].eq_ignore_ascii_case(".pdf")
    {
        &file_name[..len - 4]
    } else {
        file_name
    }
}

/// Where a document ended up after [`WorkFolder::restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Moved back to its original path.
    Restored(PathBuf),
    /// A file already occupied the original path; the document is still
    /// inside the work folder at the contained path.
    LeftInFolder(PathBuf),
}

impl RestoreOutcome {
    /// Current location of the document.
    pub fn document(&self) -> &Path {
        match self {
            RestoreOutcome::Restored(p) | RestoreOutcome::LeftInFolder(p) => p,
        }
    }
}

/// The per-document output directory and the two locations of the document.
#[derive(Debug, Clone)]
pub struct WorkFolder {
    identifier: String,
    path: PathBuf,
    original_dir: PathBuf,
    file_name: OsString,
}

impl WorkFolder {
    /// Resolve the work folder for `document`.
    ///
    /// Returns `Ok(None)` when the file name has no numeric prefix. Nothing is
    /// created on disk; see [`WorkFolder::create`].
    pub fn for_document(document: &Path) -> Result<Option<Self>, PdfImgError> {
        let Some(file_name) = document.file_name() else {
            return Ok(None);
        };
        let Some(identifier) = folder_identifier(&file_name.to_string_lossy()) else {
            return Ok(None);
        };

        let absolute = std::path::absolute(document).map_err(|e| {
            PdfImgError::Internal(format!(
                "cannot resolve absolute path of '{}': {e}",
                document.display()
            ))
        })?;
        let original_dir = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let path = original_dir.join(&identifier);

        Ok(Some(Self {
            identifier,
            path,
            original_dir,
            file_name: file_name.to_os_string(),
        }))
    }

    /// Folder name, e.g. `1.2.3`.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Absolute path of the work folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the document lives before placement and after a successful restore.
    pub fn original_path(&self) -> PathBuf {
        self.original_dir.join(&self.file_name)
    }

    /// Where the document lives while it is being processed.
    pub fn placed_path(&self) -> PathBuf {
        self.path.join(&self.file_name)
    }

    /// Create the work folder. Succeeds if it already exists.
    pub async fn create(&self) -> Result<(), PdfImgError> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|source| PdfImgError::CreateFolderFailed {
                path: self.path.clone(),
                source,
            })?;
        debug!("Work folder ready: {}", self.path.display());
        Ok(())
    }

    /// Move the document into the work folder, keeping its name.
    ///
    /// Fails with [`PdfImgError::PlacementOccupied`] when the folder already
    /// holds a file of that name; neither file is touched.
    pub async fn place(&self) -> Result<PathBuf, PdfImgError> {
        let from = self.original_path();
        let to = self.placed_path();

        let occupied = tokio::fs::try_exists(&to)
            .await
            .map_err(|source| PdfImgError::MoveFailed {
                from: from.clone(),
                to: to.clone(),
                source,
            })?;
        if occupied {
            warn!(
                "'{}' already exists; not moving '{}' into it",
                to.display(),
                from.display()
            );
            return Err(PdfImgError::PlacementOccupied { path: to });
        }

        move_file(&from, &to).await?;
        info!(
            "Moved '{}' to '{}/'",
            self.file_name.to_string_lossy(),
            self.path.display()
        );
        Ok(to)
    }

    /// Move the document back to its original directory unless that would
    /// overwrite an existing file.
    pub async fn restore(&self) -> Result<RestoreOutcome, PdfImgError> {
        let from = self.placed_path();
        let to = self.original_path();

        let occupied = tokio::fs::try_exists(&to)
            .await
            .map_err(|source| PdfImgError::MoveFailed {
                from: from.clone(),
                to: to.clone(),
                source,
            })?;
        if occupied {
            warn!(
                "A file named '{}' already exists at '{}'; leaving the PDF in '{}/'",
                self.file_name.to_string_lossy(),
                to.display(),
                self.path.display()
            );
            return Ok(RestoreOutcome::LeftInFolder(from));
        }

        move_file(&from, &to).await?;
        info!(
            "Moved '{}' out of '{}/' back to '{}'",
            self.file_name.to_string_lossy(),
            self.path.display(),
            to.display()
        );
        Ok(RestoreOutcome::Restored(to))
    }
}

/// Rename `from` to `to`, falling back to copy + delete across devices.
pub async fn move_file(from: &Path, to: &Path) -> Result<(), PdfImgError> {
    let err = |source| PdfImgError::MoveFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(
                "rename across devices, copying '{}' → '{}'",
                from.display(),
                to.display()
            );
            tokio::fs::copy(from, to).await.map_err(err)?;
            tokio::fs::remove_file(from).await.map_err(err)
        }
        Err(e) => Err(err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_leading_digit_dot_run_of_stem() {
        assert_eq!(folder_identifier("1.2.3.pdf").as_deref(), Some("1.2.3"));
        assert_eq!(folder_identifier("12 Chapter.pdf").as_deref(), Some("12"));
        assert_eq!(folder_identifier("3.1.4-draft.pdf").as_deref(), Some("3.1.4"));
        assert_eq!(folder_identifier("2.pdf").as_deref(), Some("2"));
        assert_eq!(folder_identifier("7.PDF").as_deref(), Some("7"));
        assert_eq!(folder_identifier("1.2.3..pdf").as_deref(), Some("1.2.3."));
    }

    #[test]
    fn identifier_absent_without_prefix() {
        assert_eq!(folder_identifier("notes.pdf"), None);
        assert_eq!(folder_identifier("v1.2.pdf"), None);
        assert_eq!(folder_identifier(" 1.pdf"), None);
        assert_eq!(folder_identifier(".pdf"), None);
        assert_eq!(folder_identifier("...pdf"), None);
        assert_eq!(folder_identifier("..hidden.pdf"), None);
    }

    #[test]
    fn strip_extension_is_case_insensitive() {
        assert_eq!(strip_pdf_extension("a.PdF"), "a");
        assert_eq!(strip_pdf_extension("a.txt"), "a.txt");
        assert_eq!(strip_pdf_extension("pdf"), "pdf");
        assert_eq!(strip_pdf_extension("é.pdf"), "é");
    }

    #[test]
    fn for_document_resolves_sibling_folder() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("1.2.3.pdf");
        let wf = WorkFolder::for_document(&doc).unwrap().unwrap();

        assert_eq!(wf.identifier(), "1.2.3");
        assert_eq!(wf.path(), dir.path().join("1.2.3"));
        assert_eq!(wf.original_path(), doc);
        assert_eq!(wf.placed_path(), dir.path().join("1.2.3").join("1.2.3.pdf"));
    }

    #[test]
    fn for_document_without_prefix_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WorkFolder::for_document(&dir.path().join("notes.pdf"))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let wf = WorkFolder::for_document(&dir.path().join("5.pdf")).unwrap().unwrap();
        wf.create().await.unwrap();
        wf.create().await.unwrap();
        assert!(wf.path().is_dir());
    }

    #[tokio::test]
    async fn place_then_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("4.2 Slides.pdf");
        std::fs::write(&doc, b"%PDF-1.4").unwrap();

        let wf = WorkFolder::for_document(&doc).unwrap().unwrap();
        wf.create().await.unwrap();
        let placed = wf.place().await.unwrap();
        assert!(!doc.exists());
        assert_eq!(std::fs::read(&placed).unwrap(), b"%PDF-1.4");

        let outcome = wf.restore().await.unwrap();
        assert_eq!(outcome, RestoreOutcome::Restored(doc.clone()));
        assert!(doc.exists());
        assert!(!placed.exists());
    }

    #[tokio::test]
    async fn restore_leaves_document_on_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("9.pdf");
        std::fs::write(&doc, b"original").unwrap();

        let wf = WorkFolder::for_document(&doc).unwrap().unwrap();
        wf.create().await.unwrap();
        let placed = wf.place().await.unwrap();

        std::fs::write(&doc, b"newcomer").unwrap();
        let outcome = wf.restore().await.unwrap();

        assert_eq!(outcome, RestoreOutcome::LeftInFolder(placed.clone()));
        assert_eq!(std::fs::read(&doc).unwrap(), b"newcomer");
        assert_eq!(std::fs::read(&placed).unwrap(), b"original");
    }

    #[tokio::test]
    async fn place_refuses_to_overwrite_file_in_folder() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("6.pdf");
        std::fs::write(&doc, b"incoming").unwrap();

        let wf = WorkFolder::for_document(&doc).unwrap().unwrap();
        wf.create().await.unwrap();
        std::fs::write(wf.placed_path(), b"left from last run").unwrap();

        let err = wf.place().await.unwrap_err();
        assert!(
            matches!(&err, PdfImgError::PlacementOccupied { path } if *path == wf.placed_path())
        );
        assert_eq!(std::fs::read(&doc).unwrap(), b"incoming");
        assert_eq!(
            std::fs::read(wf.placed_path()).unwrap(),
            b"left from last run"
        );
    }

    #[tokio::test]
    async fn move_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_file(&dir.path().join("a"), &dir.path().join("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, PdfImgError::MoveFailed { .. }));
    }
}
