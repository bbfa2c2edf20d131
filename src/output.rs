//! Result types produced by the pipeline.
//!
//! [`FileOutcome`] is the terminal state of one document; [`BatchReport`]
//! collects them for a whole run. Both serialise with serde so the CLI can
//! emit them as JSON.

use crate::error::CompressionErrorKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One image written to a work folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// 1-indexed page number.
    pub page: usize,
    /// 1-indexed position of the image among the page's images.
    pub index: usize,
    /// File name inside the work folder, e.g. `page2_img1.jpeg`.
    pub file_name: String,
    /// Size of the image as extracted from the PDF.
    pub original_bytes: usize,
    /// Size actually written (equals `original_bytes` on fallback).
    pub written_bytes: usize,
    /// `false` when compression failed and the original bytes were kept.
    pub compressed: bool,
    /// Why compression failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<CompressionErrorKind>,
}

/// Terminal state of a single input path that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileOutcome {
    /// The name does not end in `.pdf`; nothing was touched.
    SkippedNotPdf,
    /// The name has no leading digit/dot run; nothing was touched.
    SkippedNoPrefix,
    /// The document contains no embedded images. No manifest was written;
    /// the (empty) work folder remains.
    SkippedNoImages {
        folder: PathBuf,
        /// Where the document ended up (restored, or still in the folder).
        document: PathBuf,
    },
    /// Images and manifest written, document moved back to its original place.
    Restored {
        folder: PathBuf,
        manifest: PathBuf,
        document: PathBuf,
        images: Vec<ImageRecord>,
    },
    /// Images and manifest written, but a file with the document's name
    /// already existed in the original directory, so the document stayed in
    /// its work folder.
    LeftInFolder {
        folder: PathBuf,
        manifest: PathBuf,
        document: PathBuf,
        images: Vec<ImageRecord>,
    },
}

impl FileOutcome {
    /// Images written for this document (empty for skips).
    pub fn images(&self) -> &[ImageRecord] {
        match self {
            FileOutcome::Restored { images, .. } | FileOutcome::LeftInFolder { images, .. } => {
                images
            }
            _ => &[],
        }
    }

    /// The work folder, when one was created.
    pub fn folder(&self) -> Option<&Path> {
        match self {
            FileOutcome::SkippedNoImages { folder, .. }
            | FileOutcome::Restored { folder, .. }
            | FileOutcome::LeftInFolder { folder, .. } => Some(folder),
            _ => None,
        }
    }

    /// `true` for the `Skipped*` states.
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            FileOutcome::SkippedNotPdf
                | FileOutcome::SkippedNoPrefix
                | FileOutcome::SkippedNoImages { .. }
        )
    }

    /// Short human-readable label, used in terminal summaries.
    pub fn label(&self) -> &'static str {
        match self {
            FileOutcome::SkippedNotPdf => "skipped (not a PDF)",
            FileOutcome::SkippedNoPrefix => "skipped (no numeric prefix)",
            FileOutcome::SkippedNoImages { .. } => "no images found",
            FileOutcome::Restored { .. } => "done",
            FileOutcome::LeftInFolder { .. } => "done (left in folder)",
        }
    }
}

/// What happened to one path of the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Done { outcome: FileOutcome },
    Failed { error: String },
}

/// One entry of a [`BatchReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
}

impl FileReport {
    pub fn outcome(&self) -> Option<&FileOutcome> {
        match &self.status {
            FileStatus::Done { outcome } => Some(outcome),
            FileStatus::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed { .. })
    }
}

/// Results of a whole batch, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_failed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.outcome().is_some_and(FileOutcome::is_skipped))
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }

    fn images(&self) -> impl Iterator<Item = &ImageRecord> {
        self.files
            .iter()
            .filter_map(FileReport::outcome)
            .flat_map(FileOutcome::images)
    }

    pub fn images_written(&self) -> usize {
        self.images().count()
    }

    pub fn images_compressed(&self) -> usize {
        self.images().filter(|i| i.compressed).count()
    }

    pub fn original_bytes(&self) -> u64 {
        self.images().map(|i| i.original_bytes as u64).sum()
    }

    pub fn written_bytes(&self) -> u64 {
        self.images().map(|i| i.written_bytes as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(compressed: bool, original: usize, written: usize) -> ImageRecord {
        ImageRecord {
            page: 1,
            index: 1,
            file_name: "page1_img1.png".into(),
            original_bytes: original,
            written_bytes: written,
            compressed,
            fallback_reason: (!compressed).then_some(CompressionErrorKind::Network),
        }
    }

    #[test]
    fn batch_totals() {
        let report = BatchReport {
            files: vec![
                FileReport {
                    path: "1.pdf".into(),
                    status: FileStatus::Done {
                        outcome: FileOutcome::Restored {
                            folder: "1".into(),
                            manifest: "1/1.md".into(),
                            document: "1.pdf".into(),
                            images: vec![record(true, 100, 40), record(false, 30, 30)],
                        },
                    },
                },
                FileReport {
                    path: "notes.pdf".into(),
                    status: FileStatus::Done {
                        outcome: FileOutcome::SkippedNoPrefix,
                    },
                },
                FileReport {
                    path: "2.pdf".into(),
                    status: FileStatus::Failed {
                        error: "corrupt".into(),
                    },
                },
            ],
        };

        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert!(report.has_failures());
        assert_eq!(report.images_written(), 2);
        assert_eq!(report.images_compressed(), 1);
        assert_eq!(report.original_bytes(), 130);
        assert_eq!(report.written_bytes(), 70);
    }

    #[test]
    fn outcome_json_is_tagged() {
        let report = FileReport {
            path: "notes.pdf".into(),
            status: FileStatus::Done {
                outcome: FileOutcome::SkippedNoPrefix,
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["outcome"]["state"], "skipped_no_prefix");
    }

    #[test]
    fn fallback_reason_omitted_when_compressed() {
        let json = serde_json::to_value(record(true, 10, 5)).unwrap();
        assert!(json.get("fallback_reason").is_none());
    }
}
