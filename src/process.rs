//! Batch and per-document entry points.
//!
//! Everything here runs strictly in sequence: one document at a time, one
//! image at a time, one compression request in flight. A failing document is
//! reported and the batch moves on; nothing already written is rolled back.

use crate::config::ProcessConfig;
use crate::error::PdfImgError;
use crate::output::{BatchReport, FileOutcome, FileReport, FileStatus, ImageRecord};
use crate::pipeline::compress::ImageCompressor;
use crate::pipeline::extract::{ExtractedImage, PdfImageSource};
use crate::pipeline::manifest::write_manifest;
use crate::pipeline::placement::{RestoreOutcome, WorkFolder};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// `true` when the file name ends in `.pdf`, in any case.
pub fn is_pdf_path(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}

/// Run one document through the whole pipeline.
///
/// # Returns
/// The terminal [`FileOutcome`]. A document whose original name got taken
/// while it was being processed yields [`FileOutcome::LeftInFolder`], not an
/// error.
///
/// # Errors
/// Any filesystem or parse failure for this document. Files already written
/// to the work folder stay there, and so does the document itself if the
/// failure happened after it was moved.
pub async fn process_file(
    path: &Path,
    compressor: &dyn ImageCompressor,
    config: &ProcessConfig,
) -> Result<FileOutcome, PdfImgError> {
    // ── Step 1: Work folder ──────────────────────────────────────────────
    let Some(folder) = WorkFolder::for_document(path)? else {
        info!("Skipping '{}': no numeric prefix", path.display());
        return Ok(FileOutcome::SkippedNoPrefix);
    };

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(PdfImgError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    folder.create().await?;

    // ── Step 2: Move in ──────────────────────────────────────────────────
    let placed = folder.place().await?;

    // ── Step 3: Extract + compress ───────────────────────────────────────
    let images = extract_and_compress(&placed, folder.path(), compressor, config).await?;

    if images.is_empty() {
        info!("No images found in '{}'", path.display());
        let restored = folder.restore().await?;
        return Ok(FileOutcome::SkippedNoImages {
            folder: folder.path().to_path_buf(),
            document: restored.document().to_path_buf(),
        });
    }

    // ── Step 4: Manifest ─────────────────────────────────────────────────
    let names: Vec<&str> = images.iter().map(|r| r.file_name.as_str()).collect();
    let manifest = write_manifest(folder.path(), &names, &config.manifest_extension).await?;

    // ── Step 5: Move back ────────────────────────────────────────────────
    let folder_path = folder.path().to_path_buf();
    Ok(match folder.restore().await? {
        RestoreOutcome::Restored(document) => FileOutcome::Restored {
            folder: folder_path,
            manifest,
            document,
            images,
        },
        RestoreOutcome::LeftInFolder(document) => FileOutcome::LeftInFolder {
            folder: folder_path,
            manifest,
            document,
            images,
        },
    })
}

/// Extract every embedded image of `pdf` into `folder`, compressing each one
/// on the way.
///
/// Images are visited page by page in resource order. A failed compression
/// writes the original bytes. Every listed image produces a file; encodings
/// without a standard container are written raw with the `bin` extension.
///
/// # Returns
/// Records of the written images in extraction order; empty when the
/// document has none.
pub async fn extract_and_compress(
    pdf: &Path,
    folder: &Path,
    compressor: &dyn ImageCompressor,
    config: &ProcessConfig,
) -> Result<Vec<ImageRecord>, PdfImgError> {
    let source = PdfImageSource::open(pdf).await?;
    let page_count = source.page_count();
    debug!("Scanning {} pages of '{}'", page_count, pdf.display());

    let mut records = Vec::new();

    for page_index in 0..page_count {
        let page = page_index + 1;
        for (i, id) in source.page_image_refs(page_index).into_iter().enumerate() {
            let index = i + 1;
            let raw = source
                .extract_image(id)
                .map_err(|e| PdfImgError::CorruptPdf {
                    path: pdf.to_path_buf(),
                    detail: format!("page {page} image {index}: {e}"),
                })?;

            let image = ExtractedImage::new(page, index, raw);
            let file_name = image.file_name();
            let original_bytes = image.data.len();

            let attempt = compressor.compress(&image.data).await;
            let (data, fallback_reason) = match attempt {
                Ok(result) => {
                    if let Some(count) = result.compression_count {
                        debug!("Compression count this month: {count}");
                    }
                    (result.data, None)
                }
                Err(e) => {
                    warn!("Compression failed for {file_name}, keeping original: {e}");
                    (image.data, Some(e.kind))
                }
            };

            let target = folder.join(&file_name);
            tokio::fs::write(&target, &data)
                .await
                .map_err(|source| PdfImgError::WriteFailed {
                    path: target.clone(),
                    source,
                })?;

            let compressed = fallback_reason.is_none();
            info!(
                "Saved {} ({} → {} bytes{})",
                file_name,
                original_bytes,
                data.len(),
                if compressed { "" } else { ", uncompressed" }
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_image_written(&file_name, data.len(), compressed);
            }

            records.push(ImageRecord {
                page,
                index,
                file_name,
                original_bytes,
                written_bytes: data.len(),
                compressed,
                fallback_reason,
            });
        }
    }

    Ok(records)
}

/// Process every path in order and collect a report.
///
/// Never fails as a whole: per-file errors are logged, passed to the
/// progress callback and recorded as [`FileStatus::Failed`].
pub async fn process_batch<P: AsRef<Path>>(
    paths: &[P],
    compressor: &dyn ImageCompressor,
    config: &ProcessConfig,
) -> BatchReport {
    let start = Instant::now();
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_batch_start(paths.len());
    }

    let mut report = BatchReport::default();

    for path in paths {
        let path = path.as_ref();

        let status = if !is_pdf_path(path) {
            info!("Skipping '{}': not a PDF", path.display());
            if let Some(cb) = cb {
                cb.on_file_skipped(path, "not a PDF");
            }
            FileStatus::Done {
                outcome: FileOutcome::SkippedNotPdf,
            }
        } else {
            if let Some(cb) = cb {
                cb.on_file_start(path);
            }
            match process_file(path, compressor, config).await {
                Ok(outcome) => {
                    if let Some(cb) = cb {
                        match outcome {
                            FileOutcome::SkippedNoPrefix => {
                                cb.on_file_skipped(path, "no numeric prefix")
                            }
                            _ => cb.on_file_complete(path, &outcome),
                        }
                    }
                    FileStatus::Done { outcome }
                }
                Err(e) => {
                    error!("Error processing '{}': {}", path.display(), e);
                    if let Some(cb) = cb {
                        cb.on_file_error(path, &e.to_string());
                    }
                    FileStatus::Failed {
                        error: e.to_string(),
                    }
                }
            }
        };

        report.files.push(FileReport {
            path: path.to_path_buf(),
            status,
        });
    }

    info!(
        "Batch complete: {} files, {} failed, {} images in {}ms",
        paths.len(),
        report.failed_count(),
        report.images_written(),
        start.elapsed().as_millis()
    );
    if let Some(cb) = cb {
        cb.on_batch_complete(paths.len(), report.failed_count());
    }

    report
}
