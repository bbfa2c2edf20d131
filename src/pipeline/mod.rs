//! Pipeline stages for extracting images from a PDF.
//!
//! Each submodule implements exactly one step; [`crate::process`] strings
//! them together per document.
//!
//! ## Data Flow
//!
//! ```text
//! placement ──▶ extract ──▶ compress ──▶ manifest ──▶ placement
//! (move in)     (lopdf)     (Tinify)     (.md)        (move back)
//! ```
//!
//! 1. [`placement`] — derive the work folder from the numeric prefix, move
//!    the document in, and back out at the end unless its name got taken
//! 2. [`extract`]   — enumerate image XObjects per page and read each as a
//!    standalone file; parsing runs in `spawn_blocking`
//! 3. [`compress`]  — shrink each image through the Tinify web API; the only
//!    stage with network I/O
//! 4. [`manifest`]  — write the Markdown note embedding every image

pub mod compress;
pub mod extract;
pub mod manifest;
pub mod placement;
