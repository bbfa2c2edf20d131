//! Image extraction: enumerate the embedded raster images of each page and
//! read them out as self-contained image files.
//!
//! ## Enumeration
//!
//! A page's images are the `/Subtype /Image` XObjects reachable from its
//! `/Resources` (inherited from parent page-tree nodes when the page has
//! none), including those nested in Form XObjects. Order follows the
//! resource dictionaries; each object reference appears at most once per page
//! even when it is registered under several names.
//!
//! ## Reading
//!
//! Streams that already hold a complete image file are passed through: JPEG
//! (`DCTDecode`), JPEG 2000 (`JPXDecode`) and JBIG2. General-purpose filters
//! in front of them (`[/FlateDecode /DCTDecode]`) are undone first. CCITT fax
//! data is wrapped in a single-strip TIFF. Everything else is a bare pixel
//! buffer; it is decoded and wrapped in a PNG container so the written file
//! opens in any viewer. Pixel values are not altered.
//!
//! An image in an encoding none of the above covers (Separation colour, odd
//! bit depths, exotic filters) is written as its stream bytes with the `bin`
//! extension, so every listed image still produces a file.

use crate::error::PdfImgError;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Images larger than this many pixels are not decoded.
const MAX_PIXELS: usize = 200_000_000;

/// Maximum depth when walking `/Parent` chains and nested Form XObjects.
const MAX_DEPTH: usize = 32;

/// Failure to turn one image object into an image file.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No standard container for this encoding; `extract_image` recovers
    /// by writing the stream bytes.
    #[error("unsupported image encoding: {0}")]
    Unsupported(String),

    /// The image dictionary or pixel data is inconsistent.
    #[error("malformed image: {0}")]
    Malformed(String),

    /// The object graph itself is broken (dangling reference, not a stream).
    #[error("PDF object error: {0}")]
    Pdf(#[from] lopdf::Error),
}

/// Bytes and file extension of one image as it will be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub data: Vec<u8>,
    /// Extension without the dot: `jpeg`, `jpx`, `jb2`, `tiff`, `png` or `bin`.
    pub extension: &'static str,
}

/// One embedded image, addressed by page and position.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// 1-indexed page number.
    pub page: usize,
    /// 1-indexed position among the page's images.
    pub index: usize,
    pub data: Vec<u8>,
    pub extension: &'static str,
}

impl ExtractedImage {
    pub fn new(page: usize, index: usize, raw: RawImage) -> Self {
        Self {
            page,
            index,
            data: raw.data,
            extension: raw.extension,
        }
    }

    /// Destination file name, e.g. `page3_img2.jpeg`.
    pub fn file_name(&self) -> String {
        image_file_name(self.page, self.index, self.extension)
    }
}

/// `page{P}_img{I}.{ext}` with 1-indexed `page` and `index`.
pub fn image_file_name(page: usize, index: usize, extension: &str) -> String {
    format!("page{page}_img{index}.{extension}")
}

/// An opened PDF, exposing pages and their image objects.
pub struct PdfImageSource {
    document: Document,
}

impl PdfImageSource {
    /// Load a PDF from disk.
    ///
    /// Parsing runs on the blocking pool; lopdf reads and tokenises the whole
    /// file up front.
    pub async fn open(path: &Path) -> Result<Self, PdfImgError> {
        let owned = path.to_path_buf();
        let document = tokio::task::spawn_blocking(move || Document::load(&owned))
            .await
            .map_err(|e| PdfImgError::Internal(format!("PDF load task panicked: {e}")))?
            .map_err(|e| PdfImgError::CorruptPdf {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        debug!(pages = document.get_pages().len(), "PDF loaded: {}", path.display());

        Ok(Self { document })
    }

    /// Wrap an already-parsed document.
    pub fn from_document(document: Document) -> Self {
        Self { document }
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Image object references of the page at 0-based `page_index`, in
    /// resource order, deduplicated.
    pub fn page_image_refs(&self, page_index: usize) -> Vec<ObjectId> {
        let Some(page_id) = self.document.get_pages().values().nth(page_index).copied() else {
            return Vec::new();
        };
        let Some(resources) = self.page_resources(page_id) else {
            return Vec::new();
        };

        let mut images = Vec::new();
        let mut seen = HashSet::new();
        let mut forms = HashSet::new();
        self.collect_images(resources, &mut images, &mut seen, &mut forms, 0);
        images
    }

    /// Read the image object `id` as a file-ready byte buffer.
    ///
    /// Every image yields a file. Encodings that cannot be expressed as a
    /// standard image container are written as their filter-decoded stream
    /// bytes with the `bin` extension.
    pub fn extract_image(&self, id: ObjectId) -> Result<RawImage, ExtractError> {
        let stream = self.document.get_object(id)?.as_stream()?;
        let filters = self.filter_names(&stream.dict);
        let (last, leading) = match filters.split_last() {
            Some((last, leading)) => (Some(last.as_slice()), leading),
            None => (None, &filters[..]),
        };

        let passthrough = |extension: &'static str| {
            self.undo_filters(stream, leading)
                .map(|data| RawImage { data, extension })
        };
        let result = match last {
            Some(b"DCTDecode" | b"DCT") => passthrough("jpeg"),
            Some(b"JPXDecode") => passthrough("jpx"),
            Some(b"JBIG2Decode") => passthrough("jb2"),
            Some(b"CCITTFaxDecode" | b"CCF") => self
                .undo_filters(stream, leading)
                .and_then(|data| self.wrap_ccitt(stream, &data)),
            _ => self
                .decode_pixels(stream, &filters)
                .and_then(|image| encode_png(&image)),
        };

        match result {
            Err(ExtractError::Unsupported(detail)) => {
                warn!(
                    "Image object {} {}: {detail}; writing raw stream data",
                    id.0, id.1
                );
                let data = self
                    .undo_filters(stream, &filters)
                    .unwrap_or_else(|_| stream.content.clone());
                Ok(RawImage {
                    data,
                    extension: "bin",
                })
            }
            other => other,
        }
    }

    // ── Enumeration helpers ──────────────────────────────────────────────

    fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.document.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn resolve_dict<'a>(&'a self, obj: &'a Object) -> Option<&'a Dictionary> {
        self.resolve(obj)?.as_dict().ok()
    }

    /// `/Resources` of the page, or of the nearest ancestor that has one.
    fn page_resources(&self, page_id: ObjectId) -> Option<&Dictionary> {
        let mut node = self.document.get_object(page_id).ok()?.as_dict().ok()?;
        for _ in 0..MAX_DEPTH {
            if let Ok(resources) = node.get(b"Resources") {
                return self.resolve_dict(resources);
            }
            let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
            node = self.document.get_object(parent).ok()?.as_dict().ok()?;
        }
        None
    }

    fn collect_images(
        &self,
        resources: &Dictionary,
        images: &mut Vec<ObjectId>,
        seen: &mut HashSet<ObjectId>,
        forms: &mut HashSet<ObjectId>,
        depth: usize,
    ) {
        if depth > MAX_DEPTH {
            return;
        }
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|o| self.resolve_dict(o))
        else {
            return;
        };

        for (_name, value) in xobjects.iter() {
            // XObjects are streams, and streams are always indirect.
            let Ok(id) = value.as_reference() else {
                continue;
            };
            let Ok(Object::Stream(stream)) = self.document.get_object(id) else {
                continue;
            };

            match stream.dict.get(b"Subtype").and_then(Object::as_name) {
                Ok(b"Image") => {
                    if seen.insert(id) {
                        images.push(id);
                    }
                }
                Ok(b"Form") => {
                    if !forms.insert(id) {
                        continue;
                    }
                    if let Some(form_resources) = stream
                        .dict
                        .get(b"Resources")
                        .ok()
                        .and_then(|o| self.resolve_dict(o))
                    {
                        self.collect_images(form_resources, images, seen, forms, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    // ── Decoding helpers ─────────────────────────────────────────────────

    fn filter_names(&self, dict: &Dictionary) -> Vec<Vec<u8>> {
        let Some(filter) = dict.get(b"Filter").ok().and_then(|f| self.resolve(f)) else {
            return Vec::new();
        };
        match filter {
            Object::Name(n) => vec![n.clone()],
            Object::Array(arr) => arr
                .iter()
                .filter_map(|f| match self.resolve(f) {
                    Some(Object::Name(n)) => Some(n.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Decode `filters` (a prefix of the stream's chain) with lopdf.
    fn undo_filters(
        &self,
        stream: &Stream,
        filters: &[Vec<u8>],
    ) -> Result<Vec<u8>, ExtractError> {
        if filters.is_empty() {
            return Ok(stream.content.clone());
        }
        let total = self.filter_names(&stream.dict).len();
        let mut dict = Dictionary::new();
        let mut names: Vec<Object> = filters.iter().map(|f| Object::Name(f.clone())).collect();
        if names.len() == 1 {
            dict.set("Filter", names.remove(0));
        } else {
            dict.set("Filter", Object::Array(names));
        }
        if let Some(parms) = self.leading_parms(&stream.dict, filters.len(), total) {
            dict.set("DecodeParms", parms);
        }
        Stream::new(dict, stream.content.clone())
            .decompressed_content()
            .map_err(|e| ExtractError::Unsupported(format!("stream filter: {e}")))
    }

    /// `/DecodeParms` belonging to the first `n` of `total` filters.
    fn leading_parms(&self, dict: &Dictionary, n: usize, total: usize) -> Option<Object> {
        match self.resolve(dict.get(b"DecodeParms").ok()?)? {
            Object::Array(parms) => {
                let mut taken: Vec<Object> = parms
                    .iter()
                    .take(n)
                    .map(|p| self.resolve(p).cloned().unwrap_or(Object::Null))
                    .collect();
                if n == 1 {
                    taken.pop().filter(|p| !matches!(p, Object::Null))
                } else {
                    Some(Object::Array(taken))
                }
            }
            Object::Dictionary(d) if n == total => Some(Object::Dictionary(d.clone())),
            _ => None,
        }
    }

    /// `/DecodeParms` of the last filter in the chain.
    fn last_parms<'a>(&'a self, dict: &'a Dictionary) -> Option<&'a Dictionary> {
        match self.resolve(dict.get(b"DecodeParms").ok()?)? {
            Object::Array(parms) => self.resolve(parms.last()?)?.as_dict().ok(),
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Wrap CCITT group 3/4 fax data in a single-strip TIFF.
    fn wrap_ccitt(&self, stream: &Stream, data: &[u8]) -> Result<RawImage, ExtractError> {
        let parms = self.last_parms(&stream.dict);
        let int = |key: &[u8]| parms.and_then(|d| self.int(d, key));
        let flag = |key: &[u8]| {
            matches!(
                parms.and_then(|d| d.get(key).ok()).and_then(|o| self.resolve(o)),
                Some(Object::Boolean(true))
            )
        };

        let width = int(b"Columns")
            .or_else(|| self.int(&stream.dict, b"Width"))
            .unwrap_or(1728);
        let height = self
            .int(&stream.dict, b"Height")
            .or_else(|| int(b"Rows"))
            .unwrap_or(0);
        let in_range = |v: i64| v > 0 && v <= u32::MAX as i64;
        if !in_range(width) || !in_range(height) {
            return Err(ExtractError::Malformed(format!(
                "CCITT image is {width}x{height}"
            )));
        }

        let layout = CcittLayout {
            width: width as u32,
            height: height as u32,
            k: int(b"K").unwrap_or(0),
            black_is_1: flag(b"BlackIs1"),
            byte_align: flag(b"EncodedByteAlign"),
        };
        Ok(RawImage {
            data: ccitt_tiff(data, &layout),
            extension: "tiff",
        })
    }

    fn int(&self, dict: &Dictionary, key: &[u8]) -> Option<i64> {
        match self.resolve(dict.get(key).ok()?)? {
            Object::Integer(i) => Some(*i),
            Object::Real(r) => Some(*r as i64),
            _ => None,
        }
    }

    fn decode_pixels(
        &self,
        stream: &Stream,
        filters: &[Vec<u8>],
    ) -> Result<DynamicImage, ExtractError> {
        let dict = &stream.dict;
        let width = self
            .int(dict, b"Width")
            .filter(|w| *w > 0)
            .ok_or_else(|| ExtractError::Malformed("missing or invalid /Width".into()))?
            as usize;
        let height = self
            .int(dict, b"Height")
            .filter(|h| *h > 0)
            .ok_or_else(|| ExtractError::Malformed("missing or invalid /Height".into()))?
            as usize;
        if width.saturating_mul(height) > MAX_PIXELS {
            return Err(ExtractError::Unsupported(format!("{width}x{height} px")));
        }

        let is_mask = matches!(
            dict.get(b"ImageMask").ok().and_then(|o| self.resolve(o)),
            Some(Object::Boolean(true))
        );
        let bpc = if is_mask {
            1
        } else {
            self.int(dict, b"BitsPerComponent").unwrap_or(8) as u32
        };
        let model = if is_mask {
            ColorModel::Gray
        } else {
            let cs = dict
                .get(b"ColorSpace")
                .map_err(|_| ExtractError::Unsupported("image without /ColorSpace".into()))?;
            self.color_model(cs, 0)?
        };

        let data = self.undo_filters(stream, filters)?;

        let samples = unpack_samples(&data, width, height, model.components(), bpc)?;
        let invert = self.decode_inverted(dict);
        to_image(width, height, bpc, &model, &samples, invert)
    }

    /// `true` for a `/Decode [1 0]` array on a single-component image.
    fn decode_inverted(&self, dict: &Dictionary) -> bool {
        let Some(Object::Array(decode)) = dict.get(b"Decode").ok().and_then(|o| self.resolve(o))
        else {
            return false;
        };
        let num = |o: &Object| match o {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r as f64),
            _ => None,
        };
        decode.len() == 2
            && decode.first().and_then(num) == Some(1.0)
            && decode.get(1).and_then(num) == Some(0.0)
    }

    fn color_model(&self, cs: &Object, depth: usize) -> Result<ColorModel, ExtractError> {
        if depth > 2 {
            return Err(ExtractError::Unsupported("nested colour space".into()));
        }
        let cs = self
            .resolve(cs)
            .ok_or_else(|| ExtractError::Malformed("dangling /ColorSpace".into()))?;

        match cs {
            Object::Name(name) => simple_model(name),
            Object::Array(arr) => {
                let family = arr
                    .first()
                    .and_then(|o| self.resolve(o))
                    .and_then(|o| o.as_name().ok())
                    .ok_or_else(|| ExtractError::Malformed("empty /ColorSpace array".into()))?;
                match family {
                    b"ICCBased" => {
                        let n = arr
                            .get(1)
                            .and_then(|o| self.resolve(o))
                            .and_then(|o| o.as_stream().ok())
                            .and_then(|s| self.int(&s.dict, b"N"))
                            .ok_or_else(|| ExtractError::Malformed("ICCBased without /N".into()))?;
                        match n {
                            1 => Ok(ColorModel::Gray),
                            3 => Ok(ColorModel::Rgb),
                            4 => Ok(ColorModel::Cmyk),
                            other => Err(ExtractError::Unsupported(format!("ICCBased N={other}"))),
                        }
                    }
                    b"Indexed" | b"I" => self.indexed_model(arr, depth),
                    b"CalGray" | b"CalRGB" => simple_model(family),
                    other => Err(ExtractError::Unsupported(format!(
                        "colour space {}",
                        String::from_utf8_lossy(other)
                    ))),
                }
            }
            _ => Err(ExtractError::Malformed("invalid /ColorSpace".into())),
        }
    }

    fn indexed_model(&self, arr: &[Object], depth: usize) -> Result<ColorModel, ExtractError> {
        let [_, base, hival, lookup] = arr else {
            return Err(ExtractError::Malformed("Indexed needs 4 entries".into()));
        };
        let base = self.color_model(base, depth + 1)?;
        if matches!(base, ColorModel::Indexed { .. }) {
            return Err(ExtractError::Malformed("Indexed base is Indexed".into()));
        }
        let hival = match self.resolve(hival) {
            Some(Object::Integer(h)) if (0..=255).contains(h) => *h as usize,
            _ => return Err(ExtractError::Malformed("Indexed hival".into())),
        };
        let palette = match self.resolve(lookup) {
            Some(Object::String(bytes, _)) => bytes.clone(),
            Some(Object::Stream(s)) if s.dict.get(b"Filter").is_err() => s.content.clone(),
            Some(Object::Stream(s)) => s
                .decompressed_content()
                .map_err(|e| ExtractError::Malformed(format!("Indexed lookup stream: {e}")))?,
            _ => return Err(ExtractError::Malformed("Indexed lookup".into())),
        };
        Ok(ColorModel::Indexed {
            base_components: base.components(),
            hival,
            palette,
        })
    }
}

#[derive(Debug, Clone)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    Indexed {
        base_components: usize,
        hival: usize,
        palette: Vec<u8>,
    },
}

impl ColorModel {
    fn components(&self) -> usize {
        match self {
            ColorModel::Gray | ColorModel::Indexed { .. } => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }
}

fn simple_model(name: &[u8]) -> Result<ColorModel, ExtractError> {
    match name {
        b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorModel::Gray),
        b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorModel::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(ColorModel::Cmyk),
        other => Err(ExtractError::Unsupported(format!(
            "colour space {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Split packed rows into one value per sample. Rows are byte-aligned.
fn unpack_samples(
    data: &[u8],
    width: usize,
    height: usize,
    components: usize,
    bpc: u32,
) -> Result<Vec<u16>, ExtractError> {
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(ExtractError::Unsupported(format!("{bpc} bits per component")));
    }
    let per_row = width * components;
    let row_bytes = (per_row * bpc as usize).div_ceil(8);
    let needed = row_bytes * height;
    if data.len() < needed {
        return Err(ExtractError::Malformed(format!(
            "pixel data is {} bytes, expected {needed}",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(per_row * height);
    for row in data.chunks_exact(row_bytes).take(height) {
        match bpc {
            8 => out.extend(row[..per_row].iter().map(|&b| b as u16)),
            16 => out.extend(
                row.chunks_exact(2)
                    .take(per_row)
                    .map(|p| u16::from_be_bytes([p[0], p[1]])),
            ),
            _ => {
                let per_byte = 8 / bpc;
                let mask = (1u16 << bpc) - 1;
                for i in 0..per_row {
                    let byte = row[i / per_byte as usize] as u16;
                    let shift = 8 - bpc * (i as u32 % per_byte + 1);
                    out.push((byte >> shift) & mask);
                }
            }
        }
    }
    Ok(out)
}

fn encode_png(image: &DynamicImage) -> Result<RawImage, ExtractError> {
    let mut data = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .map_err(|e| ExtractError::Malformed(format!("PNG encoding: {e}")))?;
    Ok(RawImage {
        data,
        extension: "png",
    })
}

/// Geometry and coding options of a CCITT fax stream.
#[derive(Debug, Clone, Copy)]
struct CcittLayout {
    width: u32,
    height: u32,
    /// `< 0` group 4, `0` group 3 1-D, `> 0` group 3 2-D.
    k: i64,
    black_is_1: bool,
    byte_align: bool,
}

/// Little-endian TIFF with one IFD and one strip holding `data` as-is.
fn ccitt_tiff(data: &[u8], layout: &CcittLayout) -> Vec<u8> {
    const SHORT: u16 = 3;
    const LONG: u16 = 4;

    let align = if layout.byte_align { 4 } else { 0 };
    let (compression, t4_options) = match layout.k {
        k if k < 0 => (4, None),
        0 => (3, Some(align)),
        _ => (3, Some(1 | align)),
    };

    // (tag, type, value), ascending by tag
    let mut entries: Vec<(u16, u16, u32)> = vec![
        (256, LONG, layout.width),
        (257, LONG, layout.height),
        (258, SHORT, 1),
        (259, SHORT, compression),
        (262, SHORT, u32::from(layout.black_is_1)),
        (273, LONG, 0),
        (277, SHORT, 1),
        (278, LONG, layout.height),
        (279, LONG, data.len() as u32),
    ];
    if let Some(options) = t4_options {
        entries.push((292, LONG, options));
    }
    let data_offset = 8 + 2 + entries.len() as u32 * 12 + 4;
    if let Some(strip) = entries.iter_mut().find(|e| e.0 == 273) {
        strip.2 = data_offset;
    }

    let mut out = Vec::with_capacity(data_offset as usize + data.len());
    out.extend_from_slice(b"II*\0");
    out.extend_from_slice(&8u32.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, kind, value) in entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        if kind == SHORT {
            out.extend_from_slice(&(value as u16).to_le_bytes());
            out.extend_from_slice(&[0, 0]);
        } else {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(data);
    out
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let k = 255 - k as u32;
    [
        ((255 - c as u32) * k / 255) as u8,
        ((255 - m as u32) * k / 255) as u8,
        ((255 - y as u32) * k / 255) as u8,
    ]
}

fn to_image(
    width: usize,
    height: usize,
    bpc: u32,
    model: &ColorModel,
    samples: &[u16],
    invert: bool,
) -> Result<DynamicImage, ExtractError> {
    let max = (1u32 << bpc) - 1;
    let scale = |v: u16| (v as u32 * 255 / max) as u8;
    let (w, h) = (width as u32, height as u32);
    let built = |ok: Option<DynamicImage>| {
        ok.ok_or_else(|| ExtractError::Malformed("pixel buffer size mismatch".into()))
    };

    match model {
        ColorModel::Gray => {
            let buf = samples
                .iter()
                .map(|&v| if invert { 255 - scale(v) } else { scale(v) })
                .collect();
            built(GrayImage::from_raw(w, h, buf).map(DynamicImage::ImageLuma8))
        }
        ColorModel::Rgb => {
            let buf = samples.iter().map(|&v| scale(v)).collect();
            built(RgbImage::from_raw(w, h, buf).map(DynamicImage::ImageRgb8))
        }
        ColorModel::Cmyk => {
            let mut buf = Vec::with_capacity(width * height * 3);
            for px in samples.chunks_exact(4) {
                buf.extend(cmyk_to_rgb(scale(px[0]), scale(px[1]), scale(px[2]), scale(px[3])));
            }
            built(RgbImage::from_raw(w, h, buf).map(DynamicImage::ImageRgb8))
        }
        ColorModel::Indexed {
            base_components,
            hival,
            palette,
        } => {
            let n = *base_components;
            let mut buf = Vec::with_capacity(width * height * 3);
            for &idx in samples {
                let start = (idx as usize).min(*hival) * n;
                let entry = palette.get(start..start + n).unwrap_or(&[]);
                let rgb = match (n, entry) {
                    (1, [g]) => [*g, *g, *g],
                    (3, [r, g, b]) => [*r, *g, *b],
                    (4, [c, m, y, k]) => cmyk_to_rgb(*c, *m, *y, *k),
                    _ => [0, 0, 0],
                };
                buf.extend(rgb);
            }
            built(RgbImage::from_raw(w, h, buf).map(DynamicImage::ImageRgb8))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, StringFormat};

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    /// Build a document whose pages register the given image streams under
    /// `/Im1`, `/Im2`, … in their own `/Resources`.
    fn doc_with_pages(pages: Vec<Vec<Stream>>) -> (Document, Vec<Vec<ObjectId>>) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();
        let mut ids = Vec::new();

        for images in pages {
            let mut xobjects = Dictionary::new();
            let mut page_ids = Vec::new();
            for (i, stream) in images.into_iter().enumerate() {
                let id = doc.add_object(stream);
                xobjects.set(format!("Im{}", i + 1), id);
                page_ids.push(id);
            }
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Resources" => dictionary! { "XObject" => xobjects },
            });
            kids.push(page_id.into());
            ids.push(page_ids);
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        (doc, ids)
    }

    fn jpeg_stream(payload: &[u8]) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            payload.to_vec(),
        )
    }

    fn raw_stream(width: i64, height: i64, cs: Object, bpc: i64, pixels: Vec<u8>) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => cs,
                "BitsPerComponent" => bpc,
            },
            pixels,
        )
    }

    #[test]
    fn file_name_is_one_indexed() {
        assert_eq!(image_file_name(1, 2, "png"), "page1_img2.png");
        let img = ExtractedImage::new(
            3,
            1,
            RawImage {
                data: vec![],
                extension: "jpeg",
            },
        );
        assert_eq!(img.file_name(), "page3_img1.jpeg");
    }

    #[test]
    fn enumerates_images_per_page_in_order() {
        let (doc, ids) = doc_with_pages(vec![
            vec![jpeg_stream(b"a"), jpeg_stream(b"b")],
            vec![],
            vec![jpeg_stream(b"c")],
        ]);
        let src = PdfImageSource::from_document(doc);

        assert_eq!(src.page_count(), 3);
        assert_eq!(src.page_image_refs(0), ids[0]);
        assert!(src.page_image_refs(1).is_empty());
        assert_eq!(src.page_image_refs(2), ids[2]);
        assert!(src.page_image_refs(3).is_empty());
    }

    #[test]
    fn same_image_under_two_names_is_listed_once() {
        let (mut doc, ids) = doc_with_pages(vec![vec![jpeg_stream(b"x")]]);
        let page_id = *doc.get_pages().values().next().unwrap();
        let image_id = ids[0][0];
        let page = doc.get_object_mut(page_id).unwrap().as_dict_mut().unwrap();
        let resources = page.get_mut(b"Resources").unwrap().as_dict_mut().unwrap();
        let xobjects = resources.get_mut(b"XObject").unwrap().as_dict_mut().unwrap();
        xobjects.set("Alias", image_id);

        let src = PdfImageSource::from_document(doc);
        assert_eq!(src.page_image_refs(0), vec![image_id]);
    }

    #[test]
    fn images_inside_form_xobjects_are_found() {
        let (mut doc, _) = doc_with_pages(vec![vec![]]);
        let image_id = doc.add_object(jpeg_stream(b"nested"));
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im9" => image_id },
                },
            },
            b"/Im9 Do".to_vec(),
        ));
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_object_mut(page_id).unwrap().as_dict_mut().unwrap();
        let resources = page.get_mut(b"Resources").unwrap().as_dict_mut().unwrap();
        resources.set("XObject", dictionary! { "Fm1" => form_id });

        let src = PdfImageSource::from_document(doc);
        assert_eq!(src.page_image_refs(0), vec![image_id]);
    }

    #[test]
    fn resources_are_inherited_from_page_tree() {
        let (mut doc, _) = doc_with_pages(vec![vec![]]);
        let image_id = doc.add_object(jpeg_stream(b"inherited"));
        let page_id = *doc.get_pages().values().next().unwrap();

        let parent_id = {
            let page = doc.get_object_mut(page_id).unwrap().as_dict_mut().unwrap();
            page.remove(b"Resources");
            page.get(b"Parent").unwrap().as_reference().unwrap()
        };
        let parent = doc.get_object_mut(parent_id).unwrap().as_dict_mut().unwrap();
        parent.set(
            "Resources",
            dictionary! { "XObject" => dictionary! { "Im1" => image_id } },
        );

        let src = PdfImageSource::from_document(doc);
        assert_eq!(src.page_image_refs(0), vec![image_id]);
    }

    #[test]
    fn jpeg_passes_through_unchanged() {
        let (doc, ids) = doc_with_pages(vec![vec![jpeg_stream(b"\xFF\xD8\xFFjpegdata")]]);
        let src = PdfImageSource::from_document(doc);
        let raw = src.extract_image(ids[0][0]).unwrap();
        assert_eq!(raw.extension, "jpeg");
        assert_eq!(raw.data, b"\xFF\xD8\xFFjpegdata");
    }

    #[test]
    fn raw_rgb_pixels_become_png() {
        let pixels = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
        let (doc, ids) =
            doc_with_pages(vec![vec![raw_stream(2, 2, "DeviceRGB".into(), 8, pixels)]]);
        let src = PdfImageSource::from_document(doc);
        let raw = src.extract_image(ids[0][0]).unwrap();

        assert_eq!(raw.extension, "png");
        assert!(raw.data.starts_with(PNG_MAGIC));
        let decoded = image::load_from_memory(&raw.data).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(decoded.get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn one_bit_gray_is_unpacked() {
        // 3 px wide: row bytes are padded to a whole byte.
        let (doc, ids) = doc_with_pages(vec![vec![raw_stream(
            3,
            2,
            "DeviceGray".into(),
            1,
            vec![0b1010_0000, 0b0100_0000],
        )]]);
        let src = PdfImageSource::from_document(doc);
        let raw = src.extract_image(ids[0][0]).unwrap();
        let decoded = image::load_from_memory(&raw.data).unwrap().to_luma8();

        let row0: Vec<u8> = (0..3).map(|x| decoded.get_pixel(x, 0).0[0]).collect();
        let row1: Vec<u8> = (0..3).map(|x| decoded.get_pixel(x, 1).0[0]).collect();
        assert_eq!(row0, vec![255, 0, 255]);
        assert_eq!(row1, vec![0, 255, 0]);
    }

    #[test]
    fn indexed_palette_is_expanded() {
        let cs = Object::Array(vec![
            "Indexed".into(),
            "DeviceRGB".into(),
            Object::Integer(1),
            Object::String(vec![10, 20, 30, 200, 210, 220], StringFormat::Hexadecimal),
        ]);
        let (doc, ids) = doc_with_pages(vec![vec![raw_stream(2, 1, cs, 8, vec![1, 0])]]);
        let src = PdfImageSource::from_document(doc);
        let decoded = image::load_from_memory(&src.extract_image(ids[0][0]).unwrap().data)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [200, 210, 220]);
        assert_eq!(decoded.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn truncated_pixels_are_malformed() {
        let (doc, ids) =
            doc_with_pages(vec![vec![raw_stream(4, 4, "DeviceRGB".into(), 8, vec![0; 5])]]);
        let src = PdfImageSource::from_document(doc);
        assert!(matches!(
            src.extract_image(ids[0][0]),
            Err(ExtractError::Malformed(_))
        ));
    }

    #[test]
    fn separation_colour_space_falls_back_to_raw_bytes() {
        let cs = Object::Array(vec![
            "Separation".into(),
            "Spot".into(),
            "DeviceCMYK".into(),
            Object::Null,
        ]);
        let (doc, ids) = doc_with_pages(vec![vec![raw_stream(1, 1, cs, 8, vec![0x42])]]);
        let src = PdfImageSource::from_document(doc);
        let raw = src.extract_image(ids[0][0]).unwrap();
        assert_eq!(raw.extension, "bin");
        assert_eq!(raw.data, vec![0x42]);
    }

    #[test]
    fn unknown_filter_falls_back_to_stream_bytes() {
        let mut stream = raw_stream(1, 1, "DeviceGray".into(), 8, b"opaque".to_vec());
        stream.dict.set("Filter", "BogusDecode");
        let (doc, ids) = doc_with_pages(vec![vec![stream]]);
        let src = PdfImageSource::from_document(doc);
        let raw = src.extract_image(ids[0][0]).unwrap();
        assert_eq!(raw.extension, "bin");
        assert_eq!(raw.data, b"opaque");
    }

    /// Flate-compress `payload` and declare `[/FlateDecode /<codec>]` on `dict`.
    fn flate_wrapped(mut dict: Dictionary, payload: &[u8], codec: &str) -> Stream {
        let mut inner = Stream::new(Dictionary::new(), payload.to_vec());
        let _ = inner.compress();
        assert_eq!(
            inner.dict.get(b"Filter").unwrap().as_name().unwrap(),
            b"FlateDecode"
        );
        dict.set(
            "Filter",
            vec![
                Object::Name(b"FlateDecode".to_vec()),
                Object::Name(codec.as_bytes().to_vec()),
            ],
        );
        Stream::new(dict, inner.content)
    }

    #[test]
    fn flate_wrapped_jpeg_is_unwrapped() {
        let mut payload = b"\xFF\xD8\xFF\xE0".to_vec();
        payload.extend(std::iter::repeat(0x55).take(4096));
        let dict = jpeg_stream(b"").dict;
        let stream = flate_wrapped(dict, &payload, "DCTDecode");
        assert_ne!(stream.content, payload);

        let (doc, ids) = doc_with_pages(vec![vec![stream]]);
        let src = PdfImageSource::from_document(doc);
        let raw = src.extract_image(ids[0][0]).unwrap();
        assert_eq!(raw.extension, "jpeg");
        assert_eq!(raw.data, payload);
    }

    fn ccitt_stream(parms: Dictionary, payload: &[u8]) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 16,
                "Height" => 2,
                "ImageMask" => true,
                "Filter" => "CCITTFaxDecode",
                "DecodeParms" => parms,
            },
            payload.to_vec(),
        )
    }

    /// Value of a single-valued IFD entry.
    fn tiff_tag(tiff: &[u8], tag: u16) -> Option<u32> {
        let count = u16::from_le_bytes([tiff[8], tiff[9]]) as usize;
        (0..count)
            .map(|i| &tiff[10 + i * 12..22 + i * 12])
            .find(|e| u16::from_le_bytes([e[0], e[1]]) == tag)
            .map(|e| match u16::from_le_bytes([e[2], e[3]]) {
                3 => u16::from_le_bytes([e[8], e[9]]) as u32,
                _ => u32::from_le_bytes([e[8], e[9], e[10], e[11]]),
            })
    }

    #[test]
    fn ccitt_group4_is_wrapped_in_tiff() {
        let payload = b"\x26\xA0\x00\x10\x01";
        let parms = dictionary! { "K" => -1, "Columns" => 16, "Rows" => 2 };
        let (doc, ids) = doc_with_pages(vec![vec![ccitt_stream(parms, payload)]]);
        let src = PdfImageSource::from_document(doc);
        let raw = src.extract_image(ids[0][0]).unwrap();

        assert_eq!(raw.extension, "tiff");
        assert!(raw.data.starts_with(b"II*\0"));
        assert_eq!(tiff_tag(&raw.data, 256), Some(16));
        assert_eq!(tiff_tag(&raw.data, 257), Some(2));
        assert_eq!(tiff_tag(&raw.data, 259), Some(4));
        assert_eq!(tiff_tag(&raw.data, 262), Some(0));
        assert_eq!(tiff_tag(&raw.data, 279), Some(payload.len() as u32));
        assert_eq!(tiff_tag(&raw.data, 292), None);
        let offset = tiff_tag(&raw.data, 273).unwrap() as usize;
        assert_eq!(&raw.data[offset..], payload);
    }

    #[test]
    fn ccitt_group3_two_dimensional_sets_t4_options() {
        let parms = dictionary! { "K" => 4, "Columns" => 16, "BlackIs1" => true };
        let (doc, ids) = doc_with_pages(vec![vec![ccitt_stream(parms, b"\x00\x01")]]);
        let src = PdfImageSource::from_document(doc);
        let raw = src.extract_image(ids[0][0]).unwrap();

        assert_eq!(tiff_tag(&raw.data, 259), Some(3));
        assert_eq!(tiff_tag(&raw.data, 292), Some(1));
        assert_eq!(tiff_tag(&raw.data, 262), Some(1));
    }

    #[test]
    fn undecodable_palette_stream_is_malformed() {
        let lookup = Stream::new(
            dictionary! { "Filter" => "BogusDecode" },
            vec![1, 2, 3, 4, 5, 6],
        );
        let (mut doc, _) = doc_with_pages(vec![vec![]]);
        let lookup_id = doc.add_object(lookup);
        let cs = Object::Array(vec![
            "Indexed".into(),
            "DeviceRGB".into(),
            Object::Integer(1),
            lookup_id.into(),
        ]);
        let image_id = doc.add_object(raw_stream(1, 1, cs, 8, vec![0]));
        let src = PdfImageSource::from_document(doc);
        assert!(matches!(
            src.extract_image(image_id),
            Err(ExtractError::Malformed(_))
        ));
    }

    #[test]
    fn cmyk_conversion() {
        assert_eq!(cmyk_to_rgb(0, 0, 0, 0), [255, 255, 255]);
        assert_eq!(cmyk_to_rgb(0, 0, 0, 255), [0, 0, 0]);
        assert_eq!(cmyk_to_rgb(255, 0, 0, 0), [0, 255, 255]);
    }

    #[test]
    fn unpack_rejects_odd_depths() {
        assert!(matches!(
            unpack_samples(&[0; 8], 1, 1, 1, 3),
            Err(ExtractError::Unsupported(_))
        ));
    }
}
