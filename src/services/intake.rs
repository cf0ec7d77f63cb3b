// src/services/intake.rs
use std::path::Path;

use bytes::Bytes;
use log::{debug, warn};
use lopdf::{Document as PdfDocument, Object, ObjectId};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::errors::SkinReportError;
use crate::services::image_processor::{ImageProcessor, MAX_PAGE_EDGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Jpeg,
    Png,
}

impl DocumentKind {
    pub fn media_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Jpeg => "image/jpeg",
            DocumentKind::Png => "image/png",
        }
    }
}

/// Detect the document type from magic bytes. Extensions are not trusted.
pub fn detect_kind(bytes: &[u8]) -> Option<DocumentKind> {
    match bytes {
        [0x25, 0x50, 0x44, 0x46, ..] => Some(DocumentKind::Pdf),
        [0xFF, 0xD8, 0xFF, ..] => Some(DocumentKind::Jpeg),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(DocumentKind::Png),
        _ => None,
    }
}

/// Strip path components and control characters from a declared filename.
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0') && !c.is_control())
        .take(255)
        .collect();

    if clean.is_empty() {
        "document".to_string()
    } else {
        clean
    }
}

/// One page as it will be shipped to the inference service.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_number: u32,
    pub media_type: String,
    pub data: Bytes,
    /// Text layer of the page, used for modality cues.
    pub text: Option<String>,
}

impl PageImage {
    /// Content fingerprint, independent of the page's position in the document.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.media_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(&self.data);
        hasher.update([0u8]);
        if let Some(text) = &self.text {
            hasher.update(text.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// A validated submission. Cheap to clone; bytes are shared.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub kind: DocumentKind,
    pub fingerprint: String,
    pub page_count: u32,
    bytes: Bytes,
}

impl Document {
    pub fn from_bytes(
        filename: &str,
        bytes: impl Into<Bytes>,
        max_bytes: usize,
    ) -> Result<Self, SkinReportError> {
        let bytes = bytes.into();

        if bytes.len() > max_bytes {
            return Err(SkinReportError::TooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }
        if bytes.is_empty() {
            return Err(SkinReportError::InvalidFormat("Document is empty".to_string()));
        }

        let kind = detect_kind(&bytes).ok_or_else(|| {
            SkinReportError::InvalidFormat(format!(
                "'{}' is not a PDF, JPEG or PNG document",
                sanitize_filename(filename)
            ))
        })?;

        let page_count = match kind {
            DocumentKind::Pdf => {
                let pdf = load_pdf(&bytes)?;
                pdf.get_pages().len() as u32
            }
            DocumentKind::Jpeg | DocumentKind::Png => {
                ImageProcessor::new().validate_image(&bytes)?;
                1
            }
        };

        if page_count == 0 {
            return Err(SkinReportError::InvalidFormat(
                "PDF contains no pages".to_string(),
            ));
        }

        let fingerprint = format!("{:x}", Sha256::digest(&bytes));

        Ok(Self {
            id: Uuid::new_v4(),
            filename: sanitize_filename(filename),
            kind,
            fingerprint,
            page_count,
            bytes,
        })
    }

    /// Local-path variant. Produces the same representation as `from_bytes`.
    pub fn from_path(path: &Path, max_bytes: usize) -> Result<Self, SkinReportError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            SkinReportError::Validation(format!("Cannot read {}: {}", path.display(), e))
        })?;
        if metadata.len() > max_bytes as u64 {
            return Err(SkinReportError::TooLarge {
                size: metadata.len() as usize,
                limit: max_bytes,
            });
        }

        let bytes = std::fs::read(path).map_err(|e| {
            SkinReportError::Validation(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document");

        Self::from_bytes(filename, bytes, max_bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Split into per-page payloads, in page order.
    pub fn pages(&self, processor: &ImageProcessor) -> Result<Vec<PageImage>, SkinReportError> {
        match self.kind {
            DocumentKind::Pdf => split_pdf(&self.bytes, processor),
            DocumentKind::Jpeg | DocumentKind::Png => {
                let (media_type, data) = normalize_page_image(processor, self.bytes.to_vec())
                    .ok_or_else(|| {
                        SkinReportError::InvalidFormat("Image could not be decoded".to_string())
                    })?;
                Ok(vec![PageImage {
                    page_number: 1,
                    media_type,
                    data,
                    text: None,
                }])
            }
        }
    }
}

fn load_pdf(bytes: &[u8]) -> Result<PdfDocument, SkinReportError> {
    PdfDocument::load_mem(bytes)
        .map_err(|e| SkinReportError::InvalidFormat(format!("Failed to parse PDF: {}", e)))
}

fn split_pdf(bytes: &[u8], processor: &ImageProcessor) -> Result<Vec<PageImage>, SkinReportError> {
    let pdf = load_pdf(bytes)?;
    let page_map = pdf.get_pages();
    let numbers: Vec<u32> = page_map.keys().copied().collect();

    let mut pages = Vec::with_capacity(page_map.len());
    for (&number, &page_id) in &page_map {
        let text = pdf
            .extract_text(&[number])
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let embedded = page_images_largest_first(&pdf, page_id)
            .into_iter()
            .find_map(|raw| normalize_page_image(processor, raw));

        let (media_type, data) = match embedded {
            Some(image) => image,
            None => {
                debug!("Page {} has no decodable image, shipping it as PDF", number);
                let single = single_page_pdf(&pdf, number, &numbers)?;
                (DocumentKind::Pdf.media_type().to_string(), Bytes::from(single))
            }
        };

        pages.push(PageImage {
            page_number: number,
            media_type,
            data,
            text,
        });
    }

    Ok(pages)
}

/// Validate, downscale when oversized, and settle on a media type providers accept.
fn normalize_page_image(processor: &ImageProcessor, raw: Vec<u8>) -> Option<(String, Bytes)> {
    if let Err(e) = processor.validate_image(&raw) {
        warn!("Skipping undecodable page image: {}", e);
        return None;
    }

    match processor.resize_if_needed(&raw, MAX_PAGE_EDGE) {
        Ok(Some(png)) => Some((DocumentKind::Png.media_type().to_string(), Bytes::from(png))),
        Ok(None) => match detect_kind(&raw) {
            Some(kind @ (DocumentKind::Jpeg | DocumentKind::Png)) => {
                Some((kind.media_type().to_string(), Bytes::from(raw)))
            }
            // Other raster formats (TIFF, decoded streams) are re-encoded.
            _ => reencode_png(&raw),
        },
        Err(e) => {
            warn!("Failed to normalize page image: {}", e);
            None
        }
    }
}

fn reencode_png(raw: &[u8]) -> Option<(String, Bytes)> {
    let img = image::load_from_memory(raw).ok()?;
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .ok()?;
    Some((DocumentKind::Png.media_type().to_string(), Bytes::from(out)))
}

fn single_page_pdf(
    pdf: &PdfDocument,
    keep: u32,
    all_pages: &[u32],
) -> Result<Vec<u8>, SkinReportError> {
    let mut copy = pdf.clone();
    let others: Vec<u32> = all_pages.iter().copied().filter(|&n| n != keep).collect();
    copy.delete_pages(&others);
    copy.prune_objects();

    let mut buf = Vec::new();
    copy.save_to(&mut buf)
        .map_err(|e| SkinReportError::InvalidFormat(format!("Failed to split page {}: {}", keep, e)))?;
    Ok(buf)
}

/// Image XObjects on a page, largest first. The first decodable one is the page scan.
fn page_images_largest_first(pdf: &PdfDocument, page_id: ObjectId) -> Vec<Vec<u8>> {
    let xobjects = pdf
        .get_object(page_id)
        .and_then(Object::as_dict)
        .ok()
        .and_then(|page| resolve_dict(pdf, page.get(b"Resources").ok()?))
        .and_then(|resources| resolve_dict(pdf, resources.get(b"XObject").ok()?));
    let Some(xobjects) = xobjects else {
        return Vec::new();
    };

    let mut images: Vec<Vec<u8>> = Vec::new();
    for (_name, entry) in xobjects.iter() {
        let stream = match resolve(pdf, entry) {
            Some(Object::Stream(stream)) => stream,
            _ => continue,
        };

        let is_image = matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image");
        if !is_image {
            continue;
        }

        let content = if is_dct(&stream.dict) {
            stream.content.clone()
        } else {
            stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone())
        };

        images.push(content);
    }

    // Stable, so equal sizes keep resource order.
    images.sort_by_key(|content| std::cmp::Reverse(content.len()));
    images
}

fn is_dct(dict: &lopdf::Dictionary) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => n == b"DCTDecode",
        Ok(Object::Array(filters)) => filters
            .iter()
            .any(|f| matches!(f, Object::Name(n) if n == b"DCTDecode")),
        _ => false,
    }
}

fn resolve<'a>(pdf: &'a PdfDocument, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => pdf.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(pdf: &'a PdfDocument, obj: &'a Object) -> Option<&'a lopdf::Dictionary> {
    resolve(pdf, obj)?.as_dict().ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::image_processor::tests::{solid_jpeg, solid_png};
    use lopdf::{Stream, dictionary};

    /// Build a PDF in memory; `Some(jpeg)` pages embed the JPEG as a DCT image XObject.
    pub(crate) fn build_pdf(pages: &[Option<Vec<u8>>]) -> Vec<u8> {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::new();
        for (i, jpeg) in pages.iter().enumerate() {
            let mut xobjects = lopdf::Dictionary::new();
            let mut ops = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", i + 1);
            if let Some(jpeg) = jpeg {
                let image_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => 16,
                        "Height" => 16,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    jpeg.clone(),
                ));
                xobjects.set("Im1", image_id);
                ops.push_str(" q 100 0 0 100 72 500 cm /Im1 Do Q");
            }
            let content_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                    "XObject" => xobjects,
                },
            });
            kids.push(page_id.into());
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

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn detects_kind_from_magic_bytes() {
        assert_eq!(detect_kind(b"%PDF-1.7\n"), Some(DocumentKind::Pdf));
        assert_eq!(detect_kind(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(DocumentKind::Jpeg));
        assert_eq!(detect_kind(&[0x89, 0x50, 0x4E, 0x47, 0x0D]), Some(DocumentKind::Png));
        assert_eq!(detect_kind(b"GIF89a"), None);
    }

    #[test]
    fn rejects_unknown_formats_regardless_of_extension() {
        let result = Document::from_bytes("report.pdf", b"hello world".to_vec(), 1024);
        assert!(matches!(result, Err(SkinReportError::InvalidFormat(_))));

        let result = Document::from_bytes("report.pdf", Vec::new(), 1024);
        assert!(matches!(result, Err(SkinReportError::InvalidFormat(_))));
    }

    #[test]
    fn rejects_payloads_over_the_ceiling() {
        let png = solid_png(8, 8, [10, 10, 10]);
        let limit = png.len() - 1;
        match Document::from_bytes("scan.png", png, limit) {
            Err(SkinReportError::TooLarge { size, limit: l }) => {
                assert_eq!(l, limit);
                assert_eq!(size, limit + 1);
            }
            other => panic!("expected TooLarge, got {:?}", other.map(|d| d.page_count)),
        }
    }

    #[test]
    fn truncated_pdf_is_invalid() {
        let result = Document::from_bytes("scan.pdf", b"%PDF-1.4\n%%EOF".to_vec(), 1024);
        assert!(matches!(result, Err(SkinReportError::InvalidFormat(_))));
    }

    #[test]
    fn page_count_comes_from_the_page_tree() {
        let jpeg = solid_jpeg(16, 16, [200, 150, 140]);
        let pdf = build_pdf(&[Some(jpeg.clone()), None, Some(jpeg)]);
        let doc = Document::from_bytes("report.pdf", pdf, 1 << 20).unwrap();
        assert_eq!(doc.kind, DocumentKind::Pdf);
        assert_eq!(doc.page_count, 3);
    }

    #[test]
    fn pdf_pages_ship_embedded_scans_or_single_page_pdfs() {
        let jpeg = solid_jpeg(16, 16, [200, 150, 140]);
        let pdf = build_pdf(&[Some(jpeg.clone()), None]);
        let doc = Document::from_bytes("report.pdf", pdf, 1 << 20).unwrap();

        let pages = doc.pages(&ImageProcessor::new()).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].media_type, "image/jpeg");
        assert_eq!(pages[0].data.as_ref(), jpeg.as_slice());

        assert_eq!(pages[1].page_number, 2);
        assert_eq!(pages[1].media_type, "application/pdf");
        let single = PdfDocument::load_mem(&pages[1].data).unwrap();
        assert_eq!(single.get_pages().len(), 1);
    }

    #[test]
    fn undecodable_larger_image_does_not_hide_the_scan() {
        let jpeg = solid_jpeg(16, 16, [200, 150, 140]);
        let raw_samples = vec![0x7F; 64 * 64 * 3];

        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let raw_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 64,
                "Height" => 64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            raw_samples,
        ));
        let jpeg_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 16,
                "Height" => 16,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg.clone(),
        ));
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"q 100 0 0 100 72 500 cm /Raw Do Q q 100 0 0 100 72 300 cm /Scan Do Q".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Raw" => raw_id, "Scan" => jpeg_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut pdf = Vec::new();
        doc.save_to(&mut pdf).unwrap();

        let document = Document::from_bytes("scan.pdf", pdf, 1 << 20).unwrap();
        let pages = document.pages(&ImageProcessor::new()).unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].media_type, "image/jpeg");
        assert_eq!(pages[0].data.as_ref(), jpeg.as_slice());
    }

    #[test]
    fn standalone_image_is_a_single_page() {
        let png = solid_png(20, 10, [90, 60, 50]);
        let doc = Document::from_bytes("closeup.png", png.clone(), 1 << 20).unwrap();
        assert_eq!(doc.page_count, 1);

        let pages = doc.pages(&ImageProcessor::new()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].media_type, "image/png");
        assert_eq!(pages[0].data.as_ref(), png.as_slice());
    }

    #[test]
    fn local_path_matches_uploaded_bytes() {
        let jpeg = solid_jpeg(16, 16, [100, 100, 100]);
        let pdf = build_pdf(&[Some(jpeg)]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visit.pdf");
        std::fs::write(&path, &pdf).unwrap();

        let from_path = Document::from_path(&path, 1 << 20).unwrap();
        let from_upload = Document::from_bytes("visit.pdf", pdf, 1 << 20).unwrap();

        assert_eq!(from_path.bytes(), from_upload.bytes());
        assert_eq!(from_path.fingerprint, from_upload.fingerprint);
        assert_eq!(from_path.filename, from_upload.filename);
        assert_eq!(from_path.page_count, from_upload.page_count);
    }

    #[test]
    fn page_fingerprint_ignores_position() {
        let a = PageImage {
            page_number: 1,
            media_type: "image/png".into(),
            data: Bytes::from_static(b"pixels"),
            text: Some("UV".into()),
        };
        let b = PageImage {
            page_number: 7,
            ..a.clone()
        };
        let c = PageImage {
            text: None,
            ..a.clone()
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(""), "document");
        assert_eq!(sanitize_filename("scan\u{0}.pdf"), "scan.pdf");
    }
}
