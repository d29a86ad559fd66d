use lopdf::Document;
use tracing::debug;

/// One page of an uploaded PDF, ready for extraction.
///
/// Born-digital pages carry their text layer; scanned pages carry the
/// page's embedded raster image instead and go through the vision
/// specialist.
pub struct PdfPage {
    pub number: u32,
    pub text: String,
    pub scan: Option<PageScan>,
}

pub struct PageScan {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("unreadable PDF: {0}")]
    Unreadable(String),

    #[error("PDF contains no pages")]
    Empty,
}

/// Split a PDF into per-page extraction units.
///
/// The text layer is taken per page; pages without one (scans) fall
/// back to their largest embedded JPEG so the vision model can read
/// them. Other raster encodings are rare in scanned uploads and are
/// reported as empty pages rather than failing the document.
pub fn split_pages(bytes: &[u8]) -> Result<Vec<PdfPage>, PdfError> {
    let doc = Document::load_mem(bytes).map_err(|e| PdfError::Unreadable(e.to_string()))?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(PdfError::Empty);
    }

    // A missing or broken text layer is normal for scanned documents —
    // fall through to per-page images rather than erroring out.
    let text_layers = pdf_extract::extract_text_from_mem_by_pages(bytes).unwrap_or_default();

    let mut out = Vec::with_capacity(pages.len());
    for (idx, (number, page_id)) in pages.into_iter().enumerate() {
        let text = text_layers
            .get(idx)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let scan = if text.is_empty() {
            largest_page_jpeg(&doc, page_id)
        } else {
            None
        };
        debug!(
            page = number,
            has_text = !text.is_empty(),
            has_scan = scan.is_some(),
            "pdf page split"
        );
        out.push(PdfPage { number, text, scan });
    }
    Ok(out)
}

/// The biggest DCTDecode (JPEG) image on a page — for scanned PDFs this
/// is the page itself. JPEG streams pass through to the vision model
/// without re-encoding.
fn largest_page_jpeg(doc: &Document, page_id: lopdf::ObjectId) -> Option<PageScan> {
    let images = doc.get_page_images(page_id).ok()?;
    images
        .into_iter()
        .filter(|img| {
            img.filters
                .as_ref()
                .is_some_and(|f| f.iter().any(|name| name == "DCTDecode"))
        })
        .max_by_key(|img| img.width * img.height)
        .map(|img| PageScan {
            bytes: img.content.to_vec(),
            media_type: "image/jpeg".to_string(),
        })
}

pub fn page_marker(number: u32) -> String {
    format!("--- Page {number} ---")
}

/// Join per-page extraction results with page markers.
pub fn join_pages(pages: &[(u32, String)]) -> String {
    pages
        .iter()
        .map(|(number, text)| format!("{}\n{}", page_marker(*number), text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Build a minimal two-page born-digital PDF in memory.
    fn two_page_pdf(first: &str, second: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in [first, second] {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
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

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn splits_two_pages_with_text_layers() {
        let bytes = two_page_pdf("Alpha page", "Beta page");
        let pages = split_pages(&bytes).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].number, 2);
        assert!(pages[0].text.contains("Alpha"));
        assert!(pages[1].text.contains("Beta"));
        // Text-layer pages never carry a scan fallback.
        assert!(pages[0].scan.is_none());
        assert!(pages[1].scan.is_none());
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        match split_pages(b"not a pdf at all") {
            Err(PdfError::Unreadable(_)) => {}
            other => panic!("expected Unreadable, got {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn join_pages_emits_markers_in_order() {
        let joined = join_pages(&[
            (1, "first page text".to_string()),
            (2, "second page text".to_string()),
        ]);
        assert!(joined.contains("--- Page 1 ---"));
        assert!(joined.contains("--- Page 2 ---"));
        let p1 = joined.find("--- Page 1 ---").unwrap();
        let p2 = joined.find("--- Page 2 ---").unwrap();
        assert!(p1 < p2);
        assert!(joined.contains("first page text"));
    }

    #[test]
    fn page_marker_format_is_stable() {
        assert_eq!(page_marker(7), "--- Page 7 ---");
    }
}
