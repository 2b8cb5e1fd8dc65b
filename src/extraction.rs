//! Ports to the collaborators around the engine: text extraction, the
//! record writer and the archive for documents nobody could classify.

use image::GrayImage;
use serde::Serialize;

use crate::{geometry::BoundingBox, projection::ProjectedField};

/// A page waiting for classification.
#[derive(Debug, Clone)]
pub struct QueuedDocument {
    pub name: String,
    pub page: GrayImage,
}

impl QueuedDocument {
    pub fn new(name: impl Into<String>, page: GrayImage) -> Self {
        Self {
            name: name.into(),
            page,
        }
    }
}

/// Reads the text inside one region of a page.
///
/// Implementations never fail: a region with no text, or one off the page,
/// yields an empty string.
pub trait TextExtractor {
    fn extract_text(&self, page: &GrayImage, region: &BoundingBox) -> String;
}

/// Field values extracted from one classified document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionRecord {
    pub document: String,
    pub vendor_name: String,
    pub fields: Vec<(String, String)>,
}

pub trait RecordSink {
    fn record(&mut self, record: ExtractionRecord);
}

impl RecordSink for Vec<ExtractionRecord> {
    fn record(&mut self, record: ExtractionRecord) {
        self.push(record);
    }
}

impl<T: RecordSink + ?Sized> RecordSink for &mut T {
    fn record(&mut self, record: ExtractionRecord) {
        (**self).record(record);
    }
}

/// Destination for seeds whose authoring was abandoned.
pub trait DocumentArchive {
    fn archive_unprocessed(&mut self, document: &QueuedDocument);
}

/// Keeps the names of archived documents.
impl DocumentArchive for Vec<String> {
    fn archive_unprocessed(&mut self, document: &QueuedDocument) {
        self.push(document.name.clone());
    }
}

impl<T: DocumentArchive + ?Sized> DocumentArchive for &mut T {
    fn archive_unprocessed(&mut self, document: &QueuedDocument) {
        (**self).archive_unprocessed(document);
    }
}

/// Runs `extractor` over every projected field. Boxes are clipped to the
/// page first; a box entirely off the page reads as empty.
pub fn extract_fields<X: TextExtractor + ?Sized>(
    extractor: &X,
    page: &GrayImage,
    fields: &[ProjectedField],
) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|field| {
            let text = field
                .bounding_box
                .clamp_to(page.width(), page.height())
                .map(|region| extractor.extract_text(page, &region))
                .unwrap_or_default();
            (field.field_name.clone(), text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reports the region it was asked for.
    struct RegionEcho;

    impl TextExtractor for RegionEcho {
        fn extract_text(&self, _page: &GrayImage, region: &BoundingBox) -> String {
            format!("{},{},{},{}", region.x, region.y, region.width, region.height)
        }
    }

    #[test]
    fn extract_fields_clips_to_page_and_blanks_offpage_boxes() {
        let page = GrayImage::new(100, 80);
        let fields = vec![
            ProjectedField {
                field_name: "invoice_number".into(),
                bounding_box: BoundingBox::new(90, -5, 20, 20),
            },
            ProjectedField {
                field_name: "total_amount".into(),
                bounding_box: BoundingBox::new(150, 10, 20, 20),
            },
        ];
        assert_eq!(
            extract_fields(&RegionEcho, &page, &fields),
            vec![
                ("invoice_number".to_string(), "90,0,10,15".to_string()),
                ("total_amount".to_string(), String::new()),
            ]
        );
    }
}
