use serde::{Deserialize, Serialize};
use std::fmt;

/// A chat attachment, exhaustively matched throughout the core.
///
/// Exactly one specialist path handles each variant: images go to
/// vision extraction, audio to transcription, documents to the
/// material pipeline.
#[derive(Debug, Clone)]
pub enum Attachment {
    Image {
        bytes: Vec<u8>,
        media_type: String,
    },
    Audio {
        bytes: Vec<u8>,
        media_type: String,
    },
    Document {
        bytes: Vec<u8>,
        media_type: String,
        name: String,
    },
}

impl Attachment {
    pub fn kind(&self) -> AttachmentKind {
        match self {
            Attachment::Image { .. } => AttachmentKind::Image,
            Attachment::Audio { .. } => AttachmentKind::Audio,
            Attachment::Document { .. } => AttachmentKind::Document,
        }
    }

    pub fn media_type(&self) -> &str {
        match self {
            Attachment::Image { media_type, .. }
            | Attachment::Audio { media_type, .. }
            | Attachment::Document { media_type, .. } => media_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Attachment::Image { bytes, .. }
            | Attachment::Audio { bytes, .. }
            | Attachment::Document { bytes, .. } => bytes,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    Document,
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// Media types the material pipeline can extract text from with a
/// single vision call.
pub const IMAGE_MEDIA_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

pub fn is_image_media_type(media_type: &str) -> bool {
    IMAGE_MEDIA_TYPES.contains(&media_type)
}

pub fn is_pdf_media_type(media_type: &str) -> bool {
    media_type == PDF_MEDIA_TYPE
}

/// The reserved per-user course id used for global chat (no retrieval).
pub fn global_course_id(user_id: &str) -> String {
    format!("global:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_accessors_cover_all_variants() {
        let img = Attachment::Image {
            bytes: vec![1, 2, 3],
            media_type: "image/png".into(),
        };
        assert_eq!(img.kind(), AttachmentKind::Image);
        assert_eq!(img.media_type(), "image/png");
        assert_eq!(img.size_bytes(), 3);

        let doc = Attachment::Document {
            bytes: vec![0; 10],
            media_type: "application/pdf".into(),
            name: "notes.pdf".into(),
        };
        assert_eq!(doc.kind(), AttachmentKind::Document);
        assert_eq!(doc.size_bytes(), 10);
    }

    #[test]
    fn media_type_predicates() {
        assert!(is_image_media_type("image/jpeg"));
        assert!(is_image_media_type("image/bmp"));
        assert!(!is_image_media_type("image/tiff"));
        assert!(is_pdf_media_type("application/pdf"));
        assert!(!is_pdf_media_type("text/plain"));
    }

    #[test]
    fn global_course_id_is_per_user() {
        assert_eq!(global_course_id("u-1"), "global:u-1");
        assert_ne!(global_course_id("u-1"), global_course_id("u-2"));
    }
}
