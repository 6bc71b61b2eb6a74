//! Classify downloaded content for inline display.

use crate::model::DownloadedFile;

/// How a downloaded document can be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Pdf,
    Image,
    /// Text content, decoded lossily as UTF-8.
    Text(String),
    /// No inline rendering; the file must be saved and opened externally.
    Unsupported,
}

impl Preview {
    /// Pick a preview from the response content type.
    pub fn classify(file: &DownloadedFile) -> Self {
        let mime = file
            .content_type
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime.starts_with("application/pdf") {
            Self::Pdf
        } else if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("text/") {
            Self::Text(String::from_utf8_lossy(&file.bytes).into_owned())
        } else {
            Self::Unsupported
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}
