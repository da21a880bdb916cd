use models::{AttachmentDescriptor, SourceKind};

/// Map an attachment to the extractor that handles it, by media type first
/// and filename extension as the tie-breaker. PDFs start as native; the PDF
/// extractor itself reroutes scanned documents to vision.
pub fn classify_attachment(attachment: &AttachmentDescriptor) -> SourceKind {
    let content_type = attachment.content_type.to_lowercase();
    let name = attachment.filename.to_lowercase();

    if content_type.contains("pdf") || name.ends_with(".pdf") {
        SourceKind::NativePdf
    } else if content_type.contains("wordprocessingml") || name.ends_with(".docx") {
        SourceKind::Docx
    } else if content_type.contains("spreadsheetml") || name.ends_with(".xlsx") {
        SourceKind::Xlsx
    } else if content_type.starts_with("image/")
        || name.ends_with(".jpg")
        || name.ends_with(".jpeg")
        || name.ends_with(".png")
    {
        SourceKind::Image
    } else {
        SourceKind::Unknown
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn attachment(filename: &str, content_type: &str) -> AttachmentDescriptor {
        AttachmentDescriptor {
            url: "https://files.example/a".to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size: 1024,
        }
    }

    #[test]
    fn classifies_by_content_type_and_extension() {
        assert_eq!(
            classify_attachment(&attachment("brief.pdf", "application/pdf")),
            SourceKind::NativePdf
        );
        assert_eq!(
            classify_attachment(&attachment(
                "forderung.docx",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            )),
            SourceKind::Docx
        );
        assert_eq!(
            classify_attachment(&attachment("aufstellung.xlsx", "application/octet-stream")),
            SourceKind::Xlsx
        );
        assert_eq!(
            classify_attachment(&attachment("scan.jpg", "image/jpeg")),
            SourceKind::Image
        );
        assert_eq!(
            classify_attachment(&attachment("archiv.zip", "application/zip")),
            SourceKind::Unknown
        );
    }
}
