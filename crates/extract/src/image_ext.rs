use crate::{scanned, ExtractContext, ExtractError, TokenBudget};
use models::{AttachmentDescriptor, Confidence, ExtractionResult, Id, SourceKind};
use std::io::Cursor;

/// Oversized images are downscaled before upload; the longest edge is capped
/// and the result re-encoded as JPEG in a buffer that drops with the call.
fn prepare_bytes(
    path: &std::path::Path,
    size: u64,
    threshold: u64,
    max_edge: u32,
) -> Result<(Vec<u8>, String), ExtractError> {
    let bytes =
        std::fs::read(path).map_err(|err| ExtractError::Unreadable(err.to_string()))?;
    if size <= threshold {
        let media_type = infer_media_type(&bytes);
        return Ok((bytes, media_type));
    }

    let img = image::load_from_memory(&bytes)
        .map_err(|err| ExtractError::Unreadable(format!("image decode: {err}")))?;
    let resized = img.thumbnail(max_edge, max_edge);

    let mut out = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
        .map_err(|err| ExtractError::Unreadable(format!("image encode: {err}")))?;
    Ok((out, "image/jpeg".to_string()))
}

fn infer_media_type(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png".to_string()
    } else {
        "image/jpeg".to_string()
    }
}

/// Vision extraction for JPG/PNG attachments. MEDIUM confidence ceiling.
pub async fn extract(
    ctx: &ExtractContext,
    job_id: Id,
    attachment: &AttachmentDescriptor,
    budget: &TokenBudget,
) -> Result<ExtractionResult, ExtractError> {
    let fetched = ctx.fetcher.fetch(attachment).await?;

    let path = fetched.path().to_path_buf();
    let size = fetched.size;
    let threshold = ctx.limits.image_resize_threshold_bytes;
    let max_edge = ctx.limits.image_max_edge;
    let (bytes, media_type) =
        tokio::task::spawn_blocking(move || prepare_bytes(&path, size, threshold, max_edge))
            .await
            .map_err(|err| ExtractError::Other(anyhow::anyhow!("image task: {err}")))??;

    let (fields, tokens) = scanned::vision_call(
        ctx,
        job_id,
        budget,
        &media_type,
        bytes,
        &attachment.filename,
    )
    .await?;

    Ok(scanned::build_result(
        SourceKind::Image,
        &attachment.filename,
        fields,
        tokens,
        Confidence::Medium,
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn media_type_inference() {
        assert_eq!(infer_media_type(&[0x89, b'P', b'N', b'G', 0x0d]), "image/png");
        assert_eq!(infer_media_type(&[0xff, 0xd8, 0xff]), "image/jpeg");
    }
}
