use crate::ExtractError;
use models::AttachmentDescriptor;
use std::io::Write;

/// A downloaded attachment held in a named temp file. Dropping the value
/// removes the file, so cleanup happens on every exit path.
pub struct FetchedAttachment {
    file: tempfile::NamedTempFile,
    pub size: u64,
}

impl FetchedAttachment {
    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, ExtractError> {
        std::fs::read(self.path()).map_err(|err| ExtractError::Fetch(err.to_string()))
    }
}

/// Object-store reader with the size check ahead of the download and a hard
/// byte cap enforced while streaming, in case the declared size lied.
pub struct AttachmentFetcher {
    http: reqwest::Client,
    max_bytes: u64,
}

impl AttachmentFetcher {
    pub fn new(http: reqwest::Client, max_bytes: u64) -> Self {
        Self { http, max_bytes }
    }

    #[tracing::instrument(skip(self), fields(url = %attachment.url, size = attachment.size))]
    pub async fn fetch(
        &self,
        attachment: &AttachmentDescriptor,
    ) -> Result<FetchedAttachment, ExtractError> {
        if attachment.size > self.max_bytes {
            return Err(ExtractError::FileTooLarge {
                size: attachment.size,
                cap: self.max_bytes,
            });
        }

        let response = self
            .http
            .get(&attachment.url)
            .send()
            .await
            .map_err(|err| ExtractError::Fetch(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ExtractError::Fetch(format!(
                "object store returned {}",
                response.status()
            )));
        }

        let mut file =
            tempfile::NamedTempFile::new().map_err(|err| ExtractError::Fetch(err.to_string()))?;
        let mut size = 0u64;

        let mut response = response;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| ExtractError::Fetch(err.to_string()))?
        {
            size += chunk.len() as u64;
            if size > self.max_bytes {
                return Err(ExtractError::FileTooLarge {
                    size,
                    cap: self.max_bytes,
                });
            }
            file.write_all(&chunk)
                .map_err(|err| ExtractError::Fetch(err.to_string()))?;
        }
        file.flush()
            .map_err(|err| ExtractError::Fetch(err.to_string()))?;

        Ok(FetchedAttachment { file, size })
    }
}
