use bytes::Bytes;

/// An image received for generation. Never persisted; dropped once forwarded.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub data: Bytes,
    pub content_type: String,
    pub file_name: String,
}

impl UploadRequest {
    pub fn new(
        data: impl Into<Bytes>,
        content_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
            file_name: file_name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
