use bytes::Bytes;

/// A file in flight for the duration of one upload call.
#[derive(Debug, Clone)]
pub struct UploadInput {
    pub content: Bytes,
    /// Original file name as sent by the client
    pub name: String,
    /// Declared size in bytes
    pub size: usize,
    /// Client-declared MIME type. Untrusted; validation sniffs `content` instead.
    pub declared_content_type: Option<String>,
    pub bucket: String,
}
