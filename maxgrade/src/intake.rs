//! Submission file intake
//!
//! Enforces the upload size limit before any byte is read, reads the whole file into
//! memory, and exposes it as a self-describing `data:` URI for both the AI request and
//! preview rendering.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::info;

/// Upload limit: 20 MiB (inline base64 encoding stays stable below this)
pub const MAX_SUBMISSION_BYTES: u64 = 20 * 1024 * 1024;

/// MIME type used when neither the client nor content sniffing can tell
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Intake errors
#[derive(Debug, Error)]
pub enum IntakeError {
    /// File exceeds the upload limit (signaled before reading)
    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// Not an image or video
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Reading the file failed
    #[error("Read failed: {0}")]
    Read(#[from] std::io::Error),
}

impl IntakeError {
    /// Short category tag for the presentation layer
    pub fn reason(&self) -> &'static str {
        match self {
            IntakeError::FileTooLarge { .. } => "FileTooLarge",
            IntakeError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            IntakeError::Read(_) => "ReadFailed",
        }
    }

    /// Localized user-facing message
    pub fn user_message(&self) -> &'static str {
        match self {
            IntakeError::FileTooLarge { .. } => {
                "文件过大。为了演示稳定性，请上传 20MB 以内的文件。"
            }
            IntakeError::UnsupportedMediaType(_) => "仅支持图片或视频文件。",
            IntakeError::Read(_) => "文件读取失败，请重新选择文件。",
        }
    }
}

/// Image or video, derived from the MIME type prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let lower = mime_type.trim().to_ascii_lowercase();
        if lower.starts_with("image/") {
            Some(MediaKind::Image)
        } else if lower.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// Presentation-layer pre-filter: only `image/*` and `video/*` are offered
pub fn ensure_supported(mime_type: &str) -> Result<MediaKind, IntakeError> {
    MediaKind::from_mime(mime_type)
        .ok_or_else(|| IntakeError::UnsupportedMediaType(mime_type.to_string()))
}

/// Metadata known about a file before it is read
#[derive(Debug, Clone)]
pub struct FileMeta {
    /// Display filename (used verbatim in the prompt)
    pub filename: String,
    /// MIME type reported by the client, if any
    pub mime_type: Option<String>,
    /// Size reported by the client or filesystem
    pub declared_size: u64,
}

/// An accepted submission, immutable once created
#[derive(Clone, PartialEq, Eq)]
pub struct SubmissionFile {
    bytes: Vec<u8>,
    mime_type: String,
    filename: String,
}

impl std::fmt::Debug for SubmissionFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionFile")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("byte_len", &self.bytes.len())
            .finish()
    }
}

impl SubmissionFile {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        MediaKind::from_mime(&self.mime_type)
    }

    pub fn is_video(&self) -> bool {
        self.media_kind() == Some(MediaKind::Video)
    }

    /// Base64 payload without the `data:` prefix (inline request data)
    pub fn base64_payload(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Self-describing preview payload: `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_payload())
    }
}

/// Decode a `data:<mime>;base64,<payload>` URI into its MIME type and bytes
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    let bytes = BASE64.decode(payload).ok()?;
    Some((mime_type.to_string(), bytes))
}

/// File intake with a size limit
#[derive(Debug, Clone, Copy)]
pub struct FileIntake {
    max_bytes: u64,
}

impl Default for FileIntake {
    fn default() -> Self {
        Self {
            max_bytes: MAX_SUBMISSION_BYTES,
        }
    }
}

impl FileIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower the limit (never raised above [`MAX_SUBMISSION_BYTES`])
    pub fn with_limit(limit: u64) -> Self {
        Self {
            max_bytes: limit.min(MAX_SUBMISSION_BYTES),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Synchronous size check, performed before any read begins
    pub fn check(&self, meta: &FileMeta) -> Result<(), IntakeError> {
        if meta.declared_size > self.max_bytes {
            return Err(IntakeError::FileTooLarge {
                size: meta.declared_size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Accept a file from any async reader
    ///
    /// The declared size is checked first. The read itself is capped at the limit, so a
    /// reader that delivers more than it declared is rejected as too large as well.
    pub async fn accept<R>(&self, meta: FileMeta, reader: R) -> Result<SubmissionFile, IntakeError>
    where
        R: AsyncRead + Unpin,
    {
        self.check(&meta)?;

        let mut bytes = Vec::with_capacity(meta.declared_size as usize);
        reader
            .take(self.max_bytes + 1)
            .read_to_end(&mut bytes)
            .await?;

        if bytes.len() as u64 > self.max_bytes {
            return Err(IntakeError::FileTooLarge {
                size: bytes.len() as u64,
                limit: self.max_bytes,
            });
        }

        let mime_type = resolve_mime_type(meta.mime_type.as_deref(), &bytes);

        info!(
            filename = %meta.filename,
            mime_type = %mime_type,
            bytes = bytes.len(),
            "Submission file accepted"
        );

        Ok(SubmissionFile {
            bytes,
            mime_type,
            filename: meta.filename,
        })
    }

    /// Accept an in-memory buffer
    pub async fn accept_bytes(
        &self,
        filename: impl Into<String>,
        mime_type: Option<String>,
        bytes: &[u8],
    ) -> Result<SubmissionFile, IntakeError> {
        let meta = FileMeta {
            filename: filename.into(),
            mime_type,
            declared_size: bytes.len() as u64,
        };
        self.accept(meta, bytes).await
    }
}

/// Client MIME type if usable, otherwise sniffed from content
fn resolve_mime_type(declared: Option<&str>, bytes: &[u8]) -> String {
    if let Some(mime) = declared.map(str::trim) {
        if !mime.is_empty() && !mime.eq_ignore_ascii_case(FALLBACK_MIME_TYPE) {
            return mime.to_string();
        }
    }

    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string())
}
