//! Upload handles bound to file parameters
//!
//! An [`UploadFile`] wraps one pre-parsed file part. Handles are tracked on
//! the request scope and released when dispatch ends, whether the handler
//! succeeded or failed. A handler call takes them over as [`HeldUploads`],
//! released once the callable returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::ValidationError;
use crate::request::FilePart;

// ============================================================================
// Upload Configuration
// ============================================================================

/// Limits applied by file extractors
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum file size (bytes), None for unlimited
    pub max_size: Option<u64>,
    /// Allowed MIME types, empty for all
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size: Some(100 * 1024 * 1024), // 100MB default
            allowed_types: Vec::new(),
        }
    }
}

impl UploadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum file size
    pub fn max_size(mut self, size: u64) -> Self {
        self.max_size = Some(size);
        self
    }

    /// Set unlimited file size
    pub fn unlimited(mut self) -> Self {
        self.max_size = None;
        self
    }

    /// Set allowed MIME types
    pub fn allowed_types(mut self, types: Vec<String>) -> Self {
        self.allowed_types = types;
        self
    }

    /// Allow specific MIME type
    pub fn allow_type(mut self, mime_type: impl Into<String>) -> Self {
        self.allowed_types.push(mime_type.into());
        self
    }

    /// Allow all image types
    pub fn allow_images(mut self) -> Self {
        self.allowed_types.extend([
            "image/jpeg".to_string(),
            "image/png".to_string(),
            "image/gif".to_string(),
            "image/webp".to_string(),
        ]);
        self
    }

    /// Check one part against the limits before a handle is produced
    pub fn check(&self, part: &FilePart, field: &str) -> Result<(), ValidationError> {
        if let Some(max_size) = self.max_size {
            if part.data.len() as u64 > max_size {
                return Err(ValidationError::value_error(
                    "file",
                    field,
                    format!("File size exceeds maximum allowed ({} bytes)", max_size),
                ));
            }
        }

        if !self.allowed_types.is_empty() {
            let content_type = part.content_type.as_deref().unwrap_or("application/octet-stream");
            if !self.allowed_types.iter().any(|t| t == content_type) {
                return Err(ValidationError::value_error(
                    "file",
                    field,
                    format!(
                        "File type '{}' not allowed. Allowed types: {:?}",
                        content_type, self.allowed_types
                    ),
                ));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Upload File
// ============================================================================

#[derive(Debug)]
struct UploadInner {
    filename: Option<String>,
    content_type: Option<String>,
    size: u64,
    data: Mutex<Option<Bytes>>,
    released: AtomicBool,
}

/// Handle to an uploaded file.
///
/// Clones share the same underlying part; releasing any clone releases all.
#[derive(Debug, Clone)]
pub struct UploadFile {
    inner: Arc<UploadInner>,
}

impl UploadFile {
    pub fn new(filename: Option<String>, content_type: Option<String>, data: Bytes) -> Self {
        Self {
            inner: Arc::new(UploadInner {
                filename,
                content_type,
                size: data.len() as u64,
                data: Mutex::new(Some(data)),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Wrap a pre-parsed file part
    pub fn from_part(part: &FilePart) -> Self {
        Self::new(part.filename.clone(), part.content_type.clone(), part.data.clone())
    }

    pub fn filename(&self) -> Option<&str> {
        self.inner.filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.inner.content_type.as_deref()
    }

    /// Size in bytes at the time the handle was produced
    pub fn size(&self) -> u64 {
        self.inner.size
    }

    /// File contents, or None once released
    pub fn read(&self) -> Option<Bytes> {
        self.inner.data.lock().clone()
    }

    /// Release the contents.
    ///
    /// Returns true only for the call that actually released the handle.
    pub fn release(&self) -> bool {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.data.lock().take();
        true
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same upload
    pub fn ptr_eq(&self, other: &UploadFile) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Upload handles kept alive for the duration of one handler call.
///
/// Dropping the value releases every handle, so the files stay readable
/// until whoever owns it is finished with them.
#[derive(Debug, Default)]
pub struct HeldUploads {
    uploads: Vec<UploadFile>,
}

impl HeldUploads {
    pub fn new(uploads: Vec<UploadFile>) -> Self {
        Self { uploads }
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }
}

impl Drop for HeldUploads {
    fn drop(&mut self) {
        let released = self.uploads.iter().filter(|upload| upload.release()).count();
        if released > 0 {
            tracing::debug!(released, "Released uploads held by handler call");
        }
    }
}
