//! Per-request scratch state
//!
//! A [`RequestScope`] is created fresh for every request and never shared
//! across requests. It holds the only mutable state binding needs:
//! - the decoded body (decoded at most once)
//! - resolved dependency values (resolved at most once per cacheable dependency)
//! - upload handles produced by file extractors (released when the scope ends)

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::ValidationErrors;
use crate::handler::HandlerId;
use crate::upload::{HeldUploads, UploadFile};
use crate::value::{Arg, Value};

/// Outcome of decoding the body; `None` means the body was empty
type DecodedBody = Result<Option<Value>, ValidationErrors>;

/// Request-local binding state
#[derive(Default)]
pub struct RequestScope {
    body: OnceCell<DecodedBody>,
    dependencies: Mutex<HashMap<HandlerId, Arc<tokio::sync::OnceCell<Arg>>>>,
    uploads: Mutex<Vec<UploadFile>>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded body, running `decode` only on the first call.
    ///
    /// A failed decode is remembered too, so every body field of the request
    /// reports the same error without decoding again.
    pub fn decoded_body<F>(&self, decode: F) -> Result<Option<&Value>, ValidationErrors>
    where
        F: FnOnce() -> DecodedBody,
    {
        match self.body.get_or_init(decode) {
            Ok(value) => Ok(value.as_ref()),
            Err(errors) => Err(errors.clone()),
        }
    }

    /// Whether the body has been decoded in this request
    pub fn body_decoded(&self) -> bool {
        self.body.get().is_some()
    }

    /// Cache slot for one dependency.
    ///
    /// Concurrent resolvers of the same dependency share the slot, so the
    /// dependency runs once even when two plan steps race for it.
    pub fn dependency_slot(&self, id: HandlerId) -> Arc<tokio::sync::OnceCell<Arg>> {
        self.dependencies.lock().entry(id).or_default().clone()
    }

    /// Cached value of a dependency, if it already resolved
    pub fn cached_dependency(&self, id: HandlerId) -> Option<Arg> {
        self.dependencies
            .lock()
            .get(&id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Record an upload handle for release when the request ends
    pub fn track_upload(&self, upload: &UploadFile) {
        self.uploads.lock().push(upload.clone());
    }

    pub fn tracked_uploads(&self) -> usize {
        self.uploads.lock().len()
    }

    /// Move the tracked uploads out; the scope no longer releases them
    pub fn take_uploads(&self) -> HeldUploads {
        HeldUploads::new(std::mem::take(&mut *self.uploads.lock()))
    }

    /// Release every tracked upload, returning how many were released now
    pub fn release_uploads(&self) -> usize {
        let uploads: Vec<UploadFile> = std::mem::take(&mut *self.uploads.lock());
        uploads.iter().filter(|upload| upload.release()).count()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        let released = self.release_uploads();
        if released > 0 {
            tracing::debug!(released, "Released uploads on scope drop");
        }
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("body_decoded", &self.body_decoded())
            .field("dependencies", &self.dependencies.lock().len())
            .field("uploads", &self.tracked_uploads())
            .finish()
    }
}
