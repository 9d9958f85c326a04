//! Capture device abstraction.

use std::future::Future;

use thiserror::Error;

use crate::models::MediaKind;

/// Failures reported by a capture device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture device unavailable: {0}")]
    Unavailable(String),

    #[error("Capture device failed: {0}")]
    Failed(String),
}

/// A source of audio or audio+video data (microphone, camera).
pub trait CaptureDevice {
    type Handle: CaptureHandle;

    /// Ask for exclusive access to the device for `kind` capture.
    fn acquire(
        &mut self,
        kind: MediaKind,
    ) -> impl Future<Output = Result<Self::Handle, DeviceError>>;
}

/// An open device stream. Exclusively owned by one capture session.
pub trait CaptureHandle {
    /// Content type of the assembled artifact
    fn mime_type(&self) -> &str;

    /// Drain fragments produced since the previous call.
    fn take_fragments(&mut self) -> Result<Vec<Vec<u8>>, DeviceError>;

    /// Stop the stream and give the device back. Must be idempotent.
    fn release(&mut self);

    /// Join buffered fragments into one playable artifact.
    fn assemble(&self, fragments: Vec<Vec<u8>>) -> Result<Vec<u8>, DeviceError> {
        Ok(fragments.concat())
    }
}
