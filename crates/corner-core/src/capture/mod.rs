//! Capture session: drives a microphone or camera and buffers what it records.
//!
//! The session is a small state machine:
//!
//! ```text
//! idle -> requesting-device -> previewing -> recording -> stopped -> idle
//!                 \                              \
//!                  +---------> device-error <-----+
//! ```
//!
//! The device handle lives inside the `Previewing` and `Recording` phases, so
//! it is impossible to hold a device while idle, stopped or failed.

mod device;
pub mod wav;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};

use crate::models::MediaKind;

pub use device::{CaptureDevice, CaptureHandle, DeviceError};

/// Message shown when a recording produced no bytes.
pub const NO_DATA_CAPTURED: &str = "no data captured";

/// Default interval between fragment pulls.
pub const DEFAULT_TIMESLICE: Duration = Duration::from_millis(250);

/// Capture session options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    /// How often buffered fragments are pulled from the device.
    pub timeslice: Duration,
    /// Directory receiving the playable preview written on stop.
    pub preview_dir: PathBuf,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            timeslice: DEFAULT_TIMESLICE,
            preview_dir: std::env::temp_dir().join("corner").join("previews"),
        }
    }
}

/// Observable capture state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    RequestingDevice,
    Previewing,
    Recording,
    Stopped,
    DeviceError,
}

impl CaptureState {
    /// Whether a session in this state owns the device.
    pub const fn holds_device(self) -> bool {
        matches!(
            self,
            Self::RequestingDevice | Self::Previewing | Self::Recording
        )
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::RequestingDevice => "requesting-device",
            Self::Previewing => "previewing",
            Self::Recording => "recording",
            Self::Stopped => "stopped",
            Self::DeviceError => "device-error",
        };
        f.write_str(label)
    }
}

/// Capture session failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: CaptureState,
    },

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("no data captured")]
    NoDataCaptured,
}

/// Ordered fragments collected while recording.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureBuffer {
    fragments: Vec<Vec<u8>>,
    byte_len: usize,
}

impl CaptureBuffer {
    /// Append a fragment. Empty fragments are ignored.
    pub fn push(&mut self, fragment: Vec<u8>) {
        if fragment.is_empty() {
            return;
        }
        self.byte_len += fragment.len();
        self.fragments.push(fragment);
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub const fn byte_len(&self) -> usize {
        self.byte_len
    }

    fn into_fragments(self) -> Vec<Vec<u8>> {
        self.fragments
    }
}

/// A finished recording ready for preview and upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedMedia {
    pub kind: MediaKind,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub fragment_count: usize,
    /// Suggested file name for the upload form.
    pub file_name: String,
    /// Local playable copy, when it could be written.
    pub preview_path: Option<PathBuf>,
}

enum Phase<H> {
    Idle,
    RequestingDevice,
    Previewing { handle: H },
    Recording { handle: H, buffer: CaptureBuffer },
    Stopped { media: CapturedMedia },
    DeviceError { message: String },
}

impl<H> Phase<H> {
    const fn state(&self) -> CaptureState {
        match self {
            Self::Idle => CaptureState::Idle,
            Self::RequestingDevice => CaptureState::RequestingDevice,
            Self::Previewing { .. } => CaptureState::Previewing,
            Self::Recording { .. } => CaptureState::Recording,
            Self::Stopped { .. } => CaptureState::Stopped,
            Self::DeviceError { .. } => CaptureState::DeviceError,
        }
    }
}

/// One capture session bound to one device.
pub struct CaptureSession<D: CaptureDevice> {
    device: D,
    kind: MediaKind,
    options: CaptureOptions,
    phase: Phase<D::Handle>,
}

impl<D: CaptureDevice> CaptureSession<D> {
    pub fn new(device: D, kind: MediaKind) -> Self {
        Self::with_options(device, kind, CaptureOptions::default())
    }

    pub const fn with_options(device: D, kind: MediaKind, options: CaptureOptions) -> Self {
        Self {
            device,
            kind,
            options,
            phase: Phase::Idle,
        }
    }

    pub const fn kind(&self) -> MediaKind {
        self.kind
    }

    pub const fn state(&self) -> CaptureState {
        self.phase.state()
    }

    /// User-visible message while in `device-error`.
    pub fn error_message(&self) -> Option<&str> {
        match &self.phase {
            Phase::DeviceError { message } => Some(message),
            _ => None,
        }
    }

    /// The assembled artifact while `stopped`.
    pub const fn media(&self) -> Option<&CapturedMedia> {
        match &self.phase {
            Phase::Stopped { media } => Some(media),
            _ => None,
        }
    }

    /// Fragments buffered so far while `recording`.
    pub fn buffered_fragments(&self) -> usize {
        match &self.phase {
            Phase::Recording { buffer, .. } => buffer.len(),
            _ => 0,
        }
    }

    /// Acquire the device and begin recording.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        match self.phase {
            Phase::Idle | Phase::DeviceError { .. } => {}
            _ => return Err(self.invalid("start")),
        }

        tracing::debug!(kind = %self.kind, "Requesting capture device");
        let kind = self.kind;
        let request = PendingRequest::begin(&mut self.phase);
        let handle = match self.device.acquire(kind).await {
            Ok(handle) => handle,
            Err(error) => {
                tracing::warn!(kind = %kind, "Capture device request failed: {error}");
                request.settle(Phase::DeviceError {
                    message: error.to_string(),
                });
                return Err(error.into());
            }
        };

        request.settle(Phase::Previewing { handle });
        if let Phase::Previewing { handle } = std::mem::replace(&mut self.phase, Phase::Idle) {
            self.phase = Phase::Recording {
                handle,
                buffer: CaptureBuffer::default(),
            };
        }
        tracing::info!(kind = %self.kind, "Recording started");
        Ok(())
    }

    /// Pull pending fragments into the buffer.
    ///
    /// Returns how many non-empty fragments were appended.
    pub fn poll(&mut self) -> Result<usize, CaptureError> {
        let failure = match &mut self.phase {
            Phase::Recording { handle, buffer } => match handle.take_fragments() {
                Ok(fragments) => {
                    let before = buffer.len();
                    for fragment in fragments {
                        buffer.push(fragment);
                    }
                    return Ok(buffer.len() - before);
                }
                Err(error) => {
                    handle.release();
                    error
                }
            },
            _ => return Err(self.invalid("poll")),
        };

        tracing::warn!("Capture device failed mid-recording: {failure}");
        self.phase = Phase::DeviceError {
            message: failure.to_string(),
        };
        Err(failure.into())
    }

    /// Keep recording for `duration`, pulling fragments every timeslice.
    pub async fn record_for(&mut self, duration: Duration) -> Result<(), CaptureError> {
        if self.state() != CaptureState::Recording {
            return Err(self.invalid("record"));
        }

        let deadline = Instant::now() + duration;
        let mut ticker = tokio::time::interval(self.options.timeslice);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.poll()?;
            if Instant::now() >= deadline {
                return Ok(());
            }
        }
    }

    /// Finish recording, release the device and assemble the artifact.
    pub fn stop(&mut self) -> Result<&CapturedMedia, CaptureError> {
        if self.state() != CaptureState::Recording {
            return Err(self.invalid("stop"));
        }
        let Phase::Recording {
            mut handle,
            mut buffer,
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return Err(self.invalid("stop"));
        };

        let drained = handle.take_fragments();
        handle.release();
        match drained {
            Ok(fragments) => fragments.into_iter().for_each(|fragment| buffer.push(fragment)),
            Err(error) => {
                self.phase = Phase::DeviceError {
                    message: error.to_string(),
                };
                return Err(error.into());
            }
        }

        if buffer.is_empty() {
            tracing::warn!(kind = %self.kind, "Recording stopped without data");
            self.phase = Phase::DeviceError {
                message: NO_DATA_CAPTURED.to_string(),
            };
            return Err(CaptureError::NoDataCaptured);
        }

        let fragment_count = buffer.len();
        let mime_type = handle.mime_type().to_string();
        let bytes = match handle.assemble(buffer.into_fragments()) {
            Ok(bytes) => bytes,
            Err(error) => {
                self.phase = Phase::DeviceError {
                    message: error.to_string(),
                };
                return Err(error.into());
            }
        };
        drop(handle);

        let file_name = build_capture_file_name(self.kind, &mime_type);
        let preview_path = write_preview(&self.options.preview_dir, &file_name, &bytes);
        tracing::info!(
            kind = %self.kind,
            fragments = fragment_count,
            bytes = bytes.len(),
            "Recording stopped"
        );

        self.phase = Phase::Stopped {
            media: CapturedMedia {
                kind: self.kind,
                mime_type,
                bytes,
                fragment_count,
                file_name,
                preview_path,
            },
        };
        self.media().ok_or(CaptureError::NoDataCaptured)
    }

    /// Drop the finished artifact or the error and return to idle.
    pub fn discard(&mut self) -> Result<(), CaptureError> {
        match self.phase {
            Phase::Stopped { .. } | Phase::DeviceError { .. } => {
                self.reset();
                Ok(())
            }
            _ => Err(self.invalid("discard")),
        }
    }

    /// Discard the finished artifact or the error and start again.
    ///
    /// Only valid from `stopped` or `device-error`; an idle session is
    /// started with [`Self::start`].
    pub async fn restart(&mut self) -> Result<(), CaptureError> {
        match self.phase {
            Phase::Stopped { .. } | Phase::DeviceError { .. } => {}
            _ => return Err(self.invalid("restart")),
        }
        self.reset();
        self.start().await
    }

    /// Tear the session down from any state.
    pub fn close(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Previewing { mut handle } | Phase::Recording { mut handle, .. } => {
                handle.release();
            }
            Phase::Stopped { media } => {
                if let Some(path) = media.preview_path {
                    remove_preview(&path);
                }
            }
            Phase::Idle | Phase::RequestingDevice | Phase::DeviceError { .. } => {}
        }
    }

    const fn invalid(&self, operation: &'static str) -> CaptureError {
        CaptureError::InvalidTransition {
            operation,
            state: self.phase.state(),
        }
    }
}

/// Keeps a session in `requesting-device` while `acquire` is pending.
///
/// A `start` future dropped before the device answers leaves the session idle.
struct PendingRequest<'a, H> {
    phase: &'a mut Phase<H>,
}

impl<'a, H> PendingRequest<'a, H> {
    fn begin(phase: &'a mut Phase<H>) -> Self {
        *phase = Phase::RequestingDevice;
        Self { phase }
    }

    fn settle(mut self, next: Phase<H>) {
        *self.phase = next;
    }
}

impl<H> Drop for PendingRequest<'_, H> {
    fn drop(&mut self) {
        if matches!(self.phase, Phase::RequestingDevice) {
            tracing::debug!("Capture device request cancelled");
            *self.phase = Phase::Idle;
        }
    }
}

impl<D: CaptureDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<D: CaptureDevice> fmt::Debug for CaptureSession<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn build_capture_file_name(kind: MediaKind, mime_type: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let extension = kind.extension_for(mime_type);
    format!("recording-{timestamp}.{extension}")
}

fn write_preview(dir: &Path, file_name: &str, bytes: &[u8]) -> Option<PathBuf> {
    let path = dir.join(file_name);
    let written = std::fs::create_dir_all(dir).and_then(|()| std::fs::write(&path, bytes));
    match written {
        Ok(()) => Some(path),
        Err(error) => {
            tracing::warn!("Failed to write capture preview {:?}: {}", path, error);
            None
        }
    }
}

fn remove_preview(path: &Path) {
    if let Err(error) = std::fs::remove_file(path) {
        tracing::debug!("Failed to delete capture preview {:?}: {}", path, error);
    }
}
