//! Capture devices for the terminal front end.
//!
//! Only audio can be captured from a terminal. With the `microphone` feature
//! the default input device is recorded as PCM16 and wrapped in WAV on stop;
//! without it every capture attempt reports the device as unavailable.

use corner_core::capture::{CaptureDevice, DeviceError};
use corner_core::MediaKind;

/// The device `corner record` captures from.
#[cfg(feature = "microphone")]
pub fn default_device() -> impl CaptureDevice {
    microphone::Microphone
}

#[cfg(not(feature = "microphone"))]
pub fn default_device() -> impl CaptureDevice {
    Unsupported
}

fn reject_video(kind: MediaKind) -> Result<(), DeviceError> {
    match kind {
        MediaKind::Audio => Ok(()),
        MediaKind::Video => Err(DeviceError::Unavailable(
            "the terminal has no camera access; record the video elsewhere and use `corner upload`"
                .to_string(),
        )),
    }
}

#[cfg(not(feature = "microphone"))]
#[derive(Debug, Default)]
pub struct Unsupported;

#[cfg(not(feature = "microphone"))]
pub enum NoHandle {}

#[cfg(not(feature = "microphone"))]
impl CaptureDevice for Unsupported {
    type Handle = NoHandle;

    async fn acquire(&mut self, kind: MediaKind) -> Result<NoHandle, DeviceError> {
        reject_video(kind)?;
        Err(DeviceError::Unavailable(
            "this build has no microphone support; reinstall with `--features microphone`"
                .to_string(),
        ))
    }
}

#[cfg(not(feature = "microphone"))]
impl corner_core::capture::CaptureHandle for NoHandle {
    fn mime_type(&self) -> &str {
        match *self {}
    }

    fn take_fragments(&mut self) -> Result<Vec<Vec<u8>>, DeviceError> {
        match *self {}
    }

    fn release(&mut self) {
        match *self {}
    }
}

#[cfg(feature = "microphone")]
mod microphone {
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::{Arc, Mutex};

    use corner_core::capture::wav::{duration_ms, encode_wav, samples_from_le_fragments, PcmFormat};
    use corner_core::capture::{CaptureDevice, CaptureHandle, DeviceError};
    use corner_core::MediaKind;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{BuildStreamError, SampleFormat, SizedSample, Stream, StreamConfig};

    use super::reject_video;

    const WAV_MIME_TYPE: &str = "audio/wav";

    type FailureSlot = Arc<Mutex<Option<String>>>;

    #[derive(Debug, Default)]
    pub struct Microphone;

    /// A running input stream; samples arrive on the audio thread.
    pub struct MicrophoneHandle {
        stream: Option<Stream>,
        fragments: Receiver<Vec<u8>>,
        failure: FailureSlot,
        format: PcmFormat,
    }

    impl CaptureDevice for Microphone {
        type Handle = MicrophoneHandle;

        async fn acquire(&mut self, kind: MediaKind) -> Result<MicrophoneHandle, DeviceError> {
            reject_video(kind)?;
            open_default_input()
        }
    }

    fn open_default_input() -> Result<MicrophoneHandle, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| DeviceError::Unavailable("no default input device".to_string()))?;
        let supported = device
            .default_input_config()
            .map_err(|error| DeviceError::Unavailable(error.to_string()))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let format = PcmFormat {
            sample_rate_hz: config.sample_rate.0,
            channels: config.channels,
        };

        let (sender, fragments) = mpsc::channel();
        let failure = FailureSlot::default();
        let stream = match sample_format {
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, sender, Arc::clone(&failure), |sample| sample)
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, sender, Arc::clone(&failure), u16_to_i16)
            }
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, sender, Arc::clone(&failure), f32_to_i16)
            }
            other => {
                return Err(DeviceError::Unavailable(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        }?;
        stream
            .play()
            .map_err(|error| DeviceError::Failed(error.to_string()))?;
        tracing::debug!(
            sample_rate_hz = format.sample_rate_hz,
            channels = format.channels,
            "Microphone stream started"
        );

        Ok(MicrophoneHandle {
            stream: Some(stream),
            fragments,
            failure,
            format,
        })
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        sender: Sender<Vec<u8>>,
        failure: FailureSlot,
        convert: fn(T) -> i16,
    ) -> Result<Stream, DeviceError>
    where
        T: SizedSample + Send + 'static,
    {
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let bytes = data
                        .iter()
                        .flat_map(|&sample| convert(sample).to_le_bytes())
                        .collect();
                    // The receiver is gone once the session released the handle.
                    let _ = sender.send(bytes);
                },
                move |error| {
                    if let Ok(mut slot) = failure.lock() {
                        slot.get_or_insert_with(|| error.to_string());
                    }
                },
                None,
            )
            .map_err(|error| match error {
                BuildStreamError::DeviceNotAvailable => {
                    DeviceError::Unavailable(error.to_string())
                }
                other => DeviceError::Failed(other.to_string()),
            })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn f32_to_i16(sample: f32) -> i16 {
        (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
    }

    #[allow(clippy::cast_possible_truncation)]
    fn u16_to_i16(sample: u16) -> i16 {
        (i32::from(sample) - 32_768) as i16
    }

    impl CaptureHandle for MicrophoneHandle {
        fn mime_type(&self) -> &str {
            WAV_MIME_TYPE
        }

        fn take_fragments(&mut self) -> Result<Vec<Vec<u8>>, DeviceError> {
            let failure = self.failure.lock().ok().and_then(|mut slot| slot.take());
            if let Some(message) = failure {
                return Err(DeviceError::Failed(message));
            }
            Ok(self.fragments.try_iter().collect())
        }

        fn release(&mut self) {
            if let Some(stream) = self.stream.take() {
                if let Err(error) = stream.pause() {
                    tracing::debug!("Failed to pause microphone stream: {}", error);
                }
                tracing::debug!("Microphone released");
            }
        }

        fn assemble(&self, fragments: Vec<Vec<u8>>) -> Result<Vec<u8>, DeviceError> {
            let samples = samples_from_le_fragments(&fragments);
            if let Ok(millis) = duration_ms(samples.len(), self.format) {
                tracing::debug!(duration_ms = millis, "Assembling microphone clip");
            }
            encode_wav(&samples, self.format).map_err(|error| DeviceError::Failed(error.to_string()))
        }
    }

    impl Drop for MicrophoneHandle {
        fn drop(&mut self) {
            self.release();
        }
    }

}

#[cfg(test)]
mod tests {
    use corner_core::capture::{CaptureSession, CaptureState};

    use super::*;

    #[test]
    fn video_is_never_captured_from_the_terminal() {
        assert!(reject_video(MediaKind::Audio).is_ok());
        let error = reject_video(MediaKind::Video).unwrap_err();
        assert!(matches!(error, DeviceError::Unavailable(_)));
        assert!(error.to_string().contains("corner upload"));
    }

    #[tokio::test]
    async fn video_capture_ends_in_device_error() {
        let mut session = CaptureSession::new(default_device(), MediaKind::Video);
        assert!(session.start().await.is_err());
        assert_eq!(session.state(), CaptureState::DeviceError);
        assert!(session.error_message().unwrap().contains("camera"));
    }

    #[cfg(not(feature = "microphone"))]
    #[tokio::test]
    async fn builds_without_microphone_report_unavailable() {
        let mut session = CaptureSession::new(default_device(), MediaKind::Audio);
        let error = session.start().await.unwrap_err();
        assert!(error.to_string().contains("--features microphone"));
        assert_eq!(session.state(), CaptureState::DeviceError);
    }
}
