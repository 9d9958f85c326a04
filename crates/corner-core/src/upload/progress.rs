//! Upload progress reporting.

use std::io;

use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;

/// Size of the body slices handed to the transport.
pub const PROGRESS_CHUNK_BYTES: usize = 64 * 1024;

/// Percentage ceiling while the server has not answered yet.
const IN_FLIGHT_CEILING: u8 = 99;

/// Turns consumed byte counts into ordered, non-decreasing percentages.
///
/// Values stop at 99 while bytes are being sent; 100 is only reported once
/// the upload has been accepted.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    sent: u64,
    last: Option<u8>,
    sink: Option<UnboundedSender<u8>>,
}

impl ProgressTracker {
    pub const fn new(total: u64, sink: Option<UnboundedSender<u8>>) -> Self {
        Self {
            total,
            sent: 0,
            last: None,
            sink,
        }
    }

    /// Record `bytes` more of the body as consumed.
    pub fn advance(&mut self, bytes: usize) {
        let bytes = u64::try_from(bytes).unwrap_or(u64::MAX);
        self.sent = self.sent.saturating_add(bytes).min(self.total);
        let percent = if self.total == 0 {
            IN_FLIGHT_CEILING
        } else {
            let raw = self.sent.saturating_mul(100) / self.total;
            u8::try_from(raw).unwrap_or(100).min(IN_FLIGHT_CEILING)
        };
        self.emit(percent);
    }

    /// Report the final 100.
    pub fn complete(&mut self) {
        self.emit(100);
    }

    pub const fn last_percent(&self) -> Option<u8> {
        self.last
    }

    fn emit(&mut self, percent: u8) {
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(sink) = &self.sink {
            // A dropped receiver only means nobody is watching.
            let _ = sink.send(percent);
        }
    }
}

/// Stream `bytes` in slices, advancing `tracker` as each slice is pulled.
pub fn progress_chunks(
    bytes: Vec<u8>,
    chunk_size: usize,
    mut tracker: ProgressTracker,
) -> impl Stream<Item = io::Result<Vec<u8>>> + Send + Sync + 'static {
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<Vec<u8>> = bytes.chunks(chunk_size).map(<[u8]>::to_vec).collect();
    stream::iter(chunks).map(move |chunk| {
        tracker.advance(chunk.len());
        Ok(chunk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn drain(receiver: &mut mpsc::UnboundedReceiver<u8>) -> Vec<u8> {
        let mut values = Vec::new();
        while let Ok(value) = receiver.try_recv() {
            values.push(value);
        }
        values
    }

    #[tokio::test]
    async fn chunks_report_monotonic_progress() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let tracker = ProgressTracker::new(10, Some(sender.clone()));

        let collected: Vec<Vec<u8>> = progress_chunks(vec![7; 10], 3, tracker)
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(collected.concat(), vec![7; 10]);

        let mut finisher = ProgressTracker::new(0, Some(sender));
        finisher.complete();

        let values = drain(&mut receiver);
        assert_eq!(values, vec![30, 60, 90, 99, 100]);
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn repeated_percentages_are_not_resent() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut tracker = ProgressTracker::new(1_000, Some(sender));
        tracker.advance(1);
        tracker.advance(1);
        tracker.advance(10);
        tracker.complete();
        tracker.complete();

        assert_eq!(drain(&mut receiver), vec![0, 1, 100]);
        assert_eq!(tracker.last_percent(), Some(100));
    }

    #[test]
    fn empty_body_still_finishes_at_hundred() {
        let mut tracker = ProgressTracker::new(0, None);
        tracker.advance(0);
        tracker.complete();
        assert_eq!(tracker.last_percent(), Some(100));
    }
}
