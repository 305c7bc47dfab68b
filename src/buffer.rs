//! Single-slot latest-frame mailbox shared by the capture loop and the
//! streaming sessions.
//!
//! Publishing replaces the held frame unconditionally; there is no queue and
//! no history. Readers get an `Arc` to an immutable frame, so a reader can
//! encode at leisure while the producer publishes the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::frame::Frame;

/// Latest-value-wins frame slot.
#[derive(Debug, Default)]
pub struct SharedFrameBuffer {
    slot: RwLock<Option<Arc<Frame>>>,
    published: AtomicU64,
}

impl SharedFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the held frame.
    ///
    /// The new frame is fully built before the lock is taken, so the write
    /// lock is held only for a pointer swap. The superseded frame is dropped
    /// after the lock is released.
    pub fn publish(&self, frame: Frame) {
        let frame = Arc::new(frame);
        let sequence = frame.sequence();
        let previous = {
            let mut slot = self.slot.write();
            slot.replace(frame)
        };
        self.published.fetch_add(1, Ordering::Relaxed);
        trace!(sequence, "Frame published");
        drop(previous);
    }

    /// Returns the current frame, or `None` if nothing was ever published.
    pub fn read_snapshot(&self) -> Option<Arc<Frame>> {
        self.slot.read().clone()
    }

    /// Sequence number of the held frame, if any.
    pub fn latest_sequence(&self) -> Option<u64> {
        self.slot.read().as_ref().map(|frame| frame.sequence())
    }

    /// Total number of publishes since creation.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame_with(sequence: u64, value: u8) -> Frame {
        let mut frame = Frame::filled(16, 8, [value, value, value]);
        frame.set_sequence(sequence);
        frame
    }

    #[test]
    fn test_empty_before_first_publish() {
        let buffer = SharedFrameBuffer::new();
        assert!(buffer.read_snapshot().is_none());
        assert!(buffer.is_empty());
        assert_eq!(buffer.latest_sequence(), None);
    }

    #[test]
    fn test_latest_value_wins() {
        let buffer = SharedFrameBuffer::new();
        buffer.publish(frame_with(1, 10));
        buffer.publish(frame_with(2, 20));

        let snapshot = buffer.read_snapshot().unwrap();
        assert_eq!(snapshot.sequence(), 2);
        assert_eq!(snapshot.pixel(0, 0), Some([20, 20, 20]));
        assert_eq!(buffer.published_count(), 2);
    }

    #[test]
    fn test_snapshot_survives_next_publish() {
        let buffer = SharedFrameBuffer::new();
        buffer.publish(frame_with(1, 10));
        let held = buffer.read_snapshot().unwrap();

        buffer.publish(frame_with(2, 20));

        assert_eq!(held.sequence(), 1);
        assert!(held.data().iter().all(|&b| b == 10));
    }

    #[test]
    fn test_never_empty_after_first_publish() {
        let buffer = SharedFrameBuffer::new();
        buffer.publish(frame_with(1, 1));
        for i in 2..50 {
            buffer.publish(frame_with(i, i as u8));
            assert!(buffer.read_snapshot().is_some());
        }
    }

    #[test]
    fn test_concurrent_readers_see_whole_frames() {
        let buffer = Arc::new(SharedFrameBuffer::new());

        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 1..=500u64 {
                    buffer.publish(frame_with(i, (i % 251) as u8));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    let mut last_seen = 0;
                    for _ in 0..2_000 {
                        if let Some(frame) = buffer.read_snapshot() {
                            let expected = (frame.sequence() % 251) as u8;
                            assert!(
                                frame.data().iter().all(|&b| b == expected),
                                "mixed frame at sequence {}",
                                frame.sequence()
                            );
                            assert!(frame.sequence() >= last_seen);
                            last_seen = frame.sequence();
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(buffer.latest_sequence(), Some(500));
    }
}
