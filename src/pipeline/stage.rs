//! Single-slot, latest-wins frame mailbox between the camera and the GPU thread

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use tracing::trace;

use crate::capture::frame::PixelBuffer;

/// Processed frame waiting for upload. Read-only once staged.
#[derive(Debug, Clone)]
pub struct StagedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
    pub generation: u64,
    /// When the source camera frame was delivered
    pub captured_at: Instant,
}

impl StagedFrame {
    pub fn new(pixels: PixelBuffer, generation: u64, captured_at: Instant) -> Self {
        Self {
            width: pixels.width(),
            height: pixels.height(),
            pixels: pixels.into_bytes(),
            generation,
            captured_at,
        }
    }
}

/// What `publish` did with the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// Slot was empty
    Stored,
    /// An unconsumed frame was discarded
    Replaced,
    /// Stage closed; frame discarded
    Closed,
}

#[derive(Default)]
struct Stats {
    published: AtomicU64,
    taken: AtomicU64,
    dropped: AtomicU64,
}

/// Counters at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSnapshot {
    pub published: u64,
    pub taken: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Slot {
    frame: Option<StagedFrame>,
    closed: bool,
}

/// Holds at most one frame. The lock covers only the slot swap; frames
/// are built before `publish` and freed after the lock is released.
#[derive(Default)]
pub struct FrameStage {
    slot: Mutex<Slot>,
    stats: CachePadded<Stats>,
}

impl FrameStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer: replace whatever is staged with `frame`
    pub fn publish(&self, frame: StagedFrame) -> Publish {
        let generation = frame.generation;
        let (outcome, stale) = {
            let mut slot = self.slot.lock();
            if slot.closed {
                (Publish::Closed, Some(frame))
            } else {
                match slot.frame.replace(frame) {
                    Some(old) => (Publish::Replaced, Some(old)),
                    None => (Publish::Stored, None),
                }
            }
        };

        match outcome {
            Publish::Stored => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
            }
            Publish::Replaced => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("frames_dropped").increment(1);
                trace!(generation, "Superseded unconsumed frame");
            }
            Publish::Closed => {
                trace!(generation, "Stage closed, discarding frame");
            }
        }

        drop(stale);
        outcome
    }

    /// Consumer: take the staged frame, if one arrived since the last take
    pub fn take_latest(&self) -> Option<StagedFrame> {
        let frame = self.slot.lock().frame.take();
        if frame.is_some() {
            self.stats.taken.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    pub fn has_frame(&self) -> bool {
        self.slot.lock().frame.is_some()
    }

    /// Drop the staged frame and refuse further publishes
    pub fn close(&self) {
        let stale = {
            let mut slot = self.slot.lock();
            slot.closed = true;
            slot.frame.take()
        };
        drop(stale);
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    pub fn stats(&self) -> StageSnapshot {
        StageSnapshot {
            published: self.stats.published.load(Ordering::Relaxed),
            taken: self.stats.taken.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(generation: u64) -> StagedFrame {
        StagedFrame::new(
            PixelBuffer::filled(2, 2, [generation as u8, 0, 0, 255]),
            generation,
            Instant::now(),
        )
    }

    #[test]
    fn test_take_on_empty_stage() {
        let stage = FrameStage::new();
        assert!(stage.take_latest().is_none());
        assert!(!stage.has_frame());
    }

    #[test]
    fn test_latest_wins() {
        let stage = FrameStage::new();
        assert_eq!(stage.publish(frame(1)), Publish::Stored);
        assert_eq!(stage.publish(frame(2)), Publish::Replaced);

        let taken = stage.take_latest().unwrap();
        assert_eq!(taken.generation, 2);
        assert_eq!(taken.pixels[0], 2);
        assert!(stage.take_latest().is_none());

        assert_eq!(
            stage.stats(),
            StageSnapshot {
                published: 2,
                taken: 1,
                dropped: 1
            }
        );
    }

    #[test]
    fn test_take_clears_slot() {
        let stage = FrameStage::new();
        stage.publish(frame(7));
        assert!(stage.has_frame());
        assert!(stage.take_latest().is_some());
        assert!(!stage.has_frame());
        assert!(stage.take_latest().is_none());
    }

    #[test]
    fn test_closed_stage_discards() {
        let stage = FrameStage::new();
        stage.publish(frame(1));
        stage.close();

        assert!(stage.is_closed());
        assert!(stage.take_latest().is_none());
        assert_eq!(stage.publish(frame(2)), Publish::Closed);
        assert!(stage.take_latest().is_none());
        assert_eq!(stage.stats().published, 1);
    }

    #[test]
    fn test_staged_frame_keeps_geometry() {
        let staged = StagedFrame::new(PixelBuffer::filled(3, 5, [9, 9, 9, 255]), 4, Instant::now());
        assert_eq!((staged.width, staged.height), (3, 5));
        assert_eq!(staged.pixels.len(), 3 * 5 * 4);
    }
}
