//! Concurrent producer/consumer runs over the frame stage

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use bytes::Bytes;
use edgecam::capture::PixelBuffer;
use edgecam::pipeline::{FrameStage, Publish, StagedFrame};

const FRAMES: u64 = 20_000;

fn uniform_frame(generation: u64) -> StagedFrame {
    let value = (generation % 251) as u8;
    StagedFrame::new(
        PixelBuffer::filled(16, 16, [value, value, value, value]),
        generation,
        Instant::now(),
    )
}

/// Live pixel allocations and the most ever alive at once
#[derive(Default)]
struct Liveness {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl Liveness {
    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Pixel storage that reports its own lifetime
struct TrackedPixels {
    data: Vec<u8>,
    liveness: Arc<Liveness>,
}

impl TrackedPixels {
    fn new(data: Vec<u8>, liveness: &Arc<Liveness>) -> Self {
        let live = liveness.live.fetch_add(1, Ordering::SeqCst) + 1;
        liveness.peak.fetch_max(live, Ordering::SeqCst);
        Self {
            data,
            liveness: Arc::clone(liveness),
        }
    }
}

impl AsRef<[u8]> for TrackedPixels {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for TrackedPixels {
    fn drop(&mut self) {
        self.liveness.live.fetch_sub(1, Ordering::SeqCst);
    }
}

fn tracked_frame(generation: u64, liveness: &Arc<Liveness>) -> StagedFrame {
    let value = (generation % 251) as u8;
    StagedFrame {
        width: 16,
        height: 16,
        pixels: Bytes::from_owner(TrackedPixels::new(vec![value; 16 * 16 * 4], liveness)),
        generation,
        captured_at: Instant::now(),
    }
}

#[test]
fn test_superseded_frames_are_freed() {
    let liveness = Arc::new(Liveness::default());
    let stage = FrameStage::new();

    for generation in 1..=100 {
        stage.publish(tracked_frame(generation, &liveness));
        assert_eq!(liveness.live(), 1);
    }
    // The staged frame plus the one being published
    assert_eq!(liveness.peak(), 2);

    let frame = stage.take_latest().unwrap();
    assert_eq!(frame.generation, 100);
    assert_eq!(liveness.live(), 1);
    drop(frame);
    assert_eq!(liveness.live(), 0);

    stage.publish(tracked_frame(101, &liveness));
    stage.close();
    assert_eq!(liveness.live(), 0);

    assert_eq!(stage.publish(tracked_frame(102, &liveness)), Publish::Closed);
    assert_eq!(liveness.live(), 0);
}

#[test]
fn test_concurrent_frames_stay_bounded() {
    let liveness = Arc::new(Liveness::default());
    let stage = Arc::new(FrameStage::new());
    let done = Arc::new(AtomicBool::new(false));

    let producer = thread::spawn({
        let stage = Arc::clone(&stage);
        let done = Arc::clone(&done);
        let liveness = Arc::clone(&liveness);
        move || {
            for generation in 1..=FRAMES {
                stage.publish(tracked_frame(generation, &liveness));
            }
            done.store(true, Ordering::Release);
        }
    });

    loop {
        let finished = done.load(Ordering::Acquire);
        match stage.take_latest() {
            Some(frame) => assert_eq!(frame.pixels.len(), 16 * 16 * 4),
            None if finished => break,
            None => thread::yield_now(),
        }
    }
    producer.join().unwrap();

    // At most one staged, one being published, one held by the consumer
    assert!(liveness.peak() <= 3, "peak of {} live frames", liveness.peak());
    assert_eq!(liveness.live(), 0);
}

#[test]
fn test_consumer_sees_whole_frames_in_order() {
    let stage = Arc::new(FrameStage::new());
    let done = Arc::new(AtomicBool::new(false));

    let producer = thread::spawn({
        let stage = Arc::clone(&stage);
        let done = Arc::clone(&done);
        move || {
            for generation in 1..=FRAMES {
                assert_ne!(stage.publish(uniform_frame(generation)), Publish::Closed);
            }
            done.store(true, Ordering::Release);
        }
    });

    let mut last_generation = 0;
    let mut received = 0u64;
    loop {
        let finished = done.load(Ordering::Acquire);
        match stage.take_latest() {
            Some(frame) => {
                // Never a mix of two frames
                let expected = (frame.generation % 251) as u8;
                assert!(frame.pixels.iter().all(|&b| b == expected));
                assert_eq!(frame.pixels.len(), 16 * 16 * 4);

                assert!(frame.generation > last_generation);
                last_generation = frame.generation;
                received += 1;
            }
            None if finished => break,
            None => thread::yield_now(),
        }
    }
    producer.join().unwrap();

    // The last publish always survives until taken
    assert_eq!(last_generation, FRAMES);

    let stats = stage.stats();
    assert_eq!(stats.published, FRAMES);
    assert_eq!(stats.taken, received);
    assert_eq!(stats.published, stats.taken + stats.dropped);
}

#[test]
fn test_close_stops_running_producer() {
    let stage = Arc::new(FrameStage::new());

    let producer = thread::spawn({
        let stage = Arc::clone(&stage);
        move || {
            let mut generation = 0;
            loop {
                generation += 1;
                if stage.publish(uniform_frame(generation)) == Publish::Closed {
                    break;
                }
            }
            // Once closed, a stage never accepts again
            for extra in 1..=100 {
                assert_eq!(stage.publish(uniform_frame(generation + extra)), Publish::Closed);
            }
            generation
        }
    });

    while stage.stats().published < FRAMES / 4 {
        thread::yield_now();
    }
    stage.close();

    let rejected_at = producer.join().unwrap();
    assert!(rejected_at > FRAMES / 4);
    assert!(stage.is_closed());
    assert!(!stage.has_frame());
    assert!(stage.take_latest().is_none());

    let stats = stage.stats();
    assert_eq!(stats.taken, 0);
    assert_eq!(stats.published, rejected_at - 1);
    // Only the frame discarded by close is unaccounted for
    assert_eq!(stats.published, stats.dropped + 1);
}
