//! edgecam demo runner: synthetic camera -> edge filter -> headless GPU draw loop

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::{eyre::eyre, Result};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wgpu::TextureFormat;

use edgecam::capture::SyntheticCamera;
use edgecam::display::{RenderOutcome, SurfaceContext};
use edgecam::pipeline::version;
use edgecam::{CameraConfig, Config, FrameProducer, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("edgecam=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("{} launching...", version());

    // Load configuration
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    // Headless surface standing in for the host's window
    let gpu = SurfaceContext::headless(TextureFormat::Rgba8Unorm).await?;
    let target = gpu.create_target(config.display.width, config.display.height);

    let mut pipeline = Pipeline::init(&config)?;
    pipeline.on_surface_created(gpu.clone());
    pipeline.on_surface_changed(config.display.width, config.display.height);

    // Spawn capture task
    let running = Arc::new(AtomicBool::new(true));
    let capture_handle = tokio::task::spawn_blocking({
        let running = Arc::clone(&running);
        let producer = pipeline.producer();
        let camera = config.camera.clone();
        let filter_enabled = config.pipeline.filter_enabled;
        move || run_camera(camera, producer, filter_enabled, &running)
    });

    // Draw loop at display cadence
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(
        1.0 / config.display.fps.max(1) as f64,
    ));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let (mut ticks, mut drawn) = (0u64, 0u64);
    let draw_start = Instant::now();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if pipeline.on_draw_frame(&target) == RenderOutcome::Drawn {
                    drawn += 1;
                }
                ticks += 1;
                if config.pipeline.frames > 0 && ticks >= config.pipeline.frames {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    let draw_elapsed = draw_start.elapsed();
    running.store(false, Ordering::Relaxed);
    let camera_fps = capture_handle.await?;

    if let Some(path) = &config.pipeline.dump_path {
        let frame = gpu.read_target(&target)?;
        let (width, height) = (frame.width(), frame.height());
        image::RgbaImage::from_raw(width, height, frame.into_vec())
            .ok_or_else(|| eyre!("Rendered frame does not fit {}x{}", width, height))?
            .save(path)?;
        info!("Last rendered frame written to {}", path.display());
    }

    let stats = pipeline.stats();
    info!(
        "{} draw ticks, {} drawn; {} frames published, {} uploaded, {} superseded",
        ticks, drawn, stats.published, stats.taken, stats.dropped
    );
    info!(
        "Achieved {:.1} draw fps, {:.1} camera fps",
        rate(drawn, draw_elapsed),
        camera_fps
    );

    pipeline.destroy();
    info!("edgecam shutting down");
    Ok(())
}

/// Frames per second over `elapsed`
fn rate(frames: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        frames as f64 / secs
    } else {
        0.0
    }
}

/// Producer loop: deliver synthetic camera frames at the configured rate.
/// Returns the achieved frame rate.
fn run_camera(config: CameraConfig, producer: FrameProducer, filter_enabled: bool, running: &AtomicBool) -> f64 {
    let frame_interval = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);
    let mut camera = SyntheticCamera::new(config);
    let mut delivered = 0u64;
    let loop_start = Instant::now();

    info!("Capture loop started");
    while running.load(Ordering::Relaxed) {
        let started = Instant::now();

        let frame = camera.next_frame();
        match frame.planar() {
            Ok(image) => {
                producer.on_frame_available(&image, filter_enabled);
                delivered += 1;
            }
            Err(e) => error!("Capture error: {}", e),
        }

        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }
    let fps = rate(delivered, loop_start.elapsed());
    info!("Capture loop stopped after {} frames ({:.1} fps)", delivered, fps);
    fps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate() {
        assert_eq!(rate(60, Duration::from_secs(2)), 30.0);
        assert_eq!(rate(10, Duration::ZERO), 0.0);
    }
}
