pub mod capture;
pub mod display;
pub mod error;
pub mod pipeline;

use std::path::{Path, PathBuf};

use capture::{ChromaLayout, ColorRange, TestPattern};
use serde::{Deserialize, Serialize};

pub use error::{PipelineError, Result};
pub use pipeline::{FilterParameters, FrameProducer, Pipeline};

/// Prefix for environment overrides, e.g. `EDGECAM__FILTER__HIGH_THRESHOLD=120`
pub const ENV_PREFIX: &str = "EDGECAM";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub filter: FilterParameters,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub color_range: ColorRange,
    pub layout: ChromaLayout,
    pub pattern: TestPattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// RGBA, 0.0..=1.0
    pub clear_color: [f64; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub filter_enabled: bool,
    /// Draw-loop iterations for the demo runner, 0 = until ctrl-c
    pub frames: u64,
    /// Write the last rendered frame here as PNG
    pub dump_path: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            color_range: ColorRange::Full,
            layout: ChromaLayout::Planar,
            pattern: TestPattern::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 60,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter_enabled: true,
            frames: 300,
            dump_path: None,
        }
    }
}

impl Config {
    /// Defaults, overlaid by an optional TOML file, overlaid by `EDGECAM__*`
    /// environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Config>()?;

        config.filter.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_filter_and_display() {
        let config = Config::default();
        assert_eq!(config.filter.low_threshold, 50.0);
        assert_eq!(config.filter.high_threshold, 150.0);
        assert_eq!(config.filter.blur_kernel_size, 3);
        assert_eq!(config.display.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_load_without_file_gives_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.camera.width, 640);
        assert!(config.pipeline.filter_enabled);
    }

    #[test]
    fn test_load_partial_toml() {
        let path = std::env::temp_dir().join(format!("edgecam-test-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[filter]
high_threshold = 120.0

[camera]
width = 320
color_range = "limited"
layout = "interleaved"
pattern = {{ kind = "flat", y = 60, u = 128, v = 128 }}
"#
        )
        .unwrap();
        drop(file);

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.filter.high_threshold, 120.0);
        assert_eq!(config.filter.low_threshold, 50.0);
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.camera.height, 480);
        assert_eq!(config.camera.color_range, ColorRange::Limited);
        assert_eq!(config.camera.layout, ChromaLayout::Interleaved);
        assert_eq!(
            config.camera.pattern,
            TestPattern::Flat {
                y: 60,
                u: 128,
                v: 128
            }
        );
    }

    #[test]
    fn test_load_rejects_invalid_filter() {
        let path = std::env::temp_dir().join(format!("edgecam-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[filter]\nblur_kernel_size = 4\n").unwrap();

        let result = Config::load(Some(&path));
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(PipelineError::InvalidParameters(_))));
    }
}
