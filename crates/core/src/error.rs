//! Error types shared by the engines and the controller.

use thiserror::Error;

/// A configuration value rejected at the setter boundary. The previous
/// value is always kept.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{kind} index {index} out of range (max {max})")]
    IndexOutOfRange { kind: &'static str, index: usize, max: usize },

    #[error("interval must be positive, got {0}")]
    NonPositiveInterval(i64),

    #[error("threshold must be within 0..=100, got {0}")]
    ThresholdOutOfRange(f64),

    #[error("malformed coordinates {0:?}, expected x1,y1,x2,y2")]
    MalformedCoords(String),

    #[error("rectangle {0:?} has zero area")]
    EmptyRect([i32; 4]),

    #[error("unknown key {0:?}")]
    UnknownKey(String),

    #[error("invalid duration {0}s")]
    InvalidDuration(f64),
}

/// Why a pixel region could not be classified.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("row stride {stride} shorter than {width} pixels")]
    StrideTooShort { stride: u32, width: u32 },

    #[error("pixel buffer holds {actual} bytes, frame needs {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("crop {crop:?} outside {width}x{height} frame")]
    CropOutOfBounds { crop: [i32; 4], width: u32, height: u32 },
}

/// A faulted polling cycle, counted toward the self-stop budget.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleError {
    #[error("screen capture returned no frame")]
    CaptureUnavailable,

    #[error("cycle panicked: {0}")]
    Panicked(String),
}
