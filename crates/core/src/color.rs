//! Health-bar color classification.
//!
//! A region's "ratio" is the percentage of its pixels that look like a
//! filled health bar. Captures are always BGRA.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ClassifyError;
use crate::types::{Capture, Point, Rect, Rgb};

/// Health-bar red, #AE0000.
pub const HEALTH_BAR_COLOR: Rgb = Rgb(0xAE, 0x00, 0x00);

/// Per-channel tolerance declared alongside the health-bar color.
pub const DEFAULT_TOLERANCE: u8 = 30;

/// Ratio reported when a region cannot be classified. Treating unknown
/// health as full suppresses heals on bad data.
pub const FULL_HEALTH: f64 = 100.0;

/// Which pixels count as "health bar".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MatchRule {
    /// One-sided thresholds: `r > min_red && g < max_green && b < max_blue`.
    /// Tolerates gradient and anti-aliasing at the bar edges.
    Threshold { min_red: u8, max_green: u8, max_blue: u8 },
    /// Symmetric band: every channel within `tolerance` of `target`.
    Tolerance { target: Rgb, tolerance: u8 },
}

impl Default for MatchRule {
    fn default() -> Self {
        MatchRule::Threshold { min_red: 150, max_green: 100, max_blue: 100 }
    }
}

impl MatchRule {
    /// The symmetric rule around the health-bar color.
    pub fn health_bar_tolerance() -> Self {
        MatchRule::Tolerance { target: HEALTH_BAR_COLOR, tolerance: DEFAULT_TOLERANCE }
    }

    pub fn matches(&self, px: Rgb) -> bool {
        let Rgb(r, g, b) = px;
        match *self {
            MatchRule::Threshold { min_red, max_green, max_blue } => {
                r > min_red && g < max_green && b < max_blue
            }
            MatchRule::Tolerance { target, tolerance } => {
                r.abs_diff(target.0) <= tolerance
                    && g.abs_diff(target.1) <= tolerance
                    && b.abs_diff(target.2) <= tolerance
            }
        }
    }
}

fn check_shape(capture: &Capture) -> Result<(), ClassifyError> {
    if capture.bytes_per_row < capture.width.saturating_mul(4) {
        return Err(ClassifyError::StrideTooShort {
            stride: capture.bytes_per_row,
            width: capture.width,
        });
    }
    // The last row only needs `width * 4` bytes, not a full stride.
    let expected = if capture.height == 0 || capture.width == 0 {
        0
    } else {
        (capture.height as usize - 1) * capture.bytes_per_row as usize
            + capture.width as usize * 4
    };
    if capture.data.len() < expected {
        return Err(ClassifyError::Truncated { expected, actual: capture.data.len() });
    }
    Ok(())
}

fn ratio_in(capture: &Capture, x0: u32, y0: u32, w: u32, h: u32, rule: &MatchRule) -> f64 {
    let total = w as u64 * h as u64;
    if total == 0 {
        return 0.0;
    }
    let mut matched = 0u64;
    for y in y0..y0 + h {
        let row = (y * capture.bytes_per_row) as usize;
        for x in x0..x0 + w {
            let idx = row + (x * 4) as usize;
            let px = Rgb(capture.data[idx + 2], capture.data[idx + 1], capture.data[idx]);
            if rule.matches(px) {
                matched += 1;
            }
        }
    }
    (matched as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Percentage of matching pixels in the whole capture. A capture with no
/// pixels yields `0`.
pub fn classify(capture: &Capture, rule: &MatchRule) -> Result<f64, ClassifyError> {
    check_shape(capture)?;
    Ok(ratio_in(capture, 0, 0, capture.width, capture.height, rule))
}

/// Percentage of matching pixels inside `crop`, given in screen
/// coordinates. `origin` is the screen position of the capture's top-left
/// pixel.
pub fn classify_region(
    capture: &Capture,
    origin: Point,
    crop: &Rect,
    rule: &MatchRule,
) -> Result<f64, ClassifyError> {
    check_shape(capture)?;
    let out_of_bounds = || ClassifyError::CropOutOfBounds {
        crop: crop.coords(),
        width: capture.width,
        height: capture.height,
    };
    let offset = |a: i32, b: i32| u32::try_from(i64::from(a) - i64::from(b)).ok();
    let (Some(x0), Some(y0)) = (offset(crop.x1(), origin.x), offset(crop.y1(), origin.y)) else {
        return Err(out_of_bounds());
    };
    let fits = |start: u32, len: u32, limit: u32| start.checked_add(len).is_some_and(|end| end <= limit);
    if !fits(x0, crop.width(), capture.width) || !fits(y0, crop.height(), capture.height) {
        return Err(out_of_bounds());
    }
    Ok(ratio_in(capture, x0, y0, crop.width(), crop.height(), rule))
}

/// Classify a region, falling back to full health when the pixel data is
/// unusable.
pub fn ratio_or_full(capture: &Capture, origin: Point, crop: &Rect, rule: &MatchRule) -> f64 {
    match classify_region(capture, origin, crop, rule) {
        Ok(ratio) => ratio,
        Err(e) => {
            warn!("cannot classify region {}: {}; assuming full health", crop, e);
            FULL_HEALTH
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb(200, 10, 10);
    const GRAY: Rgb = Rgb(60, 60, 60);

    fn half_bar(width: u32, height: u32) -> Capture {
        let mut cap = Capture::solid(width, height, GRAY);
        for y in 0..height {
            for x in 0..width / 2 {
                cap.put(x, y, RED);
            }
        }
        cap
    }

    #[test]
    fn test_all_matching_is_full() {
        let cap = Capture::solid(20, 4, RED);
        assert_eq!(classify(&cap, &MatchRule::default()).unwrap(), 100.0);
    }

    #[test]
    fn test_none_matching_is_zero() {
        let cap = Capture::solid(20, 4, GRAY);
        assert_eq!(classify(&cap, &MatchRule::default()).unwrap(), 0.0);
    }

    #[test]
    fn test_empty_grid_is_zero() {
        let cap = Capture { data: Vec::new(), width: 0, height: 0, bytes_per_row: 0 };
        let ratio = classify(&cap, &MatchRule::default()).unwrap();
        assert_eq!(ratio, 0.0);
        assert!(!ratio.is_nan());
    }

    #[test]
    fn test_half_filled_bar() {
        let cap = half_bar(10, 2);
        assert_eq!(classify(&cap, &MatchRule::default()).unwrap(), 50.0);
    }

    #[test]
    fn test_threshold_is_one_sided() {
        let rule = MatchRule::default();
        assert!(rule.matches(Rgb(255, 0, 0)));
        assert!(rule.matches(Rgb(151, 99, 99)));
        assert!(!rule.matches(Rgb(150, 0, 0)));
        assert!(!rule.matches(Rgb(255, 100, 0)));
        // The nominal bar color itself sits above the red floor.
        assert!(rule.matches(HEALTH_BAR_COLOR));
    }

    #[test]
    fn test_tolerance_band() {
        let rule = MatchRule::health_bar_tolerance();
        assert!(rule.matches(Rgb(174, 0, 0)));
        assert!(rule.matches(Rgb(204, 30, 30)));
        assert!(!rule.matches(Rgb(205, 0, 0)));
        // Bright red passes the threshold rule but not the band.
        assert!(!rule.matches(Rgb(255, 0, 0)));
    }

    #[test]
    fn test_truncated_buffer_is_error() {
        let mut cap = Capture::solid(10, 10, RED);
        cap.data.truncate(100);
        assert!(matches!(
            classify(&cap, &MatchRule::default()),
            Err(ClassifyError::Truncated { .. })
        ));
    }

    #[test]
    fn test_short_stride_is_error() {
        let mut cap = Capture::solid(10, 1, RED);
        cap.bytes_per_row = 8;
        assert!(matches!(
            classify(&cap, &MatchRule::default()),
            Err(ClassifyError::StrideTooShort { .. })
        ));
    }

    #[test]
    fn test_region_crop_uses_origin() {
        // Left half red, captured at screen offset (100, 50).
        let cap = half_bar(10, 2);
        let origin = Point { x: 100, y: 50 };
        let left = Rect::new(100, 50, 105, 52).unwrap();
        let right = Rect::new(105, 50, 110, 52).unwrap();
        let rule = MatchRule::default();
        assert_eq!(classify_region(&cap, origin, &left, &rule).unwrap(), 100.0);
        assert_eq!(classify_region(&cap, origin, &right, &rule).unwrap(), 0.0);
    }

    #[test]
    fn test_crop_outside_frame_falls_back_to_full() {
        let cap = Capture::solid(10, 2, GRAY);
        let origin = Point { x: 0, y: 0 };
        let crop = Rect::new(5, 0, 20, 2).unwrap();
        let rule = MatchRule::default();
        assert!(classify_region(&cap, origin, &crop, &rule).is_err());
        assert_eq!(ratio_or_full(&cap, origin, &crop, &rule), FULL_HEALTH);
    }

    #[test]
    fn test_crop_far_from_origin_is_out_of_bounds() {
        let cap = Capture::solid(10, 2, GRAY);
        let origin = Point { x: i32::MIN, y: 0 };
        let crop = Rect::new(i32::MAX - 5, 0, i32::MAX, 2).unwrap();
        assert!(matches!(
            classify_region(&cap, origin, &crop, &MatchRule::default()),
            Err(ClassifyError::CropOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_padded_stride() {
        // Backends may pad rows; padding bytes must be ignored.
        let mut cap = Capture::solid(4, 2, RED);
        let mut padded = Vec::new();
        for row in cap.data.chunks(16) {
            padded.extend_from_slice(row);
            padded.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
        }
        cap.data = padded;
        cap.bytes_per_row = 24;
        assert_eq!(classify(&cap, &MatchRule::default()).unwrap(), 100.0);
    }
}
