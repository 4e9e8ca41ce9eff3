//! Frame dumps for diagnosing region placement (feature `debug-capture`).

use std::path::{Path, PathBuf};

use chrono::Local;
use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::types::Capture;

/// Writes captured frames as PNG files into one directory.
#[derive(Debug, Clone)]
pub struct FrameDumper {
    dir: PathBuf,
}

impl FrameDumper {
    pub fn new(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    /// Convert a BGRA capture into an RGBA image.
    pub fn to_image(capture: &Capture) -> RgbaImage {
        RgbaImage::from_fn(capture.width, capture.height, |x, y| {
            let i = (y * capture.bytes_per_row + x * 4) as usize;
            match capture.data.get(i..i + 4) {
                Some(px) => Rgba([px[2], px[1], px[0], 255]),
                None => Rgba([0, 0, 0, 0]),
            }
        })
    }

    /// Save `capture` as `<tag>_<timestamp>.png`. Failures are logged.
    pub fn dump(&self, capture: &Capture, tag: &str) {
        let name = format!("{}_{}.png", tag, Local::now().format("%H%M%S%.3f"));
        let path = self.dir.join(name);
        match Self::to_image(capture).save(&path) {
            Ok(()) => debug!(target: "debug", "saved frame {}", path.display()),
            Err(e) => warn!(target: "debug", "cannot save frame {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgb;

    #[test]
    fn test_bgra_to_rgba() {
        let mut cap = Capture::solid(2, 1, Rgb(10, 20, 30));
        cap.put(1, 0, Rgb(200, 0, 5));
        let img = FrameDumper::to_image(&cap);
        assert_eq!(img.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert_eq!(img.get_pixel(1, 0), &Rgba([200, 0, 5, 255]));
    }

    #[test]
    fn test_dump_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let dumper = FrameDumper::new(dir.path()).unwrap();
        dumper.dump(&Capture::solid(4, 4, Rgb(1, 2, 3)), "frame");
        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }
}
