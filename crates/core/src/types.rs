use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of watch regions owned by the vitality monitor.
pub const REGION_COUNT: usize = 8;

/// Number of cast slots owned by the interval caster.
pub const SLOT_COUNT: usize = 10;

/// A screen point in absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Screen rectangle `(x1, y1)`-`(x2, y2)`, always normalized so that
/// `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CoordsRepr", into = "[i32; 4]")]
pub struct Rect {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl Rect {
    /// Build a rectangle from two corners in any order. Zero-area
    /// rectangles are rejected.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self, ConfigError> {
        let rect = Rect {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        };
        if rect.width() == 0 || rect.height() == 0 {
            return Err(ConfigError::EmptyRect(rect.coords()));
        }
        Ok(rect)
    }

    pub fn x1(&self) -> i32 { self.x1 }
    pub fn y1(&self) -> i32 { self.y1 }
    pub fn x2(&self) -> i32 { self.x2 }
    pub fn y2(&self) -> i32 { self.y2 }

    pub fn width(&self) -> u32 {
        self.x2.abs_diff(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.abs_diff(self.y1)
    }

    pub fn coords(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn center(&self) -> Point {
        let mid = |a: i32, b: i32| ((i64::from(a) + i64::from(b)) / 2) as i32;
        Point {
            x: mid(self.x1, self.x2),
            y: mid(self.y1, self.y2),
        }
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Union of all rectangles, `None` for an empty iterator.
    pub fn bounding<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
        rects.into_iter().fold(None, |acc, r| match acc {
            None => Some(*r),
            Some(u) => Some(u.union(r)),
        })
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})-({},{})", self.x1, self.y1, self.x2, self.y2)
    }
}

fn coords_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\[?\s*(-?\d+)\s*,\s*(-?\d+)\s*,\s*(-?\d+)\s*,\s*(-?\d+)\s*\]?\s*$")
            .expect("static regex")
    })
}

/// Accepts `x1,y1,x2,y2` with optional surrounding brackets, e.g.
/// `[10, 20, 110, 30]`.
impl FromStr for Rect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = coords_re()
            .captures(s)
            .ok_or_else(|| ConfigError::MalformedCoords(s.to_string()))?;
        let mut c = [0i32; 4];
        for (i, slot) in c.iter_mut().enumerate() {
            *slot = caps[i + 1]
                .parse()
                .map_err(|_| ConfigError::MalformedCoords(s.to_string()))?;
        }
        Rect::new(c[0], c[1], c[2], c[3])
    }
}

/// Coordinates as stored on disk: either an array or the bracketed string
/// form older settings files used.
#[derive(Deserialize)]
#[serde(untagged)]
enum CoordsRepr {
    Array([i32; 4]),
    Text(String),
}

impl TryFrom<CoordsRepr> for Rect {
    type Error = ConfigError;

    fn try_from(repr: CoordsRepr) -> Result<Self, Self::Error> {
        match repr {
            CoordsRepr::Array([x1, y1, x2, y2]) => Rect::new(x1, y1, x2, y2),
            CoordsRepr::Text(s) => s.parse(),
        }
    }
}

impl From<Rect> for [i32; 4] {
    fn from(r: Rect) -> Self {
        r.coords()
    }
}

/// An RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Raw screenshot pixel data (BGRA)
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl Capture {
    /// Build a tightly packed capture filled with one color.
    pub fn solid(width: u32, height: u32, color: Rgb) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&[color.2, color.1, color.0, 255]);
        }
        Capture { data, width, height, bytes_per_row: width * 4 }
    }

    /// Overwrite one pixel. Out-of-range coordinates are ignored.
    pub fn put(&mut self, x: u32, y: u32, color: Rgb) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y * self.bytes_per_row + x * 4) as usize;
        if let Some(px) = self.data.get_mut(idx..idx + 4) {
            px.copy_from_slice(&[color.2, color.1, color.0, 255]);
        }
    }
}

/// Lifecycle of the controller as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
    Stopping,
}

/// Command from TUI to orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartStop,
    ToggleRegion(usize),
    SetRegionBounds(usize, String),
    ClearRegionBounds(usize),
    ToggleSlot(usize),
    SetSlotKey(usize, String),
    SetSlotInterval(usize, String),
    ResetSlot(usize),
    ToggleHeal,
    ToggleMassHeal,
    ToggleParty,
    ToggleBuffs,
    AdjustHealThreshold(i32),
    AdjustMassThreshold(i32),
    SetHealKey(String),
    SetMassHealKey(String),
    Save,
    Reload,
    Quit,
}
