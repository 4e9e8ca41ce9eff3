use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A key the input backends know how to press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// F1..=F15
    F(u8),
    /// Top-row digit 0..=9
    Digit(u8),
    /// Uppercase ASCII letter
    Letter(char),
    Space,
    Tab,
    Enter,
    Escape,
}

impl FromStr for Key {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ConfigError::UnknownKey(s.to_string());
        let name = s.trim().to_ascii_uppercase();

        match name.as_str() {
            "SPACE" => return Ok(Key::Space),
            "TAB" => return Ok(Key::Tab),
            "ENTER" | "RETURN" => return Ok(Key::Enter),
            "ESC" | "ESCAPE" => return Ok(Key::Escape),
            _ => {}
        }

        let mut chars = name.chars();
        match (chars.next(), chars.as_str()) {
            (Some(c), "") if c.is_ascii_digit() => Ok(Key::Digit(c as u8 - b'0')),
            (Some(c), "") if c.is_ascii_alphabetic() => Ok(Key::Letter(c)),
            (Some('F'), rest) if !rest.is_empty() => match rest.parse::<u8>() {
                Ok(n @ 1..=15) => Ok(Key::F(n)),
                _ => Err(unknown()),
            },
            _ => Err(unknown()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::F(n) => write!(f, "F{}", n),
            Key::Digit(d) => write!(f, "{}", d),
            Key::Letter(c) => write!(f, "{}", c),
            Key::Space => f.write_str("SPACE"),
            Key::Tab => f.write_str("TAB"),
            Key::Enter => f.write_str("ENTER"),
            Key::Escape => f.write_str("ESC"),
        }
    }
}

/// Validate a key name for a setter. An empty string means "unconfigured"
/// and is accepted as-is.
pub fn validate(key: &str) -> Result<String, ConfigError> {
    let key = key.trim();
    if key.is_empty() {
        return Ok(String::new());
    }
    key.parse::<Key>().map(|k| k.to_string())
}
