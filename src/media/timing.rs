// SPDX-License-Identifier: GPL-3.0-only

//! Frame timing passed from sources to the encoder

use crate::constants::DEFAULT_TIMESCALE;

/// Rational media time (`value / timescale` seconds)
///
/// The pipeline treats these as opaque: they travel from the frame source to
/// the encoder unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: i32,
}

impl MediaTime {
    pub const fn new(value: i64, timescale: i32) -> Self {
        Self { value, timescale }
    }

    /// Time expressed in the default (millisecond) timescale
    pub const fn from_millis(value: i64) -> Self {
        Self::new(value, DEFAULT_TIMESCALE)
    }

    /// Seconds as floating point, `None` for an invalid timescale
    pub fn as_secs_f64(&self) -> Option<f64> {
        if self.timescale <= 0 {
            return None;
        }
        Some(self.value as f64 / self.timescale as f64)
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::from_millis(0)
    }
}

impl std::fmt::Display for MediaTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.value, self.timescale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds() {
        assert_eq!(MediaTime::from_millis(1500).as_secs_f64(), Some(1.5));
        assert_eq!(MediaTime::new(1, 0).as_secs_f64(), None);
    }
}
