use std::fmt;
use enumflags2::{bitflags, BitFlags};

use crate::device::constants::LED_COUNT;

const LED_OFF_CHARACTERS: [char; 2] = [' ', '0'];
const ROW_LEN: usize = 9;

/// Options for [`crate::device::session::ConnectionSession::display_led_matrix`]. The ordinals
/// are part of the public contract and must not change.
#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DisplayOption {
    WithFadeTransition = 0b01,
    WithoutWriteResponse = 0b10,
}

pub type DisplayOptions = BitFlags<DisplayOption>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixKind {
    Custom,
    Builtin(u32),
}

/// 9x9 LED grid in row-major order.
#[derive(Clone, PartialEq, Eq)]
pub struct LedMatrix {
    leds: [bool; LED_COUNT],
    kind: MatrixKind,
}

impl LedMatrix {
    pub fn new() -> Self {
        LedMatrix {
            leds: [false; LED_COUNT],
            kind: MatrixKind::Custom,
        }
    }

    pub fn from_leds(leds: [bool; LED_COUNT]) -> Self {
        LedMatrix { leds, kind: MatrixKind::Custom }
    }

    /// Builds a matrix from a text pattern. Every character except `' '` and `'0'` turns an LED
    /// on. Only the first 81 characters are used; shorter patterns leave the remaining LEDs off.
    ///
    /// ```
    /// use nuimo_driver::device::matrix::LedMatrix;
    ///
    /// let matrix = LedMatrix::from_pattern("*   *");
    /// assert!(matrix.is_on(0));
    /// assert!(!matrix.is_on(1));
    /// assert!(matrix.is_on(4));
    /// ```
    pub fn from_pattern(pattern: &str) -> Self {
        let mut leds = [false; LED_COUNT];
        for (led, c) in leds.iter_mut().zip(pattern.chars()) {
            *led = !LED_OFF_CHARACTERS.contains(&c);
        }

        LedMatrix::from_leds(leds)
    }

    /// One of the matrices stored in the device firmware. Bit `i` of `id` ends up in LED `i`.
    pub fn builtin(id: u32) -> Self {
        let mut leds = [false; LED_COUNT];
        for (i, led) in leds.iter_mut().take(u32::BITS as usize).enumerate() {
            *led = id & (1 << i) != 0;
        }

        LedMatrix { leds, kind: MatrixKind::Builtin(id) }
    }

    pub fn busy() -> Self {
        LedMatrix::builtin(1)
    }

    pub fn leds(&self) -> &[bool; LED_COUNT] {
        &self.leds
    }

    pub fn is_on(&self, index: usize) -> bool {
        self.leds.get(index).copied().unwrap_or(false)
    }

    pub fn kind(&self) -> MatrixKind {
        self.kind
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.kind, MatrixKind::Builtin(_))
    }
}

impl Default for LedMatrix {
    fn default() -> Self {
        LedMatrix::new()
    }
}

impl fmt::Debug for LedMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedMatrix({:?})\n{}", self.kind, self)
    }
}

impl fmt::Display for LedMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row_index, row) in self.leds.chunks(ROW_LEN).enumerate() {
            if row_index > 0 {
                writeln!(f)?;
            }
            for led in row {
                write!(f, "{}", if *led { '*' } else { '.' })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_all_off() {
        let matrix = LedMatrix::default();
        assert!(matrix.leds().iter().all(|led| !led));
        assert_eq!(matrix.kind(), MatrixKind::Custom);
    }

    #[test]
    fn test_pattern_off_characters() {
        let matrix = LedMatrix::from_pattern("0 x*1");
        assert!(!matrix.is_on(0));
        assert!(!matrix.is_on(1));
        assert!(matrix.is_on(2));
        assert!(matrix.is_on(3));
        assert!(matrix.is_on(4));
        assert!(!matrix.is_on(5));
    }

    #[test]
    fn test_pattern_is_truncated() {
        let pattern = "*".repeat(100);
        let matrix = LedMatrix::from_pattern(&pattern);
        assert!(matrix.leds().iter().all(|led| *led));
        assert!(!matrix.is_on(81));
    }

    #[test]
    fn test_builtin_bitmask() {
        let matrix = LedMatrix::builtin(0b101);
        assert!(matrix.is_on(0));
        assert!(!matrix.is_on(1));
        assert!(matrix.is_on(2));
        assert_eq!(matrix.leds().iter().filter(|led| **led).count(), 2);
        assert!(matrix.is_builtin());
        assert_eq!(LedMatrix::busy().kind(), MatrixKind::Builtin(1));
    }

    #[test]
    fn test_display_grid() {
        let matrix = LedMatrix::from_pattern("*");
        let rendered = matrix.to_string();
        let rows: Vec<&str> = rendered.lines().collect();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0], "*........");
        assert_eq!(rows[8], ".........");
    }

    #[test]
    fn test_display_option_ordinals() {
        assert_eq!(DisplayOptions::from(DisplayOption::WithFadeTransition).bits(), 1);
        assert_eq!(DisplayOptions::from(DisplayOption::WithoutWriteResponse).bits(), 2);
        let both = DisplayOption::WithFadeTransition | DisplayOption::WithoutWriteResponse;
        assert_eq!(both.bits(), 3);
    }
}
