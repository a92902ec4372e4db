//! Bit-pattern formatting for trace logs

use std::fmt;

/// Displays the low `width` bits of a value, most significant first
///
/// `Bits::new(0b0110, 4)` prints `0110`. Used when tracing quadrature
/// transitions; never called from the real-time path.
#[derive(Debug, Clone, Copy)]
pub struct Bits {
    value: u32,
    width: u8,
}

impl Bits {
    pub fn new(value: u32, width: u8) -> Self {
        Self {
            value,
            width: width.min(32),
        }
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in (0..self.width).rev() {
            let set = (self.value >> bit) & 1 == 1;
            f.write_str(if set { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_pads_to_width() {
        assert_eq!(Bits::new(0b0110, 4).to_string(), "0110");
        assert_eq!(Bits::new(0b1, 2).to_string(), "01");
        assert_eq!(Bits::new(0xFF, 0).to_string(), "");
    }

    #[test]
    fn test_bits_truncates_high_bits() {
        assert_eq!(Bits::new(0b1_1101, 4).to_string(), "1101");
    }
}
