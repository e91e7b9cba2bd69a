//! Console number ("Wii Number") checksum validation.
//!
//! A console number is a 16-digit decimal rendering of a scrambled 53-bit
//! value. Unscrambled, the value packs the region, model, hardware
//! ("Hollywood") id and a counter, followed by a 10-bit CRC over the rest.
//!
//! ```text
//!  52  50 49 47 46              15 14    10 9        0
//! +------+-----+-----------------+--------+----------+
//! | area |model|   hollywood id  |counter |   crc    |
//! +------+-----+-----------------+--------+----------+
//! ```

/// Hollywood id reported by the Dolphin emulator. Never a real console.
pub const DEFAULT_HOLLYWOOD_ID: u32 = 0x0403_AC68;

/// Largest value that still renders as at most 16 decimal digits.
const MAX_NUMBER: u64 = 9_999_999_999_999_999;

const MASK_53: u64 = (1 << 53) - 1;
const CRC_MASK: u64 = 0x3ff;
const CRC_POLY: u64 = 0x635;
const INNER_XOR: u64 = 0xB3B3_B3B3_B3B3;
const OUTER_XOR: u64 = 0x5E5E_5E5E_5E5E;

const NIBBLE_TABLE: [u8; 16] = [
    0x4, 0xB, 0x7, 0x9, 0xF, 0x1, 0xD, 0x3, 0xC, 0x2, 0x6, 0xE, 0x8, 0x0, 0xA, 0x5,
];
const BYTE_ORDER: [usize; 6] = [1, 5, 0, 4, 2, 3];

fn get_byte(value: u64, index: usize) -> u8 {
    (value >> (index * 8)) as u8
}

fn set_byte(value: u64, index: usize, byte: u8) -> u64 {
    (value & !(0xff << (index * 8))) | (u64::from(byte) << (index * 8))
}

fn inverse_nibble(nibble: u8) -> u8 {
    NIBBLE_TABLE
        .iter()
        .position(|&n| n == nibble)
        .map(|p| p as u8)
        .unwrap_or(0)
}

/// 10-bit CRC over bits 10..53 of an unscrambled value.
fn crc(mut mix: u64) -> u64 {
    for c in 0..=42 {
        if (mix >> (52 - c)) & 1 == 1 {
            mix ^= CRC_POLY << (42 - c);
        }
    }
    mix & CRC_MASK
}

/// A decoded console number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WiiNumber {
    number: u64,
}

impl WiiNumber {
    /// Wrap a raw console number.
    pub fn new(number: u64) -> Self {
        Self { number }
    }

    /// Build the console number for the given hardware fields.
    pub fn make(hollywood_id: u32, counter: u8, model: u8, area: u8) -> Self {
        let mut mix = (u64::from(area & 0x7) << 50)
            | (u64::from(model & 0x7) << 47)
            | (u64::from(hollywood_id) << 15)
            | (u64::from(counter & 0x1f) << 10);
        mix |= crc(mix);

        mix ^= INNER_XOR;
        mix = (mix >> 10) | ((mix & CRC_MASK) << 43);

        for i in 0..6 {
            let b = get_byte(mix, i);
            let substituted =
                (NIBBLE_TABLE[(b >> 4) as usize] << 4) | NIBBLE_TABLE[(b & 0xf) as usize];
            mix = set_byte(mix, i, substituted);
        }

        let copy = mix;
        for (i, &target) in BYTE_ORDER.iter().enumerate() {
            mix = set_byte(mix, target, get_byte(copy, i));
        }

        mix &= MASK_53;
        mix = ((mix << 1) | ((mix >> 52) & 1)) & MASK_53;
        mix ^= OUTER_XOR;

        Self::new(mix & MASK_53)
    }

    /// The raw console number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Reverse the scrambling, yielding the packed hardware fields and CRC.
    pub fn unscramble(&self) -> u64 {
        let mut mix = self.number & MASK_53;
        mix ^= OUTER_XOR;
        mix = (mix >> 1) | ((mix & 1) << 52);

        let copy = mix;
        for (i, &source) in BYTE_ORDER.iter().enumerate() {
            mix = set_byte(mix, i, get_byte(copy, source));
        }

        for i in 0..6 {
            let b = get_byte(mix, i);
            let restored = (inverse_nibble(b >> 4) << 4) | inverse_nibble(b & 0xf);
            mix = set_byte(mix, i, restored);
        }

        mix = ((mix << 10) & MASK_53) | ((mix >> 43) & CRC_MASK);
        mix ^ INNER_XOR
    }

    /// Whether the embedded CRC matches.
    pub fn is_valid(&self) -> bool {
        if self.number > MAX_NUMBER {
            return false;
        }
        let mix = self.unscramble();
        crc(mix & !CRC_MASK) == mix & CRC_MASK
    }

    /// The embedded hardware id.
    pub fn hollywood_id(&self) -> u32 {
        ((self.unscramble() >> 15) & 0xffff_ffff) as u32
    }
}

/// Validate the digits of a console number (without the `w` prefix).
///
/// Accepts exactly 16 ASCII digits whose embedded CRC matches and whose
/// hardware id is not the emulator default.
pub fn validate_friend_code(digits: &str) -> bool {
    if digits.len() != 16 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let Ok(number) = digits.parse::<u64>() else {
        return false;
    };

    let wii_number = WiiNumber::new(number);
    wii_number.is_valid() && wii_number.hollywood_id() != DEFAULT_HOLLYWOOD_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_numbers() {
        for (digits, hollywood) in [
            ("6382198605942757", 0x1234_5678),
            ("2649255872877667", 0xDEAD_BEEF),
            ("3493126007086621", 0x00AB_CDEF),
            ("7044601513185031", 0x2020_2020),
        ] {
            assert!(validate_friend_code(digits), "{digits} should be valid");
            let number = WiiNumber::new(digits.parse().unwrap());
            assert_eq!(number.hollywood_id(), hollywood);
        }
    }

    #[test]
    fn test_make_matches_known_numbers() {
        assert_eq!(WiiNumber::make(0x1234_5678, 0, 1, 1).number(), 6382198605942757);
        assert_eq!(WiiNumber::make(0xDEAD_BEEF, 3, 1, 2).number(), 2649255872877667);
        assert_eq!(WiiNumber::make(0x00AB_CDEF, 1, 1, 0).number(), 3493126007086621);
    }

    #[test]
    fn test_unscramble_inverts_make() {
        let number = WiiNumber::make(0xCAFE_F00D, 7, 1, 3);
        assert!(number.is_valid());
        assert_eq!(number.hollywood_id(), 0xCAFE_F00D);
        let mix = number.unscramble();
        assert_eq!((mix >> 10) & 0x1f, 7);
        assert_eq!((mix >> 47) & 0x7, 1);
        assert_eq!((mix >> 50) & 0x7, 3);
    }

    #[test]
    fn test_rejects_emulator_default() {
        let digits = "6168191425252890";
        let number = WiiNumber::new(digits.parse().unwrap());
        assert!(number.is_valid());
        assert_eq!(number.hollywood_id(), DEFAULT_HOLLYWOOD_ID);
        assert!(!validate_friend_code(digits));
    }

    #[test]
    fn test_rejects_bad_checksum() {
        assert!(!validate_friend_code("1234567890123456"));
    }

    #[test]
    fn test_single_digit_mutations_rejected() {
        let digits = "6382198605942757";
        for i in 0..digits.len() {
            for d in b'0'..=b'9' {
                let mut mutated = digits.as_bytes().to_vec();
                if mutated[i] == d {
                    continue;
                }
                mutated[i] = d;
                let mutated = String::from_utf8(mutated).unwrap();
                assert!(!validate_friend_code(&mutated), "{mutated} accepted");
            }
        }
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(!validate_friend_code(""));
        assert!(!validate_friend_code("638219860594275"));
        assert!(!validate_friend_code("63821986059427570"));
        assert!(!validate_friend_code("638219860594275a"));
        assert!(!validate_friend_code("+382198605942757"));
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(!WiiNumber::new(MAX_NUMBER + 1).is_valid());
    }
}
