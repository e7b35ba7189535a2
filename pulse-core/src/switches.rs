//! Configuration switch bank decoding.
//!
//! Boards wire the duration switches to whatever port pins were free, so the
//! raw port image is reassembled into a logical value through a
//! [`SwitchMap`]. Banks with pull-ups read a closed switch as 0 V, which the
//! [`SwitchPolarity::ActiveLow`] setting turns back into a logical 1.
//!
//! Reading is side-effect free and takes `&self`, so it is safe from both the
//! main loop and interrupt handlers.

use core::fmt;

use crate::hal::SwitchBank;

pub use crate::hal::Polarity as SwitchPolarity;

/// Widest bank a [`DurationSetting`] can represent.
pub const MAX_SWITCH_WIDTH: usize = 8;

/// Highest raw bit position a [`SwitchBank`] can report.
pub const MAX_RAW_POSITION: u8 = 31;

/// Pulse length in duration units, as set on the switch bank.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DurationSetting(u8);

impl DurationSetting {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(u8::MAX);

    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Largest setting a bank of `width` switches can produce.
    #[must_use]
    pub const fn max_for_width(width: usize) -> Self {
        if width >= MAX_SWITCH_WIDTH {
            Self::MAX
        } else {
            Self(((1u16 << width) - 1) as u8)
        }
    }
}

/// Reasons a switch permutation is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchMapError {
    /// More switches than a [`DurationSetting`] can hold.
    TooWide { width: usize },
    /// A logical bit points past the raw port image.
    PositionOutOfRange { bit: usize, position: u8 },
    /// Two logical bits read the same raw pin.
    DuplicatePosition { position: u8 },
}

impl fmt::Display for SwitchMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchMapError::TooWide { width } => {
                write!(f, "{width} switches exceed the {MAX_SWITCH_WIDTH}-bit setting")
            }
            SwitchMapError::PositionOutOfRange { bit, position } => write!(
                f,
                "switch bit {bit} maps to raw bit {position}, past {MAX_RAW_POSITION}"
            ),
            SwitchMapError::DuplicatePosition { position } => {
                write!(f, "raw bit {position} is mapped twice")
            }
        }
    }
}

/// Permutation from raw port bits to logical setting bits.
///
/// Logical bit `i` of the setting is read from raw bit `positions[i]`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SwitchMap<const N: usize> {
    positions: [u8; N],
}

impl<const N: usize> SwitchMap<N> {
    /// Validates a permutation.
    ///
    /// # Errors
    ///
    /// Rejects maps wider than eight switches, positions past bit 31, and
    /// positions used twice.
    pub const fn new(positions: [u8; N]) -> Result<Self, SwitchMapError> {
        if N > MAX_SWITCH_WIDTH {
            return Err(SwitchMapError::TooWide { width: N });
        }

        let mut seen: u32 = 0;
        let mut bit = 0;
        while bit < N {
            let position = positions[bit];
            if position > MAX_RAW_POSITION {
                return Err(SwitchMapError::PositionOutOfRange { bit, position });
            }
            let mask = 1u32 << position;
            if seen & mask != 0 {
                return Err(SwitchMapError::DuplicatePosition { position });
            }
            seen |= mask;
            bit += 1;
        }

        Ok(Self { positions })
    }

    /// Map for a bank wired to raw bits `0..N` in order.
    ///
    /// # Panics
    ///
    /// Panics (at compile time in `const` context) when `N` exceeds eight.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn identity() -> Self {
        assert!(N <= MAX_SWITCH_WIDTH, "switch bank wider than a setting");
        let mut positions = [0u8; N];
        let mut bit = 0;
        while bit < N {
            positions[bit] = bit as u8;
            bit += 1;
        }
        Self { positions }
    }

    /// Number of switches in the bank.
    #[must_use]
    pub const fn width(&self) -> usize {
        N
    }

    /// Raw bits the map reads.
    #[must_use]
    pub const fn raw_mask(&self) -> u32 {
        let mut mask = 0u32;
        let mut bit = 0;
        while bit < N {
            mask |= 1u32 << self.positions[bit];
            bit += 1;
        }
        mask
    }

    /// Raw bit read for logical bit `bit`, if the bank has one.
    #[must_use]
    pub fn position(&self, bit: usize) -> Option<u8> {
        self.positions.get(bit).copied()
    }

    /// Gathers the mapped raw bits into a setting value.
    #[must_use]
    pub fn assemble(&self, raw: u32) -> u8 {
        self.positions
            .iter()
            .enumerate()
            .fold(0u8, |value, (bit, &position)| {
                if (raw >> position) & 1 == 0 {
                    value
                } else {
                    value | (1u8 << bit)
                }
            })
    }
}

/// Source of the current duration setting.
pub trait SettingSource {
    /// Samples the switches now.
    fn read_configuration(&self) -> DurationSetting;
}

/// Decodes a [`SwitchBank`] through a permutation and polarity.
pub struct ConfigurationReader<S, const N: usize> {
    bank: S,
    map: SwitchMap<N>,
    polarity: SwitchPolarity,
}

impl<S, const N: usize> ConfigurationReader<S, N> {
    #[must_use]
    pub const fn new(bank: S, map: SwitchMap<N>, polarity: SwitchPolarity) -> Self {
        Self {
            bank,
            map,
            polarity,
        }
    }

    #[must_use]
    pub const fn map(&self) -> &SwitchMap<N> {
        &self.map
    }

    #[must_use]
    pub const fn polarity(&self) -> SwitchPolarity {
        self.polarity
    }

    #[must_use]
    pub const fn bank(&self) -> &S {
        &self.bank
    }

    /// Consumes the reader and returns the wrapped bank.
    #[must_use]
    pub fn into_bank(self) -> S {
        self.bank
    }
}

impl<S: SwitchBank, const N: usize> SettingSource for ConfigurationReader<S, N> {
    fn read_configuration(&self) -> DurationSetting {
        let raw = self.bank.read_raw();
        let image = match self.polarity {
            SwitchPolarity::ActiveHigh => raw,
            SwitchPolarity::ActiveLow => !raw,
        };
        DurationSetting(self.map.assemble(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBank(u32);

    impl SwitchBank for FixedBank {
        fn read_raw(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn identity_active_low_inverts_the_port() {
        let reader = ConfigurationReader::new(
            FixedBank(0xFFFF_FF00 | 0b1111_1010),
            SwitchMap::<8>::identity(),
            SwitchPolarity::ActiveLow,
        );
        assert_eq!(reader.read_configuration(), DurationSetting::new(0b0000_0101));
    }

    #[test]
    fn permutation_reassembles_two_ports() {
        // Low nibble on port A bits 8..=11, high nibble on port B bits 20..=23.
        let map = SwitchMap::new([8, 9, 10, 11, 20, 21, 22, 23]).expect("valid map");
        let raw = (0b1001 << 8) | (0b0110 << 20);
        let reader = ConfigurationReader::new(FixedBank(raw), map, SwitchPolarity::ActiveHigh);

        assert_eq!(reader.read_configuration(), DurationSetting::new(0b0110_1001));
        assert_eq!(map.raw_mask(), 0x00F0_0F00);
    }

    #[test]
    fn unmapped_bits_never_leak_into_the_setting() {
        let map = SwitchMap::new([3, 1]).expect("valid map");
        assert_eq!(map.assemble(!0b1010), 0);
        assert_eq!(map.assemble(0b1000), 0b01);
        assert_eq!(map.assemble(0b0010), 0b10);
    }

    #[test]
    fn invalid_maps_are_rejected() {
        assert_eq!(
            SwitchMap::new([0, 32]),
            Err(SwitchMapError::PositionOutOfRange {
                bit: 1,
                position: 32
            })
        );
        assert_eq!(
            SwitchMap::new([4, 5, 4]),
            Err(SwitchMapError::DuplicatePosition { position: 4 })
        );
        assert_eq!(
            SwitchMap::new([0u8; 9]),
            Err(SwitchMapError::TooWide { width: 9 })
        );
    }

    #[test]
    fn narrow_banks_report_their_domain() {
        assert_eq!(DurationSetting::max_for_width(4), DurationSetting::new(15));
        assert_eq!(DurationSetting::max_for_width(8), DurationSetting::MAX);
        assert_eq!(DurationSetting::max_for_width(0), DurationSetting::MIN);
    }
}
