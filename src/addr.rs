use std::ops::Not;

use serde::Serialize;

use crate::error::ConfigError;

/// An address split into its cache fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Addr {
    pub tag: u64,
    #[serde(rename = "index")]
    pub set: usize,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy)]
struct BitSection {
    shift: u32,
    mask: u64,
}

impl BitSection {
    fn apply(&self, num: u64) -> u64 {
        // a shift of 64 leaves nothing above the index bits
        num.checked_shr(self.shift).unwrap_or(0) & self.mask
    }

    fn place(&self, field: u64) -> u64 {
        (field & self.mask).checked_shl(self.shift).unwrap_or(0)
    }
}

/// Precomputed field layout for one block size / set count pair.
#[derive(Debug, Clone)]
pub struct Splitter {
    offset_sec: BitSection,
    set_sec: BitSection,
    tag_sec: BitSection,
}

impl Splitter {
    pub fn new(block_size: u64, n_sets: u64) -> Result<Self, ConfigError> {
        let offset_bits = exact_log2("block size", block_size)?;
        let index_bits = exact_log2("set count", n_sets)?;

        let offset_sec = BitSection {
            shift: 0,
            mask: block_size - 1,
        };
        let set_sec = BitSection {
            shift: offset_bits,
            mask: n_sets - 1,
        };
        let tag_sec = BitSection {
            shift: offset_bits + index_bits,
            mask: 0u64.not(),
        };

        Ok(Splitter {
            offset_sec,
            set_sec,
            tag_sec,
        })
    }

    pub fn split(&self, address: u64) -> Addr {
        Addr {
            tag: self.tag_sec.apply(address),
            set: self.set_sec.apply(address) as usize,
            offset: self.offset_sec.apply(address),
        }
    }

    /// Inverse of [`Splitter::split`] for fields within their widths.
    pub fn compose(&self, addr: &Addr) -> u64 {
        self.tag_sec.place(addr.tag)
            | self.set_sec.place(addr.set as u64)
            | self.offset_sec.place(addr.offset)
    }
}

/// Splits `address` for a cache of `n_sets` sets of `block_size`-byte lines.
///
/// Both divisors must be positive powers of two, since the fields are
/// extracted as bit ranges.
pub fn decompose(address: u64, block_size: u64, n_sets: u64) -> Result<Addr, ConfigError> {
    Ok(Splitter::new(block_size, n_sets)?.split(address))
}

pub(crate) fn exact_log2(field: &'static str, value: u64) -> Result<u32, ConfigError> {
    if value == 0 {
        return Err(ConfigError::NotPositive { field });
    }
    if !value.is_power_of_two() {
        return Err(ConfigError::NotPowerOfTwo { field, value });
    }
    Ok(value.trailing_zeros())
}
