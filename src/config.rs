use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{addr::exact_log2, error::ConfigError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", rename_all = "UPPERCASE")]
pub enum Policy {
    #[default]
    Lru,
    Fifo,
}

impl FromStr for Policy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.eq_ignore_ascii_case("lru") {
            Ok(Policy::Lru)
        } else if name.eq_ignore_ascii_case("fifo") {
            Ok(Policy::Fifo)
        } else {
            Err(ConfigError::UnknownPolicy(s.to_owned()))
        }
    }
}

impl TryFrom<String> for Policy {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Lru => f.write_str("LRU"),
            Policy::Fifo => f.write_str("FIFO"),
        }
    }
}

/// Largest number of lines a cache may hold; every line is allocated up front.
pub const MAX_LINES: u64 = 1 << 24;

fn default_associativity() -> u64 {
    1
}

fn default_address_bits() -> u32 {
    32
}

/// Cache shape as read from JSON or the command line. Sizes are in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub cache_size: u64,
    pub block_size: u64,
    #[serde(default = "default_associativity")]
    pub associativity: u64,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default = "default_address_bits")]
    pub address_bits: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            cache_size: 64,
            block_size: 16,
            associativity: default_associativity(),
            policy: Policy::default(),
            address_bits: default_address_bits(),
        }
    }
}

/// Field widths and set count derived from a valid [`CacheConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub n_sets: u64,
    pub offset_bits: u32,
    pub index_bits: u32,
    pub tag_bits: u32,
}

impl CacheConfig {
    pub fn new(cache_size: u64, block_size: u64, associativity: u64, policy: Policy) -> Self {
        CacheConfig {
            cache_size,
            block_size,
            associativity,
            policy,
            address_bits: default_address_bits(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn validate(&self) -> Result<Geometry, ConfigError> {
        if self.cache_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "cache size",
            });
        }
        let offset_bits = exact_log2("block size", self.block_size)?;
        exact_log2("associativity", self.associativity)?;

        let indivisible = ConfigError::Indivisible {
            cache_size: self.cache_size,
            block_size: self.block_size,
            associativity: self.associativity,
        };
        let set_bytes = match self.block_size.checked_mul(self.associativity) {
            Some(bytes) if self.cache_size % bytes == 0 => bytes,
            _ => return Err(indivisible),
        };
        let lines = self.cache_size / self.block_size;
        if lines > MAX_LINES {
            return Err(ConfigError::TooManyLines {
                lines,
                max: MAX_LINES,
            });
        }
        let n_sets = self.cache_size / set_bytes;
        let index_bits = exact_log2("set count", n_sets)?;

        if !(1..=64).contains(&self.address_bits) {
            return Err(ConfigError::AddressWidth(self.address_bits));
        }
        let needed = offset_bits + index_bits;
        if needed > self.address_bits {
            return Err(ConfigError::AddressTooNarrow {
                bits: self.address_bits,
                needed,
            });
        }

        Ok(Geometry {
            n_sets,
            offset_bits,
            index_bits,
            tag_bits: self.address_bits - needed,
        })
    }
}
