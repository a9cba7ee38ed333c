use std::io;

use thiserror::Error;

/// Rejected cache geometry or policy. No cache is built when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },
    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo { field: &'static str, value: u64 },
    #[error("cache size {cache_size} is not a multiple of block size {block_size} x associativity {associativity}")]
    Indivisible {
        cache_size: u64,
        block_size: u64,
        associativity: u64,
    },
    #[error("{lines} cache lines exceeds the supported maximum of {max}")]
    TooManyLines { lines: u64, max: u64 },
    #[error("unknown replacement policy `{0}` (expected LRU or FIFO)")]
    UnknownPolicy(String),
    #[error("address width of {bits} bits cannot hold {needed} offset and index bits")]
    AddressTooNarrow { bits: u32, needed: u32 },
    #[error("address width of {0} bits is not supported (1..=64)")]
    AddressWidth(u32),
}

/// Address rejected before decomposition; engine state is untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address `{0}` is negative")]
    Negative(String),
    #[error("address `{0}` is not a decimal or 0x-prefixed hex number")]
    Malformed(String),
    #[error("address {address} does not fit in {bits} bits")]
    OutOfRange { address: String, bits: u32 },
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error(transparent)]
    Args(#[from] pico_args::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}
