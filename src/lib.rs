//! Single-level cache mapping and replacement engine.
//!
//! Addresses are split into tag, index and offset fields, looked up in a
//! direct-mapped or set-associative store and, on a miss into a full set,
//! a victim is picked by the configured replacement policy (LRU or FIFO).

pub mod addr;
pub mod cache;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod replace;
pub mod trace;

pub use addr::{decompose, Addr};
pub use config::{CacheConfig, Policy};
pub use controller::{configure, AccessResult, Controller, Outcome};
pub use error::{AddressError, ConfigError, SimError};
