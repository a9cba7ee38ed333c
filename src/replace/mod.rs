pub mod fifo;
pub mod lru;

use std::fmt::Debug;

use crate::{cache::Line, config::Policy};

/// Why a line is being touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    Hit,
    Fill,
}

/// A replacement policy: bookkeeping kept in each line plus victim choice.
///
/// The store never reads the clock itself; every stamp arrives through
/// [`Replace::on_access`].
pub trait Replace {
    type LineData: Debug + Default + Clone;

    fn policy(&self) -> Policy;

    /// Called on every hit and every fill of `set[way]`.
    fn on_access(&self, set: &mut [Line<Self::LineData>], way: usize, touch: Touch, clock: u64);

    /// Picks the way to evict. Only called when every line in `set` is valid.
    fn select_victim(&self, set: &[Line<Self::LineData>]) -> usize;

    /// The ordering stamp this policy compares, for reporting.
    fn stamp(data: &Self::LineData) -> u64;
}

/// Way with the smallest key, the lowest way winning ties.
fn oldest_way<B: Default>(set: &[Line<B>], key: impl Fn(&B) -> u64) -> usize {
    (1..set.len()).fold(0, |oldest, way| {
        if key(&set[way].repl_block) < key(&set[oldest].repl_block) {
            way
        } else {
            oldest
        }
    })
}
