use crate::{cache::Line, config::Policy};

use super::{oldest_way, Replace, Touch};

/// Least recently used: hits and fills both refresh the line.
#[derive(Debug, Default)]
pub struct Lru {}

impl Lru {
    pub fn new() -> Self {
        Lru {}
    }
}

#[derive(Debug, Default, Clone)]
pub struct LruLineData {
    last_used: u64,
}

impl Replace for Lru {
    type LineData = LruLineData;

    fn policy(&self) -> Policy {
        Policy::Lru
    }

    fn on_access(&self, set: &mut [Line<LruLineData>], way: usize, _touch: Touch, clock: u64) {
        // only the touched way moves, siblings keep their stamps
        set[way].repl_block.last_used = clock;
    }

    fn select_victim(&self, set: &[Line<LruLineData>]) -> usize {
        oldest_way(set, |data| data.last_used)
    }

    fn stamp(data: &LruLineData) -> u64 {
        data.last_used
    }
}
