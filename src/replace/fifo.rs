use crate::{cache::Line, config::Policy};

use super::{oldest_way, Replace, Touch};

/// First in, first out: the stamp is taken at fill time and hits never move it.
#[derive(Debug, Default)]
pub struct Fifo {}

impl Fifo {
    pub fn new() -> Self {
        Fifo {}
    }
}

#[derive(Debug, Default, Clone)]
pub struct FifoLineData {
    inserted: u64,
}

impl Replace for Fifo {
    type LineData = FifoLineData;

    fn policy(&self) -> Policy {
        Policy::Fifo
    }

    fn on_access(&self, set: &mut [Line<FifoLineData>], way: usize, touch: Touch, clock: u64) {
        if touch == Touch::Fill {
            set[way].repl_block.inserted = clock;
        }
    }

    fn select_victim(&self, set: &[Line<FifoLineData>]) -> usize {
        oldest_way(set, |data| data.inserted)
    }

    fn stamp(data: &FifoLineData) -> u64 {
        data.inserted
    }
}
