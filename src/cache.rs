use std::{iter, ops::Range};

use serde::Serialize;

use crate::{
    addr::Addr,
    config::Policy,
    replace::{Replace, Touch},
};

#[derive(Debug, Default, Clone)]
pub struct Line<B: Default> {
    pub valid: bool,
    pub tag: u64,

    // Replace Data
    pub repl_block: B,
}

impl<B: Default> Line<B> {
    pub fn apply(&mut self, addr: &Addr) {
        self.valid = true;
        self.tag = addr.tag;
    }
}

/// Read-only view of one line, as handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineSnapshot {
    pub set: usize,
    pub way: usize,
    pub valid: bool,
    pub tag: u64,
    pub stamp: u64,
}

/// Where an insert landed and what it displaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    pub way: usize,
    pub evicted: Option<LineSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub policy: Policy,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub accesses: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub valid_lines: usize,
    pub capacity_lines: usize,
}

/// Sets of `n_ways` lines stored back to back; set `s` owns
/// `blocks[s * n_ways..(s + 1) * n_ways]`.
#[derive(Debug)]
pub struct Cache<R: Replace> {
    pub blocks: Vec<Line<R::LineData>>,
    pub n_ways: usize,
    pub n_sets: usize,
    pub repl: R,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<R: Replace> Cache<R> {
    pub fn new(n_sets: usize, n_ways: usize, repl: R) -> Self {
        assert!(n_ways.is_power_of_two());
        assert!(n_sets.is_power_of_two());

        Cache {
            blocks: iter::repeat_with(Line::default)
                .take(n_sets * n_ways)
                .collect(),
            n_ways,
            n_sets,
            repl,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }
}

fn snapshot<R: Replace>(set: usize, way: usize, line: &Line<R::LineData>) -> LineSnapshot {
    LineSnapshot {
        set,
        way,
        valid: line.valid,
        tag: line.tag,
        stamp: R::stamp(&line.repl_block),
    }
}

/// Object-safe face of a [`Cache`], so the controller can hold any policy.
pub trait IsCache {
    /// Way holding a valid line tagged `addr.tag` in `addr.set`, if any.
    fn lookup(&self, addr: &Addr) -> Option<usize>;
    /// Records a hit on `way` with the policy.
    fn touch(&mut self, set: usize, way: usize, clock: u64);
    /// Places `addr` in its set: first invalid way, else the policy's victim.
    fn insert(&mut self, addr: &Addr, clock: u64) -> Fill;
    fn get_set(&self, set: usize) -> Range<usize>;
    fn set_lines(&self, set: usize) -> Vec<LineSnapshot>;
    fn valid_lines(&self) -> usize;
    fn n_sets(&self) -> usize;
    fn policy(&self) -> Policy;
    fn hit(&mut self);
    fn miss(&mut self);
    /// Invalidates every line and zeroes the counters.
    fn clear(&mut self);
    fn make_stats(&self) -> CacheStats;
}

impl<R: Replace> IsCache for Cache<R> {
    fn lookup(&self, addr: &Addr) -> Option<usize> {
        let set_slice = &self.blocks[self.get_set(addr.set)];
        let mut matches = set_slice
            .iter()
            .enumerate()
            .filter(|(_way, b)| b.valid && b.tag == addr.tag)
            .map(|(way, _b)| way);
        let hit = matches.next();
        assert!(
            matches.next().is_none(),
            "duplicate valid tag {:#x} in set {}",
            addr.tag,
            addr.set
        );
        hit
    }

    fn touch(&mut self, set: usize, way: usize, clock: u64) {
        let set_range = self.get_set(set);
        let set_slice = &mut self.blocks[set_range];
        debug_assert!(set_slice[way].valid);
        self.repl.on_access(set_slice, way, Touch::Hit, clock);
    }

    fn insert(&mut self, addr: &Addr, clock: u64) -> Fill {
        debug_assert!(self.lookup(addr).is_none());
        let set_range = self.get_set(addr.set);
        let set_slice = &mut self.blocks[set_range];

        let (way, evicted) = match set_slice.iter().position(|b| !b.valid) {
            // Empty line, no policy involved
            Some(vacant_way) => (vacant_way, None),
            None => {
                let victim_way = self.repl.select_victim(set_slice);
                let victim = snapshot::<R>(addr.set, victim_way, &set_slice[victim_way]);
                log::trace!(
                    "set {}: evicting tag {:#x} from way {} (stamp {})",
                    addr.set,
                    victim.tag,
                    victim_way,
                    victim.stamp
                );
                self.evictions += 1;
                (victim_way, Some(victim))
            }
        };
        set_slice[way].apply(addr);
        self.repl.on_access(set_slice, way, Touch::Fill, clock);

        Fill { way, evicted }
    }

    fn get_set(&self, set: usize) -> Range<usize> {
        set * self.n_ways..(set + 1) * self.n_ways
    }

    fn set_lines(&self, set: usize) -> Vec<LineSnapshot> {
        self.blocks[self.get_set(set)]
            .iter()
            .enumerate()
            .map(|(way, line)| snapshot::<R>(set, way, line))
            .collect()
    }

    fn valid_lines(&self) -> usize {
        self.blocks.iter().filter(|b| b.valid).count()
    }

    fn n_sets(&self) -> usize {
        self.n_sets
    }

    fn policy(&self) -> Policy {
        self.repl.policy()
    }

    fn hit(&mut self) {
        self.hits += 1;
    }

    fn miss(&mut self) {
        self.misses += 1;
    }

    fn clear(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
        for block in &mut self.blocks {
            *block = Line::default();
        }
    }

    fn make_stats(&self) -> CacheStats {
        let accesses = self.hits + self.misses;
        let (hit_rate, miss_rate) = if accesses == 0 {
            (0.0, 0.0)
        } else {
            (
                self.hits as f64 / accesses as f64,
                self.misses as f64 / accesses as f64,
            )
        };

        CacheStats {
            policy: self.policy(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            accesses,
            hit_rate,
            miss_rate,
            valid_lines: self.valid_lines(),
            capacity_lines: self.blocks.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replace::{fifo::Fifo, lru::Lru};

    fn addr(tag: u64, set: usize) -> Addr {
        Addr {
            tag,
            set,
            offset: 0,
        }
    }

    #[test]
    fn fills_invalid_ways_before_evicting() {
        let mut cache = Cache::new(2, 2, Lru::new());
        let first = cache.insert(&addr(7, 1), 1);
        let second = cache.insert(&addr(8, 1), 2);
        assert_eq!(first, Fill { way: 0, evicted: None });
        assert_eq!(second, Fill { way: 1, evicted: None });
        assert_eq!(cache.lookup(&addr(7, 1)), Some(0));
        assert_eq!(cache.lookup(&addr(8, 1)), Some(1));
        assert_eq!(cache.lookup(&addr(7, 0)), None);

        let third = cache.insert(&addr(9, 1), 3);
        assert_eq!(third.way, 0);
        assert_eq!(
            third.evicted,
            Some(LineSnapshot {
                set: 1,
                way: 0,
                valid: true,
                tag: 7,
                stamp: 1
            })
        );
        assert_eq!(cache.lookup(&addr(7, 1)), None);
        assert_eq!(cache.make_stats().evictions, 1);
    }

    #[test]
    fn touch_updates_recency() {
        let mut cache = Cache::new(1, 2, Lru::new());
        cache.insert(&addr(1, 0), 1);
        cache.insert(&addr(2, 0), 2);
        cache.touch(0, 0, 3);
        let fill = cache.insert(&addr(3, 0), 4);
        assert_eq!(fill.evicted.map(|line| line.tag), Some(2));
    }

    #[test]
    fn sets_do_not_interfere() {
        let mut cache = Cache::new(4, 1, Fifo::new());
        for set in 0..4 {
            cache.insert(&addr(set as u64, set), set as u64 + 1);
        }
        assert_eq!(cache.valid_lines(), 4);
        for set in 0..4 {
            assert_eq!(cache.lookup(&addr(set as u64, set)), Some(0));
        }
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut cache = Cache::new(2, 2, Lru::new());
        cache.insert(&addr(1, 0), 1);
        cache.hit();
        cache.miss();
        cache.clear();
        assert_eq!(cache.valid_lines(), 0);
        assert_eq!(cache.lookup(&addr(1, 0)), None);
        let stats = cache.make_stats();
        assert_eq!(stats.accesses, 0);
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.capacity_lines, 4);
    }

    #[test]
    fn set_lines_reports_policy_stamps() {
        let mut cache = Cache::new(1, 2, Fifo::new());
        cache.insert(&addr(5, 0), 3);
        cache.touch(0, 0, 4);
        let lines = cache.set_lines(0);
        assert_eq!(lines.len(), 2);
        assert_eq!((lines[0].valid, lines[0].tag, lines[0].stamp), (true, 5, 3));
        assert!(!lines[1].valid);
    }

    #[test]
    #[should_panic(expected = "duplicate valid tag")]
    fn duplicate_tags_are_a_defect() {
        let mut cache = Cache::new(1, 2, Lru::new());
        for block in &mut cache.blocks {
            block.valid = true;
            block.tag = 4;
        }
        cache.lookup(&addr(4, 0));
    }
}
