use std::fmt;

use serde::Serialize;

use crate::{
    addr::{Addr, Splitter},
    cache::{Cache, CacheStats, IsCache, LineSnapshot},
    clock::Clock,
    config::{CacheConfig, Geometry, Policy},
    error::{AddressError, ConfigError},
    replace::{fifo::Fifo, lru::Lru},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Hit,
    Miss,
}

/// Everything one access did to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessResult {
    pub address: u64,
    pub fields: Addr,
    pub outcome: Outcome,
    /// Way that was hit or filled.
    pub way: usize,
    pub evicted_line: Option<LineSnapshot>,
    pub replaced_tag: Option<u64>,
}

impl AccessResult {
    pub fn is_hit(&self) -> bool {
        self.outcome == Outcome::Hit
    }
}

impl fmt::Display for AccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = match self.outcome {
            Outcome::Hit => "HIT",
            Outcome::Miss => "MISS",
        };
        write!(
            f,
            "{:#010x}  tag={:#x} index={} offset={:#x}  {outcome:<4} way {}",
            self.address, self.fields.tag, self.fields.set, self.fields.offset, self.way
        )?;
        if let Some(tag) = self.replaced_tag {
            write!(f, "  evicted tag {tag:#x}")?;
        }
        Ok(())
    }
}

/// Owns one cache and the clock that orders its lines.
///
/// Changing the shape or the policy means building a new controller.
pub struct Controller {
    config: CacheConfig,
    geometry: Geometry,
    splitter: Splitter,
    cache: Box<dyn IsCache>,
    clock: Clock,
}

impl Controller {
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        let geometry = config.validate()?;
        let splitter = Splitter::new(config.block_size, geometry.n_sets)?;

        let n_sets = geometry.n_sets as usize;
        let n_ways = config.associativity as usize;
        let cache: Box<dyn IsCache> = match config.policy {
            Policy::Lru => Box::new(Cache::new(n_sets, n_ways, Lru::new())),
            Policy::Fifo => Box::new(Cache::new(n_sets, n_ways, Fifo::new())),
        };
        log::info!(
            "configured {} byte cache: {} sets x {} ways x {} byte blocks, {}, tag/index/offset = {}/{}/{} bits",
            config.cache_size,
            n_sets,
            n_ways,
            config.block_size,
            config.policy,
            geometry.tag_bits,
            geometry.index_bits,
            geometry.offset_bits
        );

        Ok(Controller {
            config,
            geometry,
            splitter,
            cache,
            clock: Clock::new(),
        })
    }

    /// Looks `address` up, filling or evicting on a miss.
    ///
    /// An address wider than the configured width is rejected before the
    /// cache or the clock is touched.
    pub fn access(&mut self, address: u64) -> Result<AccessResult, AddressError> {
        self.check_width(address)?;
        let fields = self.splitter.split(address);
        let clock = self.clock.tick();

        let result = match self.cache.lookup(&fields) {
            Some(way) => {
                self.cache.touch(fields.set, way, clock);
                self.cache.hit();
                AccessResult {
                    address,
                    fields,
                    outcome: Outcome::Hit,
                    way,
                    evicted_line: None,
                    replaced_tag: None,
                }
            }
            None => {
                let fill = self.cache.insert(&fields, clock);
                self.cache.miss();
                AccessResult {
                    address,
                    fields,
                    outcome: Outcome::Miss,
                    way: fill.way,
                    replaced_tag: fill.evicted.map(|line| line.tag),
                    evicted_line: fill.evicted,
                }
            }
        };
        log::debug!("#{clock} {result}");
        Ok(result)
    }

    /// Invalidates every line, clears the counters and restarts the clock.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.clock.reset();
        log::info!("cache reset");
    }

    fn check_width(&self, address: u64) -> Result<(), AddressError> {
        let bits = self.config.address_bits;
        if bits < u64::BITS && address >> bits != 0 {
            return Err(AddressError::OutOfRange {
                address: format!("{address:#x}"),
                bits,
            });
        }
        Ok(())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.make_stats()
    }

    /// Lines of one set, or `None` when `set` is out of range.
    pub fn set_lines(&self, set: usize) -> Option<Vec<LineSnapshot>> {
        (set < self.cache.n_sets()).then(|| self.cache.set_lines(set))
    }

    pub fn lines(&self) -> Vec<LineSnapshot> {
        (0..self.cache.n_sets())
            .flat_map(|set| self.cache.set_lines(set))
            .collect()
    }

    /// Address of the first byte of the block a line holds.
    pub fn block_address(&self, line: &LineSnapshot) -> u64 {
        self.splitter.compose(&Addr {
            tag: line.tag,
            set: line.set,
            offset: 0,
        })
    }
}

/// Builds a controller from loose parameters, `policy` being `"LRU"` or `"FIFO"`.
pub fn configure(
    cache_size: u64,
    block_size: u64,
    associativity: u64,
    policy: &str,
) -> Result<Controller, ConfigError> {
    let policy = policy.parse()?;
    Controller::new(CacheConfig::new(
        cache_size,
        block_size,
        associativity,
        policy,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace;

    fn outcomes(controller: &mut Controller, addresses: &[u64]) -> Vec<Outcome> {
        addresses
            .iter()
            .map(|&address| controller.access(address).unwrap().outcome)
            .collect()
    }

    #[test]
    fn direct_mapped_example() {
        let mut cache = configure(64, 16, 1, "LRU").unwrap();

        let first = cache.access(0x10).unwrap();
        assert_eq!(first.outcome, Outcome::Miss);
        assert_eq!(
            first.fields,
            Addr {
                tag: 0,
                set: 1,
                offset: 0
            }
        );
        assert_eq!(first.replaced_tag, None);

        let second = cache.access(0x50).unwrap();
        assert_eq!(second.outcome, Outcome::Miss);
        assert_eq!((second.fields.tag, second.fields.set), (1, 1));
        assert_eq!(second.replaced_tag, Some(0));
        assert_eq!(second.evicted_line.map(|line| line.way), Some(0));

        let third = cache.access(0x10).unwrap();
        assert_eq!(third.outcome, Outcome::Miss);
        assert_eq!(third.replaced_tag, Some(1));
    }

    #[test]
    fn hit_after_fill() {
        for policy in ["LRU", "FIFO"] {
            let mut cache = configure(256, 16, 2, policy).unwrap();
            for address in [0x0, 0x1234, 0xffff_fff0] {
                let miss = cache.access(address).unwrap();
                let hit = cache.access(address).unwrap();
                assert_eq!(miss.outcome, Outcome::Miss);
                assert!(hit.is_hit());
                assert_eq!(hit.way, miss.way);
                assert_eq!(hit.evicted_line, None);
            }
        }
    }

    #[test]
    fn same_block_different_offset_hits() {
        let mut cache = configure(64, 16, 1, "LRU").unwrap();
        assert_eq!(outcomes(&mut cache, &[0x20, 0x2f]), [Outcome::Miss, Outcome::Hit]);
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        // one set, two ways: A=0x00, B=0x10, C=0x20
        let mut cache = configure(32, 16, 2, "LRU").unwrap();
        for address in [0x00, 0x10, 0x00] {
            cache.access(address).unwrap();
        }
        let result = cache.access(0x20).unwrap();
        assert_eq!(result.outcome, Outcome::Miss);
        assert_eq!(result.replaced_tag, Some(1));
        assert!(cache.access(0x00).unwrap().is_hit());
    }

    #[test]
    fn fifo_evicts_first_inserted() {
        let mut cache = configure(32, 16, 2, "FIFO").unwrap();
        for address in [0x00, 0x10, 0x00] {
            cache.access(address).unwrap();
        }
        let result = cache.access(0x20).unwrap();
        assert_eq!(result.replaced_tag, Some(0));
        assert!(cache.access(0x10).unwrap().is_hit());
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut cache = configure(128, 8, 4, "FIFO").unwrap();
        let capacity = 128 / 8;
        for address in trace::random(500, 4096, 7) {
            cache.access(address).unwrap();
            for set in 0..cache.geometry().n_sets as usize {
                let valid = cache
                    .set_lines(set)
                    .unwrap()
                    .iter()
                    .filter(|line| line.valid)
                    .count();
                assert!(valid <= 4);
            }
            assert!(cache.stats().valid_lines <= capacity);
        }
        assert_eq!(cache.lines().len(), capacity);
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let addresses = trace::random(300, 1 << 12, 42);
        let run = || {
            let mut cache = configure(256, 16, 4, "LRU").unwrap();
            addresses
                .iter()
                .map(|&address| cache.access(address).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn demo_trace_favours_two_ways() {
        let demo = trace::demo();

        let mut direct = configure(4, 1, 1, "LRU").unwrap();
        let hits = outcomes(&mut direct, &demo)
            .into_iter()
            .filter(|&o| o == Outcome::Hit)
            .count();
        assert_eq!(hits, 2);

        let mut two_way = configure(8, 1, 2, "LRU").unwrap();
        for &address in &demo {
            two_way.access(address).unwrap();
        }
        let stats = two_way.stats();
        assert_eq!((stats.hits, stats.misses), (15, 15));
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn reset_forgets_lines_and_clock() {
        let mut cache = configure(64, 16, 2, "LRU").unwrap();
        let before: Vec<_> = [0x0, 0x40, 0x80, 0x0]
            .iter()
            .map(|&a| cache.access(a).unwrap())
            .collect();
        cache.reset();
        assert_eq!(cache.stats().valid_lines, 0);
        assert_eq!(cache.stats().accesses, 0);
        let after: Vec<_> = [0x0, 0x40, 0x80, 0x0]
            .iter()
            .map(|&a| cache.access(a).unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn wide_address_leaves_state_untouched() {
        let mut cache = configure(64, 16, 1, "LRU").unwrap();
        cache.access(0x10).unwrap();
        let err = cache.access(1 << 32).unwrap_err();
        assert_eq!(
            err,
            AddressError::OutOfRange {
                address: "0x100000000".to_owned(),
                bits: 32
            }
        );
        assert_eq!(cache.stats().accesses, 1);
        assert!(cache.access(0x10).unwrap().is_hit());
        assert_eq!(cache.lines()[1].stamp, 2);
    }

    #[test]
    fn full_width_addresses() {
        let mut config = CacheConfig::new(64, 16, 1, Policy::Fifo);
        config.address_bits = 64;
        let mut cache = Controller::new(config).unwrap();
        let result = cache.access(u64::MAX).unwrap();
        assert_eq!(result.fields.tag, u64::MAX >> 6);
        let line = cache.set_lines(3).unwrap()[0];
        assert_eq!(cache.block_address(&line), u64::MAX - 15);
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(
            configure(64, 16, 1, "random"),
            Err(ConfigError::UnknownPolicy(_))
        ));
        assert!(matches!(
            configure(64, 24, 1, "LRU"),
            Err(ConfigError::NotPowerOfTwo { .. })
        ));
        assert!(matches!(
            configure(0, 16, 1, "LRU"),
            Err(ConfigError::NotPositive { .. })
        ));
        assert!(matches!(
            configure(64, 16, 8, "FIFO"),
            Err(ConfigError::Indivisible { .. })
        ));
        assert!(matches!(
            configure(1 << 62, 1, 1, "LRU"),
            Err(ConfigError::TooManyLines { .. })
        ));
    }

    #[test]
    fn out_of_range_set_has_no_lines() {
        let cache = configure(64, 16, 1, "LRU").unwrap();
        assert!(cache.set_lines(4).is_none());
        assert_eq!(cache.set_lines(0).unwrap().len(), 1);
    }

    #[test]
    fn formats_access_line() {
        let mut cache = configure(64, 16, 1, "LRU").unwrap();
        cache.access(0x10).unwrap();
        let line = cache.access(0x50).unwrap().to_string();
        assert!(line.starts_with("0x00000050"));
        assert!(line.contains("tag=0x1 index=1"));
        assert!(line.contains("MISS"));
        assert!(line.ends_with("evicted tag 0x0"));
    }
}
