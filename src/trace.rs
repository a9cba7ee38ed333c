use std::{
    fs,
    io::{self, BufRead, BufReader, Read},
    mem,
    num::IntErrorKind,
    path::PathBuf,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};
use xz2::read::XzDecoder;

use crate::error::AddressError;

// Loop pattern from the classic direct-mapped vs 2-way demo
const LOOP_PATTERN: [u64; 10] = [0, 4, 0, 4, 8, 12, 8, 0, 1, 5];
const LOOP_REPEATS: usize = 3;

/// Parses a decimal or `0x`-prefixed hexadecimal address literal.
///
/// `_` separators are ignored. Negative literals are rejected outright
/// rather than wrapped.
pub fn parse_address(literal: &str) -> Result<u64, AddressError> {
    let text = literal.trim();
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();

    if let Some(rest) = cleaned.strip_prefix('-') {
        return Err(if rest.is_empty() {
            AddressError::Malformed(text.to_owned())
        } else {
            AddressError::Negative(text.to_owned())
        });
    }

    let (digits, radix) = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (cleaned.as_str(), 10),
    };
    if digits.is_empty() || digits.starts_with('+') {
        return Err(AddressError::Malformed(text.to_owned()));
    }

    u64::from_str_radix(digits, radix).map_err(|err| match err.kind() {
        IntErrorKind::PosOverflow => AddressError::OutOfRange {
            address: text.to_owned(),
            bits: u64::BITS,
        },
        _ => AddressError::Malformed(text.to_owned()),
    })
}

/// The demo loop, repeated.
pub fn demo() -> Vec<u64> {
    LOOP_PATTERN
        .iter()
        .copied()
        .cycle()
        .take(LOOP_PATTERN.len() * LOOP_REPEATS)
        .collect()
}

/// `count` addresses drawn uniformly from `0..limit`, reproducible per seed.
pub fn random(count: usize, limit: u64, seed: u64) -> Vec<u64> {
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..count).map(|_| rng.u64(0..limit.max(1))).collect()
}

/// One literal from a trace file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub line: usize,
    pub address: Result<u64, AddressError>,
}

/// Addresses streamed from a text trace on a background thread.
///
/// Each line may hold several literals separated by whitespace or commas;
/// anything after `#` is a comment. A read failure is delivered as the last
/// block, after every record read before it.
pub struct Trace {
    pub rec: Receiver<io::Result<Vec<Record>>>,
    _thread: JoinHandle<()>,
}

impl Trace {
    /// Opens `path`, decompressing it when it ends in `.xz`.
    pub fn read(
        path: PathBuf,
        records_per_block: usize,
        blocks_per_queue: usize,
    ) -> io::Result<Trace> {
        let stream = fs::File::open(&path)?;
        let compressed = path.extension().map_or(false, |ext| ext == "xz");
        log::debug!(
            "reading trace {} ({})",
            path.display(),
            if compressed { "xz" } else { "plain" }
        );

        Ok(if compressed {
            Trace::from_reader(XzDecoder::new(stream), records_per_block, blocks_per_queue)
        } else {
            Trace::from_reader(stream, records_per_block, blocks_per_queue)
        })
    }

    pub fn from_reader<R: Read + Send + 'static>(
        reader: R,
        records_per_block: usize,
        blocks_per_queue: usize,
    ) -> Trace {
        let (sender, receiver) = crossbeam::channel::bounded(blocks_per_queue);
        let records_per_block = records_per_block.max(1);

        let t = thread::spawn(move || {
            Trace::run_thread(BufReader::new(reader), records_per_block, sender)
        });

        Trace {
            rec: receiver,
            _thread: t,
        }
    }

    fn run_thread(
        stream: impl BufRead,
        records_per_block: usize,
        queue: Sender<io::Result<Vec<Record>>>,
    ) {
        let mut buffer = Vec::with_capacity(records_per_block);
        for (idx, line) in stream.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    if !buffer.is_empty() && queue.send(Ok(buffer)).is_err() {
                        return;
                    }
                    let err = io::Error::new(
                        err.kind(),
                        format!("trace read failed at line {}: {}", idx + 1, err),
                    );
                    let _ = queue.send(Err(err));
                    return;
                }
            };
            let content = line.split('#').next().unwrap_or_default();
            let literals = content
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|literal| !literal.is_empty());

            for literal in literals {
                buffer.push(Record {
                    line: idx + 1,
                    address: parse_address(literal),
                });
                if buffer.len() == records_per_block {
                    let block = mem::replace(&mut buffer, Vec::with_capacity(records_per_block));
                    if queue.send(Ok(block)).is_err() {
                        // Receiver hung up
                        return;
                    }
                }
            }
        }
        if !buffer.is_empty() {
            let _ = queue.send(Ok(buffer));
        }
    }

    /// Every record in file order, then the read error if the file could
    /// not be read to the end.
    pub fn records(&self) -> impl Iterator<Item = io::Result<Record>> + '_ {
        self.rec.iter().flat_map(|block| {
            let (records, failure) = match block {
                Ok(records) => (records, None),
                Err(err) => (Vec::new(), Some(err)),
            };
            records.into_iter().map(Ok).chain(failure.map(Err))
        })
    }
}
