use std::{
    fs,
    io::{self, BufRead, Write},
    path::PathBuf,
    process::ExitCode,
};

use cache_sim::{
    cache::{CacheStats, LineSnapshot},
    config::{CacheConfig, Policy},
    controller::{AccessResult, Controller},
    error::SimError,
    trace::{self, Trace},
};
use serde::Serialize;

const HELP: &str = "\
Single-level cache simulator

USAGE:
  cache_sim [CONFIG] [SOURCE] [--json <path>] [-v]

CONFIG (defaults: 64 byte direct-mapped cache, 16 byte blocks, LRU):
  --config <json>        cache config as a JSON string
  -p <path>              cache config from a JSON file
  --cache-size <bytes>   --block-size <bytes>   --ways <n>
  --policy <LRU|FIFO>    --address-bits <n>

SOURCE (default: addresses read interactively from stdin):
  -t <path>              trace file, one or more addresses per line, .xz allowed
  --demo                 the classic 30 access loop demo
  --random <n>           n random addresses, see --limit and --seed

OUTPUT:
  --json <path>          write every access and the final stats as JSON
  -v, --verbose          debug logging (RUST_LOG also works)
";

enum Source {
    Trace(PathBuf),
    Addresses(Vec<u64>),
    Interactive,
}

#[derive(Serialize)]
struct Report<'a> {
    config: &'a CacheConfig,
    stats: CacheStats,
    accesses: &'a [AccessResult],
}

fn main() -> ExitCode {
    let mut args = pico_args::Arguments::from_env();
    let filter = if args.contains(["-v", "--verbose"]) {
        "debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if args.contains("--help") {
        print!("{HELP}");
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(mut args: pico_args::Arguments) -> Result<(), SimError> {
    let config = read_config(&mut args)?;
    let source = read_source(&mut args, &config)?;
    let stats_path: Option<String> = args.opt_value_from_str("--json")?;
    let records_per_block: usize = args
        .opt_value_from_str("--buffer-size")?
        .unwrap_or(1024 * 16);
    let blocks_per_queue: usize = args.opt_value_from_str("--queue-size")?.unwrap_or(32);

    let unused = args.finish();
    if !unused.is_empty() {
        log::warn!("ignoring unused arguments: {unused:?}");
    }

    let mut controller = Controller::new(config)?;
    let mut results = Vec::new();

    match source {
        Source::Trace(path) => {
            let trace = Trace::read(path, records_per_block, blocks_per_queue)?;
            for record in trace.records() {
                let record = record?;
                match record.address {
                    Ok(address) => step(&mut controller, address, &mut results),
                    Err(err) => log::warn!("trace line {}: {}", record.line, err),
                }
            }
        }
        Source::Addresses(addresses) => {
            for address in addresses {
                step(&mut controller, address, &mut results);
            }
        }
        Source::Interactive => interactive(&mut controller, &mut results)?,
    }

    print_stats(&controller.stats());

    if let Some(stats_path) = stats_path {
        let report = Report {
            config: controller.config(),
            stats: controller.stats(),
            accesses: &results,
        };
        let stats_file = fs::File::create(stats_path)?;
        serde_json::to_writer_pretty(stats_file, &report)?;
    }
    Ok(())
}

fn read_config(args: &mut pico_args::Arguments) -> Result<CacheConfig, SimError> {
    let json = if let Some(json) = args.opt_value_from_str::<_, String>("--config")? {
        Some(json)
    } else if let Some(path) = args.opt_value_from_str::<_, String>("-p")? {
        Some(fs::read_to_string(path)?)
    } else {
        None
    };
    let mut config = match json {
        Some(json) => CacheConfig::from_json(&json)?,
        None => CacheConfig::default(),
    };

    if let Some(cache_size) = args.opt_value_from_str("--cache-size")? {
        config.cache_size = cache_size;
    }
    if let Some(block_size) = args.opt_value_from_str("--block-size")? {
        config.block_size = block_size;
    }
    if let Some(ways) = args.opt_value_from_str("--ways")? {
        config.associativity = ways;
    }
    if let Some(address_bits) = args.opt_value_from_str("--address-bits")? {
        config.address_bits = address_bits;
    }
    if let Some(policy) = args.opt_value_from_str::<_, String>("--policy")? {
        config.policy = policy.parse::<Policy>()?;
    }
    Ok(config)
}

fn read_source(args: &mut pico_args::Arguments, config: &CacheConfig) -> Result<Source, SimError> {
    let trace_path: Option<String> = args.opt_value_from_str("-t")?;
    let demo = args.contains("--demo");
    let random_count: Option<usize> = args.opt_value_from_str("--random")?;
    let seed: u64 = args.opt_value_from_str("--seed")?.unwrap_or(0);
    // Default range is a few times the cache so that sets actually fill up
    let limit: u64 = args
        .opt_value_from_str("--limit")?
        .unwrap_or(config.cache_size.saturating_mul(4));

    Ok(if let Some(path) = trace_path {
        Source::Trace(path.into())
    } else if demo {
        Source::Addresses(trace::demo())
    } else if let Some(count) = random_count {
        Source::Addresses(trace::random(count, limit, seed))
    } else {
        Source::Interactive
    })
}

fn step(controller: &mut Controller, address: u64, results: &mut Vec<AccessResult>) {
    match controller.access(address) {
        Ok(result) => {
            println!("{result}");
            results.push(result);
        }
        Err(err) => log::warn!("{err}"),
    }
}

fn interactive(controller: &mut Controller, results: &mut Vec<AccessResult>) -> io::Result<()> {
    println!("enter addresses (decimal or 0x hex), or: show, stats, reset, quit");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            println!();
            return Ok(());
        };
        let line = line?;
        match line.trim() {
            "" => {}
            "q" | "quit" | "exit" => return Ok(()),
            "show" => print_lines(controller),
            "stats" => print_stats(&controller.stats()),
            "reset" => {
                controller.reset();
                results.clear();
                println!("cache cleared");
            }
            input => {
                for literal in input.split(|c: char| c.is_whitespace() || c == ',') {
                    if literal.is_empty() {
                        continue;
                    }
                    match trace::parse_address(literal) {
                        Ok(address) => step(controller, address, results),
                        Err(err) => log::warn!("{err}"),
                    }
                }
            }
        }
    }
}

fn print_lines(controller: &Controller) {
    println!("{:>5} {:>4} {:>5} {:>18} {:>18} {:>8}", "set", "way", "valid", "tag", "block", "stamp");
    for line in controller.lines() {
        print_line(controller, &line);
    }
}

fn print_line(controller: &Controller, line: &LineSnapshot) {
    if line.valid {
        println!(
            "{:>5} {:>4} {:>5} {:>#18x} {:>#18x} {:>8}",
            line.set,
            line.way,
            "yes",
            line.tag,
            controller.block_address(line),
            line.stamp
        );
    } else {
        println!("{:>5} {:>4} {:>5} {:>18} {:>18} {:>8}", line.set, line.way, "no", "--", "--", "--");
    }
}

fn print_stats(stats: &CacheStats) {
    println!(
        "{}: {} accesses, {} hits, {} misses, {} evictions, hit rate {:.1}%, {}/{} lines valid",
        stats.policy,
        stats.accesses,
        stats.hits,
        stats.misses,
        stats.evictions,
        stats.hit_rate * 100.0,
        stats.valid_lines,
        stats.capacity_lines
    );
}
