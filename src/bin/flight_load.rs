use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shardflight_rs::config::{ConfigOverrides, FlightConfig, ENV_CONFIG_PATH};
use shardflight_rs::ShardedFlight;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn print_help() {
    eprintln!(
        r#"flight_load - hot-key load generator for sharded flight

USAGE:
    flight_load [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to config file (TOML)
    -s, --shards <N>        Override shard count
    -h, --help              Print help

ENVIRONMENT:
    SHARDFLIGHT_CONFIG      Path to config file
    SHARDFLIGHT_SHARDS      Shard count
    FLIGHT_LOAD_THREADS     Caller threads [default: 16]
    FLIGHT_LOAD_KEYS        Distinct keys to spread calls over [default: 32]
    FLIGHT_LOAD_ROUNDS      Calls per thread [default: 2000]
    FLIGHT_LOAD_WORK_US     Simulated work per execution [default: 200]
    FLIGHT_LOAD_SEED        RNG seed [default: 42]
    RUST_LOG                Log filter, e.g. shardflight_rs=debug
"#
    );
}

fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut overrides = ConfigOverrides::default();
    if let Some(shards) = parse_arg("--shards").or_else(|| parse_arg("-s")) {
        overrides.shards = Some(shards.parse()?);
    }

    // Load config: CLI > Env > File > Defaults
    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var(ENV_CONFIG_PATH).ok());
    let config = FlightConfig::load(config_path.as_deref(), overrides)?;

    let threads = env_u64("FLIGHT_LOAD_THREADS", 16).max(1);
    let keys = env_u64("FLIGHT_LOAD_KEYS", 32).max(1);
    let rounds = env_u64("FLIGHT_LOAD_ROUNDS", 2000);
    let work = Duration::from_micros(env_u64("FLIGHT_LOAD_WORK_US", 200));
    let seed = env_u64("FLIGHT_LOAD_SEED", 42);

    info!(shards = config.shards, threads, keys, rounds, ?work, "starting load");
    let flight: ShardedFlight<u64, String> = ShardedFlight::new(config)?;
    let work_runs = AtomicU64::new(0);
    let mismatches = AtomicU64::new(0);
    let timeouts = AtomicU64::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        for t in 0..threads {
            let (flight, work_runs, mismatches, timeouts) =
                (&flight, &work_runs, &mismatches, &timeouts);
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t));
                for _ in 0..rounds {
                    let key = rng.random_range(0..keys);
                    let id = key.to_string();
                    let outcome = flight.call(&["load:", id.as_str()], || {
                        work_runs.fetch_add(1, Ordering::Relaxed);
                        thread::sleep(work);
                        Ok(key)
                    });
                    match outcome.into_result() {
                        Ok(value) if value == key => {}
                        Err(err) if err.is_timeout() => {
                            timeouts.fetch_add(1, Ordering::Relaxed);
                        }
                        _ => {
                            mismatches.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });
    let elapsed = start.elapsed();

    let stats = flight.stats();
    let total = threads * rounds;
    let secs = elapsed.as_secs_f64().max(1e-9);
    println!(
        "flight_load: {} calls in {:.3}s ({:.2} calls/s) executions={} joins={} coalesced={:.1}% timeouts={} mismatches={}",
        total,
        secs,
        total as f64 / secs,
        work_runs.load(Ordering::Relaxed),
        stats.joins,
        stats.coalesce_ratio() * 100.0,
        timeouts.load(Ordering::Relaxed),
        mismatches.load(Ordering::Relaxed),
    );

    if !flight.shutdown() {
        anyhow::bail!("calls still in flight after drain timeout");
    }
    let mismatches = mismatches.load(Ordering::Relaxed);
    if mismatches > 0 {
        anyhow::bail!("{mismatches} calls received a result for the wrong key");
    }
    Ok(())
}
