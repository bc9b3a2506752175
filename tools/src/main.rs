//! spin-runner: headless balancing runner for the reward wheel.
//!
//! Usage:
//!   spin-runner --seed 12345 --users 500 --spins 40 --tier rookie
//!   spin-runner --seed 12345 --db run.db --data-dir ./data --json
//!   RUST_LOG=spin_telemetry=info spin-runner --log-telemetry

use anyhow::Result;
use spinwheel_core::{
    config::WheelConfig,
    engine::SpinEngine,
    error::WheelError,
    state::UserSpinState,
    store::SqliteStore,
    telemetry::LogSink,
    types::Tier,
};
use std::env;
use std::sync::Arc;

#[derive(serde::Serialize)]
struct RewardLine {
    reward_id: String,
    wins:      i64,
    observed:  f64,
    base_odds: f64,
}

#[derive(serde::Serialize)]
struct Summary {
    seed:       u64,
    tier:       String,
    users:      u64,
    spins:      i64,
    pity_spins: i64,
    refused:    u64,
    rewards:    Vec<RewardLine>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let users = parse_arg(&args, "--users", 100u64);
    let spins = parse_arg(&args, "--spins", 30u32);
    let json = args.iter().any(|a| a == "--json");
    let log_telemetry = args.iter().any(|a| a == "--log-telemetry");
    let tier: Tier = str_arg(&args, "--tier").unwrap_or("rookie").parse()?;
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = str_arg(&args, "--data-dir").unwrap_or("./data");

    if !json {
        println!("Spin Wheel — spin-runner");
        println!("  seed:      {seed}");
        println!("  users:     {users}");
        println!("  spins:     {spins} per user");
        println!("  tier:      {tier}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = WheelConfig::load(data_dir)?;
    let fresh = UserSpinState::fresh(&config);
    let store = Arc::new(if db == ":memory:" {
        SqliteStore::in_memory(fresh)?
    } else {
        SqliteStore::open(db, fresh)?
    });
    store.migrate()?;

    let mut engine = SpinEngine::new(config, Arc::clone(&store), seed).with_sink(Arc::clone(&store));
    if log_telemetry {
        engine = engine.with_sink(LogSink);
    }

    let mut refused = 0u64;
    for n in 0..users {
        let user_id = format!("sim-{seed}-{n}");
        engine.grant_spins(&user_id, tier, spins)?;
        // Spin until the inventory runs dry; extra-spin wins extend the run.
        loop {
            match engine.spin(&user_id, tier) {
                Ok(_) => {}
                Err(WheelError::InsufficientSpins { .. }) => break,
                Err(e @ WheelError::TransientFailure { .. }) => {
                    refused += 1;
                    log::warn!("user={user_id} spin refused: {e}");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let summary = summarize(&engine, &store, seed, tier, users, refused)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn summarize(
    engine: &SpinEngine<SqliteStore>,
    store: &SqliteStore,
    seed: u64,
    tier: Tier,
    users: u64,
    refused: u64,
) -> Result<Summary> {
    let counts = store.reward_counts(tier.as_str())?;
    let spins: i64 = counts.iter().map(|(_, n)| n).sum();

    // Base odds come from a user who has never spun.
    let base = engine.odds("__baseline__", tier)?;
    let rewards = base
        .rows
        .iter()
        .map(|row| {
            let wins = counts
                .iter()
                .find(|(id, _)| *id == row.reward_id)
                .map_or(0, |(_, n)| *n);
            RewardLine {
                reward_id: row.reward_id.clone(),
                wins,
                observed: if spins > 0 { wins as f64 / spins as f64 } else { 0.0 },
                base_odds: row.probability,
            }
        })
        .collect();

    Ok(Summary {
        seed,
        tier: tier.to_string(),
        users,
        spins,
        pity_spins: store.pity_spin_count(tier.as_str())?,
        refused,
        rewards,
    })
}

fn print_summary(summary: &Summary) {
    println!("=== RUN SUMMARY ===");
    println!("  tier:           {}", summary.tier);
    println!("  users:          {}", summary.users);
    println!("  spins:          {}", summary.spins);
    println!("  pity spins:     {}", summary.pity_spins);
    println!("  refused:        {}", summary.refused);
    println!();
    println!("=== REWARD DISTRIBUTION ===");
    for line in &summary.rewards {
        println!(
            "  {:<22} | wins: {:>7} | observed: {:>6.2}% | base: {:>6.2}%",
            line.reward_id,
            line.wins,
            line.observed * 100.0,
            line.base_odds * 100.0
        );
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
