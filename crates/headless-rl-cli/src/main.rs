//! Headless smoke driver
//!
//! Plays a few episodes against the headless worker with a uniformly random
//! legal policy and prints one summary line per episode.

use anyhow::{Context, Result};
use clap::Parser;
use headless_env::{EnvConfig, HeadlessEnv};
use headless_rl_core::{ActionMask, Environment};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "headless-smoke")]
#[command(about = "Random-policy smoke test for the headless worker")]
struct Cli {
    /// Repository root containing apps/core and node_modules
    #[arg(long, default_value = ".")]
    repo_root: PathBuf,

    /// Number of episodes to play
    #[arg(long, default_value_t = 2)]
    episodes: u64,

    /// Step limit per episode
    #[arg(long, default_value_t = 300)]
    max_steps: u64,

    /// Base seed; episode `n` uses `seed + n`
    #[arg(long, default_value_t = 123)]
    seed: u64,

    #[arg(long, default_value = "single")]
    mode: String,

    #[arg(long, default_value = "normal")]
    single_mode: String,

    /// Seat controlled by the random policy
    #[arg(long, default_value_t = 0)]
    seat: u32,

    /// Ask the worker for verbose stderr logging
    #[arg(long)]
    debug: bool,

    /// Print a snapshot summary after the first step of each episode
    #[arg(long)]
    show_snapshot: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Uniformly random legal action, or the last action when nothing is legal
fn pick_action(mask: &ActionMask, rng: &mut impl Rng) -> usize {
    mask.legal_actions()
        .choose(rng)
        .copied()
        .unwrap_or_else(|| mask.len().saturating_sub(1))
}

/// Render a snapshot field: strings bare, other values as JSON, absent as `None`
fn field(value: Option<&serde_json::Value>) -> String {
    match value {
        None => "None".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

async fn run(cli: &Cli, env: &mut HeadlessEnv) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);

    for ep in 0..cli.episodes {
        let seed = cli.seed.wrapping_add(ep);
        let reset = env
            .reset(Some(seed))
            .await
            .with_context(|| format!("reset failed for episode {} (seed {})", ep, seed))?;

        let mut mask = reset.info.action_mask;
        let mut total_reward = 0.0;
        let mut steps = 0;
        let mut done = false;

        while !done && steps < cli.max_steps {
            let action = pick_action(&mask, &mut rng);
            let step = env
                .step(action as i64)
                .await
                .with_context(|| format!("step {} failed in episode {}", steps, ep))?;

            // A terminal step has already closed the worker
            if cli.show_snapshot && steps == 0 && !step.is_done() {
                let snapshot = env.snapshot().await.context("snapshot failed")?;
                println!(
                    "snapshot: event= {} me= {} players= {}",
                    field(snapshot.event()),
                    field(snapshot.me_player_id()),
                    snapshot.player_count()
                );
            }

            total_reward += step.reward;
            steps += 1;
            done = step.is_done();
            mask = step.info.action_mask;
        }

        info!(episode = ep, seed = env.episode_seed(), steps, "Episode finished");
        println!(
            "episode={} steps={} done={} reward={:.3}",
            ep, steps, done, total_reward
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = EnvConfig {
        mode: cli.mode.clone(),
        single_mode: cli.single_mode.clone(),
        seat: cli.seat,
        seed: cli.seed,
        ..Default::default()
    };
    let mut env = HeadlessEnv::for_repo(&cli.repo_root, cli.debug, config);
    info!("Smoke run starting in {:?}", cli.repo_root);

    let result = run(&cli, &mut env).await;
    env.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_action_stays_legal() {
        let mask = ActionMask::normalized(vec![false, true, false, true, true], 60);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let action = pick_action(&mask, &mut rng);
            assert!(mask.is_legal(action), "picked illegal action {}", action);
        }
    }

    #[test]
    fn test_pick_action_without_legal_moves() {
        let mask = ActionMask::none(60);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(pick_action(&mask, &mut rng), 59);
    }

    #[test]
    fn test_pick_action_is_seeded() {
        let mask = ActionMask::normalized(vec![true; 60], 60);
        let picks = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..20).map(|_| pick_action(&mask, &mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(picks(123), picks(123));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["headless-smoke"]);
        assert_eq!(cli.episodes, 2);
        assert_eq!(cli.max_steps, 300);
        assert_eq!(cli.seed, 123);
        assert_eq!(cli.mode, "single");
        assert_eq!(cli.single_mode, "normal");
        assert_eq!(cli.seat, 0);
        assert!(!cli.debug && !cli.show_snapshot);
    }

    #[test]
    fn test_snapshot_field_rendering() {
        assert_eq!(field(None), "None");
        assert_eq!(field(Some(&serde_json::json!("phaseUse"))), "phaseUse");
        assert_eq!(field(Some(&serde_json::json!(1))), "1");
    }
}
