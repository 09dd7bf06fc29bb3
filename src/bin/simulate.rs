//! Run simulated stop-search episodes
//!
//! Drives a pool of simulated environments (grid-of-panoramas navigator,
//! geometry-driven detector) with a seeded random policy and writes one
//! completion record per finished episode.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin simulate -- <stops.json|stops.csv> [log.json] \
//!     [--config engine.json] [--envs 4] [--episodes 100] [--positives 50] [--seed 7]
//! ```

use std::{env, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use stopfinder_rl::{
    env::{
        action::Action,
        config::{EngineConfig, SPATIAL_DIM},
        pool::EnvPool,
        sim::{SimConfig, SimNavigator, SyntheticDetector},
        streetview::StreetViewEnv,
    },
    stops::{LoadOptions, StopLoader},
    telemetry::{init_tracing, CompletionSink, JsonLogWriter},
    utils::frame_stack::{FrameStack, DEFAULT_STACK_DEPTH},
};

struct Args {
    stops: PathBuf,
    log: PathBuf,
    config: Option<PathBuf>,
    envs: usize,
    episodes: usize,
    positives: usize,
    seed: u64,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut args = Args {
        stops: PathBuf::new(),
        log: PathBuf::from("runs/log.json"),
        config: None,
        envs: 4,
        episodes: 100,
        positives: 0,
        seed: 7,
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| iter.next().with_context(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--envs" => args.envs = value("--envs")?.parse().context("--envs")?,
            "--episodes" => args.episodes = value("--episodes")?.parse().context("--episodes")?,
            "--positives" => args.positives = value("--positives")?.parse().context("--positives")?,
            "--seed" => args.seed = value("--seed")?.parse().context("--seed")?,
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ => positional.push(arg),
        }
    }

    match positional.as_slice() {
        [stops] => args.stops = PathBuf::from(stops),
        [stops, log] => {
            args.stops = PathBuf::from(stops);
            args.log = PathBuf::from(log);
        }
        _ => bail!(
            "Usage: simulate <stops.json|stops.csv> [log.json] [--config engine.json] \
             [--envs N] [--episodes N] [--positives N] [--seed N]"
        ),
    }
    args.envs = args.envs.max(1);
    Ok(args)
}

// Random walk that prefers finishing once the latest frame shows two viewpoints
fn choose_action(rng: &mut StdRng, stacked: &[f32], obs_dim: usize) -> i64 {
    let latest = &stacked[stacked.len() - obs_dim..];
    let viewpoints = latest[obs_dim - SPATIAL_DIM + 5];
    if viewpoints >= 0.6 && rng.gen_bool(0.5) {
        return Action::Finish.index();
    }
    rng.gen_range(0..Action::COUNT as i64)
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => EngineConfig::load_json(path)?,
        None => EngineConfig::default(),
    };
    let obs_dim = config.frame_dim();

    let options = LoadOptions::new().seed(args.seed).num_positives(args.positives);
    let loader = StopLoader::load(&args.stops, &options)?;
    if loader.is_empty() {
        bail!("no stops in {}", args.stops.display());
    }

    let writer = Arc::new(JsonLogWriter::new(&args.log)?);
    let sink: Arc<dyn CompletionSink> = writer.clone();

    let envs = loader
        .partition(args.envs)
        .into_iter()
        .map(|stops| {
            StreetViewEnv::new(
                config.clone(),
                SimNavigator::new(SimConfig::default()),
                SyntheticDetector::new(config.clone()),
                stops,
                sink.clone(),
            )
        })
        .collect::<Result<Vec<_>>>()?;
    let mut pool = EnvPool::from_envs(envs);

    tracing::info!("Simulating with {} environments", pool.num_envs());
    tracing::info!("  Observation dim: {}", obs_dim);
    tracing::info!("  Stacked dim: {}", DEFAULT_STACK_DEPTH * obs_dim);
    tracing::info!("  Completion log: {}", args.log.display());

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut stacks = vec![FrameStack::new(DEFAULT_STACK_DEPTH, obs_dim); pool.num_envs()];
    let mut active = vec![false; pool.num_envs()];

    for (i, result) in pool.reset().into_iter().enumerate() {
        match result {
            Ok(obs) => {
                stacks[i].reset(&obs)?;
                active[i] = true;
            }
            Err(e) => tracing::warn!("Environment {} could not start: {:#}", i, e),
        }
    }

    let mut completed = 0;
    let mut total_reward = 0.0_f64;
    let mut episode_reward = vec![0.0_f64; pool.num_envs()];

    while completed < args.episodes && active.iter().any(|&a| a) {
        let actions: Vec<i64> =
            stacks.iter().map(|s| choose_action(&mut rng, &s.stacked(), obs_dim)).collect();
        let results = pool.step(&actions);

        for (i, result) in results.into_iter().enumerate() {
            if !active[i] {
                continue;
            }
            let done = match result {
                Ok(step) => {
                    episode_reward[i] += f64::from(step.reward);
                    if !step.info.retry {
                        stacks[i].push(&step.observation)?;
                    }
                    step.terminated
                }
                Err(e) => {
                    tracing::warn!("Environment {} failed: {:#}", i, e);
                    true
                }
            };
            if !done {
                continue;
            }

            completed += 1;
            total_reward += episode_reward[i];
            episode_reward[i] = 0.0;

            match pool.reset_env(i) {
                Ok(obs) => {
                    stacks[i].reset(&obs)?;
                }
                Err(e) => {
                    tracing::info!("Environment {} is done: {:#}", i, e);
                    active[i] = false;
                }
            }
        }
    }

    tracing::info!(
        "Finished {} episodes, mean reward {:.3}",
        completed,
        if completed > 0 { total_reward / completed as f64 } else { 0.0 }
    );

    drop(pool);
    drop(sink);
    match Arc::try_unwrap(writer) {
        Ok(writer) => writer.shutdown()?,
        Err(_) => tracing::warn!("Completion log still shared; flushing on drop"),
    }
    Ok(())
}
