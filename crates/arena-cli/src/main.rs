//! Thin synchronous front end: load a config, run the engine, print the
//! structured results. All formatting lives here; the engine only hands
//! out read-only snapshots.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use arena_core::tournament::Tournament;
use contracts::{FinalStanding, TournamentConfig};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn print_usage() {
    println!("arena-cli <command>");
    println!("commands:");
    println!("  run [config.json] [seed]");
    println!("    run a tournament; seed overrides the config file");
    println!("  demo [seed]");
    println!("    run the built-in default configuration");
    println!("  config");
    println!("    print the default configuration as JSON");
    println!("  validate <config.json>");
    println!("    check a configuration without running it");
}

fn init_logger(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn parse_seed(value: Option<&String>) -> Result<Option<u64>> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("invalid seed: {raw}")),
    }
}

fn load_config(path: &str) -> Result<TournamentConfig> {
    let raw = fs::read_to_string(Path::new(path))
        .with_context(|| format!("cannot read config file {path}"))?;
    let config: TournamentConfig =
        serde_json::from_str(&raw).with_context(|| format!("cannot parse config file {path}"))?;
    Ok(config)
}

fn print_standings(standings: &[FinalStanding]) {
    println!("final standings:");
    for standing in standings {
        let status = if standing.winner {
            "winner"
        } else if standing.alive {
            "alive"
        } else {
            "eliminated"
        };
        println!(
            "  {:>2}. {:<12} {:>8.2} pts  crashes={} jumps={} [{}]",
            standing.rank,
            standing.name,
            standing.score,
            standing.crash_count,
            standing.jump_count,
            status
        );
    }
}

fn run_tournament(mut config: TournamentConfig, seed_override: Option<u64>) -> Result<()> {
    if seed_override.is_some() {
        config.seed = seed_override;
    }

    let mut tournament = Tournament::new(config).context("configuration rejected")?;
    let standings = tournament.run();

    print_standings(&standings);
    println!();
    println!("seed: {} (re-run with this seed to reproduce)", tournament.seed());

    let summaries = serde_json::to_string_pretty(tournament.set_summaries())
        .context("serialize set summaries")?;
    println!("set summaries:\n{summaries}");
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let verbose = env::var("ARENA_LOG").map(|v| v == "debug").unwrap_or(false);
    init_logger(verbose);

    match args.get(1).map(String::as_str) {
        Some("run") => {
            let Some(path) = args.get(2) else {
                print_usage();
                bail!("missing config path");
            };
            let config = load_config(path)?;
            let seed = parse_seed(args.get(3))?;
            run_tournament(config, seed)
        }
        Some("demo") => {
            let seed = parse_seed(args.get(2))?;
            run_tournament(TournamentConfig::default(), seed)
        }
        Some("config") => {
            let config = TournamentConfig::default();
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("serialize default config")?
            );
            Ok(())
        }
        Some("validate") => {
            let Some(path) = args.get(2) else {
                print_usage();
                bail!("missing config path");
            };
            let config = load_config(path)?;
            config.validate().context("configuration rejected")?;
            println!("ok: {} agents, {} sets x {} rounds", config.agents.len(), config.sets, config.rounds_per_set);
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}
