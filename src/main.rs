use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use contagion::{config::Config, flock::Flock};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Run {
        #[arg(long)]
        seed: Option<u64>,
    },

    Check,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mut cfg = Config::from_file(&args.config)
        .with_context(|| format!("failed to load {:?}", args.config))?;
    log::info!("{cfg:#?}");

    match args.command {
        Command::Run { seed } => {
            if seed.is_some() {
                cfg.init.seed = seed;
            }

            let mut flock = Flock::new(&cfg).context("failed to construct flock")?;
            flock
                .run(cfg.run.n_steps, cfg.run.steps_per_log)
                .context("failed to run simulation")?;

            log::info!("final census: {}", flock.census());
        }
        Command::Check => log::info!("config is valid"),
    }

    Ok(())
}
