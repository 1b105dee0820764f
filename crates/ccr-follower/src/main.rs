use anyhow::{Context, Result};
use ccr_follower::{FollowerConfig, IndexPattern};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ccr-follower")]
#[command(about = "Cross-cluster replication follower tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate a follower config file.
    Validate {
        #[arg(
            short,
            long,
            env = "CCR_FOLLOWER_CONFIG",
            default_value = "/etc/ccr-follower/follower.toml"
        )]
        config: PathBuf,
    },
    /// Print the default config as TOML.
    Defaults,
    /// Show which index names a leader pattern selects.
    Match {
        #[arg(short, long)]
        pattern: String,
        names: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { config } => validate(&config),
        Command::Defaults => {
            print!("{}", FollowerConfig::default().to_toml()?);
            Ok(())
        }
        Command::Match { pattern, names } => {
            let pattern = IndexPattern::parse(&pattern)?;
            for name in names {
                let verdict = if pattern.matches(&name) { "match" } else { "skip" };
                println!("{}\t{}", verdict, name);
            }
            Ok(())
        }
    }
}

fn validate(path: &Path) -> Result<()> {
    let config = FollowerConfig::from_file(path)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::info!(rules = config.rules.len(), "Config is valid: {}", path.display());

    let s = &config.settings;
    println!(
        "poll={}ms retry={}ms jobs={} writers={}",
        s.autofollow_poll_interval_ms,
        s.autofollow_retry_interval_ms,
        s.autofollow_concurrent_jobs,
        s.concurrent_writers_per_shard
    );
    for rule in &config.rules {
        println!("{}\t{}\t{}", rule.name, rule.leader_alias, rule.pattern);
    }
    Ok(())
}
