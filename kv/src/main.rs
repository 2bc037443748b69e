use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use kvstore::cli::{Cli, Command};
use kvstore::config::Config;
use kvstore::{FileBackend, KvBackend, entry_size};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let store_path = cli.dir.unwrap_or(config.store_path);

    info!("kv opening {}", store_path.display());
    let store = FileBackend::open(&store_path)
        .with_context(|| format!("Failed to open store at {}", store_path.display()))?
        .with_quota(config.quota_bytes);

    match cli.command {
        Command::Get { key } => match store.get_item(&key).await? {
            Some(value) => println!("{}", value),
            None => {
                eprintln!("{} No value for key: {}", "✗".red(), key.yellow());
                std::process::exit(1);
            }
        },
        Command::Set { key, value } => {
            serde_json::from_str::<serde_json::Value>(&value).context("Value is not valid JSON")?;
            store.set_item(&key, &value).await?;
            println!("{} Stored {}", "✓".green(), key.cyan());
        }
        Command::Remove { key } => {
            store.remove_item(&key).await?;
            println!("{} Removed {}", "✓".green(), key.cyan());
        }
        Command::Keys => {
            let keys = store.keys().await?;
            if keys.is_empty() {
                println!("No keys found");
            } else {
                for key in keys {
                    println!("{}", key);
                }
            }
        }
        Command::Size => {
            let mut total = 0u64;
            for key in store.keys().await? {
                if let Some(value) = store.get_item(&key).await? {
                    let size = entry_size(&key, &value);
                    total += size;
                    println!("{:>10} {}", size.to_string().dimmed(), key);
                }
            }
            println!("{:>10} {}", total.to_string().bold(), "total".bold());
        }
    }

    Ok(())
}
