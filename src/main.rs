#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use clap::Parser;
use cook::fleet::client::SshConnector;
use cook::fleet::{Executor, Registry, SessionPool, Settings, SettingsOverrides, watch_config};
use dotenv::dotenv;
use tokio::io::BufReader;
use tracing::{error, info, warn};

/// Run shell commands on tagged groups of SSH servers.
#[derive(Debug, Parser)]
#[command(name = "cook", version, about)]
struct Args {
    /// Servers file
    #[arg(long = "conf", env = "COOK_CONFIG", default_value = "./config.yaml")]
    conf: PathBuf,

    /// Per-host dial timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Post-login handshake timeout in seconds
    #[arg(long)]
    verify_timeout: Option<u64>,

    /// How long to wait for a broadcast command, in seconds
    #[arg(long)]
    exec_timeout: Option<u64>,

    /// Dial retries for transient failures
    #[arg(long)]
    max_retries: Option<u32>,

    /// Initial retry delay in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            connect_timeout_secs: self.connect_timeout,
            verify_timeout_secs: self.verify_timeout,
            exec_timeout_secs: self.exec_timeout,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

fn welcome() {
    println!("Welcome to cook!");
    println!("  connect --all            connect to every server");
    println!("  connect --tags t1,t2     connect to servers carrying any of the tags");
    println!("  exec <command>           run a command on every connected server");
    println!("  sessions                 list connected servers");
    println!("  disconnect <label>       close one connection");
    println!("  tags                     list known tags");
    println!("  quit                     close all connections and exit");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let registry = match Registry::load(&args.conf) {
        Ok(registry) => registry,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    info!(
        "load {} servers, {} tags",
        registry.servers().len(),
        registry.tags().len()
    );
    let registry = Arc::new(RwLock::new(registry));

    let _watcher = match watch_config(args.conf.clone(), registry.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Config hot reload disabled: {}", e);
            None
        }
    };

    let settings = Settings::resolve(args.overrides());
    let pool = SessionPool::new(
        Arc::new(SshConnector::new(settings.dial)),
        settings.verify_timeout,
    );
    let executor = Executor::new(registry, pool, settings.exec_timeout);

    welcome();
    executor
        .serve(
            BufReader::new(tokio::io::stdin()),
            tokio::signal::ctrl_c(),
        )
        .await;
    Ok(())
}
