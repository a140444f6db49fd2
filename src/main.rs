use clap::{Parser, Subcommand};
use indego_client::config::Config;
use indego_client::services::watch;
use indego_client::{IndegoClient, MowerCommand, env_file};
use log::{error, info, warn};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "indego",
    version,
    about = "Talk to a Bosch Indego lawn mower through the Bosch cloud",
    long_about = None
)]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Refresh everything and print a summary
    Status,
    /// Send a command: mow, pause or returnToDock
    Command { command: MowerCommand },
    /// Enable or disable SmartMowing
    Mode { enabled: String },
    /// Print the mower's mobile network details
    Network,
    /// Print the next scheduled mow
    NextMow,
    /// List the account's alerts
    Alerts,
    /// Save the garden map as SVG
    Map { path: PathBuf },
    /// Follow state changes with long-polls
    Watch,
}

fn run(command: Command) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (api_url={}, serial={}, longpoll_timeout={}s, watch_interval={}s)",
        cfg.client.api_url,
        cfg.client.serial.as_deref().unwrap_or("-"),
        cfg.longpoll_timeout,
        cfg.watch_interval.as_secs()
    );
    let longpoll_timeout = cfg.longpoll_timeout;
    let watch_interval = cfg.watch_interval;

    // 2) Log in
    let mut client = IndegoClient::new(cfg.client);
    let authenticated = client.start().map_err(|e| format!("Login failed: {}", e))?;
    if !authenticated {
        return Err("Login rejected; check the credentials".into());
    }
    let serial = client.serial().ok_or("No mower found in this account")?;
    info!("Authenticated, using mower {}", serial);

    // 3) Do the thing
    match command {
        Command::Status => {
            for e in client.update_all(false) {
                warn!("{}", e);
            }
            print!("{}", client.data());
        }
        Command::Command { command } => {
            let accepted = client.put_command(command.as_str()).map_err(|e| e.to_string())?;
            if !accepted {
                return Err(format!("Command {} was not accepted", command));
            }
            println!("{} sent", command);
        }
        Command::Mode { enabled } => {
            let enabled = indego_client::command::parse_mow_mode(&enabled).map_err(|e| e.to_string())?;
            let accepted = client.put_mow_mode(enabled).map_err(|e| e.to_string())?;
            if !accepted {
                return Err("Mow mode change was not accepted".into());
            }
            println!("SmartMowing {}", if enabled { "enabled" } else { "disabled" });
        }
        Command::Network => match client.get_network().map_err(|e| e.to_string())? {
            Some(network) => println!(
                "mcc={} mnc={} rssi={} mode={}",
                or_dash(network.mcc),
                or_dash(network.mnc),
                or_dash(network.rssi),
                network.curr_mode.as_deref().unwrap_or("-")
            ),
            None => println!("No network data available"),
        },
        Command::NextMow => match client.get_next_mow().map_err(|e| e.to_string())? {
            Some(next) => println!("{}", next.to_rfc3339()),
            None => println!("No mow scheduled"),
        },
        Command::Alerts => {
            let alerts = client.get_alerts().map_err(|e| e.to_string())?;
            if alerts.is_empty() {
                println!("No alerts");
            }
            for (index, alert) in alerts.iter().enumerate() {
                println!(
                    "[{}] {} {} ({}){}",
                    index,
                    alert.date.map(|d| d.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
                    alert.headline.as_deref().unwrap_or(&alert.alert_description),
                    alert.error_code.as_deref().unwrap_or("-"),
                    if alert.read_status.as_deref() == Some("unread") { " *" } else { "" }
                );
            }
        }
        Command::Map { path } => {
            if !client.download_map(Some(path.as_path())).map_err(|e| e.to_string())? {
                return Err("No map received".into());
            }
            println!("Map saved to {}", path.display());
        }
        Command::Watch => {
            info!(
                "Starting watch loop: longpoll_timeout={}s, interval={}s",
                longpoll_timeout,
                watch_interval.as_secs()
            );
            watch::run_loop(&mut client, longpoll_timeout, watch_interval, None)?;
        }
    }

    Ok(())
}

fn or_dash(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn main() {
    let cli = Cli::parse();
    let loaded_env = match env_file::load(cli.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} new variable(s))",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "indego {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
