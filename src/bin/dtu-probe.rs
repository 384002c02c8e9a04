//! Diagnostic binary for the AhoyDTU REST API.
//!
//! Usage:
//!   cargo run --bin dtu-probe -- --dtu-url http://192.168.1.10
//!
//! Lists the inverters configured on the DTU and prints the snapshot the
//! bridge would derive from each one. With `--watch N` it repeats every
//! N seconds until Ctrl+C.

use chrono::Local;
use clap::Parser;
use log::{info, warn};
use std::time::Duration;

use inverter_property_bridge::config::{Config, load_dotenv};
use inverter_property_bridge::device::{DcChannel, Snapshot};
use inverter_property_bridge::error::Result;
use inverter_property_bridge::input::ahoy::{DtuClient, FieldLayout, InverterListEntry, apply_record};

#[derive(Parser, Debug)]
#[command(about = "Print inverter snapshots read from an AhoyDTU")]
struct Cli {
    /// Base URL of the AhoyDTU
    #[arg(long, env = "AHOY_DTU_URL")]
    dtu_url: Option<String>,

    /// Repeat every N seconds
    #[arg(long)]
    watch: Option<u64>,
}

async fn probe(client: &DtuClient, entries: &[InverterListEntry], layout: &FieldLayout) {
    for entry in entries {
        let mut snapshot = Snapshot::new(&entry.name, &entry.serial);
        snapshot.dc = vec![DcChannel::default(); entry.channels];
        match client.inverter(entry.id).await {
            Ok(record) => {
                apply_record(&mut snapshot, &record, layout, Local::now(), 30);
                match serde_json::to_string_pretty(&snapshot) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("Failed to encode snapshot: {}", e),
                }
            }
            Err(e) => warn!("Failed to read inverter {}: {}", entry.id, e),
        }
    }
}

fn main() -> Result<()> {
    // Load .env file before anything else
    load_dotenv();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    run(Cli::parse())
}

#[tokio::main]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();
    let url = cli.dtu_url.unwrap_or(config.dtu.url);

    let client = DtuClient::new(&url, Duration::from_secs(config.dtu.request_timeout_secs))?;
    info!("Probing AhoyDTU at {}", client.base_url());

    let list = client.inverter_list().await?;
    for entry in &list.inverter {
        info!(
            "  #{} {} serial {} ({} DC input(s)){}",
            entry.id,
            entry.name,
            entry.serial,
            entry.channels,
            if entry.enabled { "" } else { " [disabled]" }
        );
    }
    let entries: Vec<InverterListEntry> =
        list.inverter.into_iter().filter(|e| e.enabled).collect();

    let layout = client.field_layout().await.unwrap_or_else(|e| {
        warn!("Field layout unavailable, using defaults: {}", e);
        FieldLayout::default()
    });

    let Some(watch) = cli.watch else {
        probe(&client, &entries, &layout).await;
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(watch.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => probe(&client, &entries, &layout).await,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }
    Ok(())
}
