use clap::Parser;
use inverter_property_bridge::config::{Config, PublisherKind, load_dotenv};
use inverter_property_bridge::device::DeviceDiscovery;
use inverter_property_bridge::error::BridgeError;
use inverter_property_bridge::input::{AhoyDtu, SimulatedDtu};
use inverter_property_bridge::publish::{LogPublisher, MqttPublisher, PropertyPublisher};
use inverter_property_bridge::thing::{consumer_channel, discover_and_build};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Publish AhoyDTU inverter readings as typed, push-updated properties.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Base URL of the AhoyDTU
    #[arg(long, env = "AHOY_DTU_URL")]
    dtu_url: Option<String>,

    /// Seconds between polls of each inverter
    #[arg(long, env = "AHOY_POLL_INTERVAL")]
    poll_interval: Option<u64>,

    /// Description attached to every published thing
    #[arg(long, env = "THING_DESCRIPTION")]
    description: Option<String>,

    /// Protocol layer: mqtt or log
    #[arg(long, env = "PUBLISHER")]
    publisher: Option<PublisherKind>,

    #[arg(long, env = "MQTT_BROKER_HOST")]
    mqtt_host: Option<String>,

    #[arg(long, env = "MQTT_BROKER_PORT")]
    mqtt_port: Option<u16>,

    #[arg(long, env = "MQTT_BASE_TOPIC")]
    base_topic: Option<String>,

    /// Simulate this many inverters instead of polling a DTU
    #[arg(long, default_value_t = 0)]
    simulate: usize,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.dtu_url {
            config.dtu.url = url;
        }
        if let Some(interval) = self.poll_interval {
            config.dtu.poll_interval_secs = interval;
        }
        if let Some(description) = self.description {
            config.thing.description = description;
        }
        if let Some(publisher) = self.publisher {
            config.publisher = publisher;
        }
        if let Some(host) = self.mqtt_host {
            config.mqtt.broker_host = host;
        }
        if let Some(port) = self.mqtt_port {
            config.mqtt.broker_port = port;
        }
        if let Some(base_topic) = self.base_topic {
            config.mqtt.base_topic = base_topic;
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Load .env file before anything else
    load_dotenv();
    init_logger();
    run(Cli::parse());
}

#[tokio::main]
async fn run(cli: Cli) {
    let simulate = cli.simulate;
    let mut config = Config::from_env();
    cli.apply(&mut config);

    info!("Starting Inverter Property Bridge");
    info!("Configuration loaded:");
    if simulate > 0 {
        info!("  Simulated inverters: {}", simulate);
    } else {
        info!("  DTU URL: {}", config.dtu.url);
    }
    info!("  Poll interval: {}s", config.dtu.poll_interval_secs);
    info!("  Publisher: {}", config.publisher);

    let cancel = CancellationToken::new();
    let (consumer, consumer_loop) = consumer_channel();

    let mut mqtt_task = None;
    let publisher: Arc<dyn PropertyPublisher> = match config.publisher {
        PublisherKind::Mqtt => {
            info!(
                "  MQTT broker: {}:{} (base topic {})",
                config.mqtt.broker_host, config.mqtt.broker_port, config.mqtt.base_topic
            );
            let (publisher, connection) = match MqttPublisher::new(&config.mqtt) {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Failed to set up MQTT: {}", e);
                    std::process::exit(1);
                }
            };
            mqtt_task = Some(tokio::spawn(
                connection.run(consumer.clone(), cancel.child_token()),
            ));
            Arc::new(publisher)
        }
        PublisherKind::Log => Arc::new(LogPublisher),
    };

    let dtu = AhoyDtu::new(&config.dtu, cancel.child_token());
    let simulation = SimulatedDtu::new(
        simulate,
        Duration::from_secs(config.dtu.poll_interval_secs.max(1)),
        cancel.child_token(),
    );
    let (discovery, target): (&dyn DeviceDiscovery, &str) = if simulate > 0 {
        (&simulation, "simulation")
    } else {
        (&dtu, config.dtu.url.as_str())
    };

    let things = match discover_and_build(
        discovery,
        target,
        &config.thing.description,
        publisher,
        &consumer,
    )
    .await
    {
        Ok(things) => things,
        Err(BridgeError::NoDevicesFound(target)) => {
            error!("No inverters found at {}", target);
            cancel.cancel();
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to set up inverters: {}", e);
            cancel.cancel();
            std::process::exit(1);
        }
    };
    info!("Publishing {} inverter(s)", things.len());

    let consumer_task = tokio::spawn(consumer_loop.run(things, cancel.child_token()));

    info!("Inverter Property Bridge is running");
    info!("  - Press Ctrl+C to exit");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    cancel.cancel();
    dtu.join().await;
    if let Err(e) = consumer_task.await {
        error!("Consumer task failed: {}", e);
    }
    if let Some(task) = mqtt_task
        && let Err(e) = task.await
    {
        error!("MQTT task failed: {}", e);
    }

    info!("Inverter Property Bridge stopped");
}
