//! Desktop simulator for the gasnode H2S telemetry node.
//!
//! Runs the real duty cycle from `gasnode-core` against host adapters: a
//! synthetic ADC, a relay that appends accepted notes to a JSONL outbox, a
//! buffer file on disk and a watchdog thread that exits the process when
//! starved. Kill it mid-run and start it again to watch buffered readings
//! survive the "reset".
//!
//! # Environment
//!
//! | Variable                      | Default               | Meaning                               |
//! |-------------------------------|-----------------------|---------------------------------------|
//! | `GASNODE_CONFIG`              | unset                 | JSON file with a `NodeConfig`         |
//! | `GASNODE_RELAY`               | `online`              | `online`, `offline` or `flaky`        |
//! | `GASNODE_TIME_SCALE`          | `1`                   | Simulated seconds per real second     |
//! | `GASNODE_CYCLES`              | unset (forever)       | Number of cycles to run               |
//! | `GASNODE_BUFFER_PATH`         | `sensor_buffer.txt`   | Durable buffer file                   |
//! | `GASNODE_OUTBOX_PATH`         | `relay_outbox.jsonl`  | Where the relay writes accepted notes |
//! | `GASNODE_SEED`                | fixed                 | Seed for sensor and relay randomness  |
//! | `GASNODE_SENSOR_FAILURE_RATE` | `0`                   | Chance a single ADC read fails        |
//! | `GASNODE_RELAY_FAILURE_RATE`  | `0.3`                 | Chance a flaky relay drops a request  |
//! | `GASNODE_LIGHT_SLEEP`         | `on`                  | `off` forces the idle fallback        |
//!
//! Node settings (`GASNODE_READ_INTERVAL_SECS`, `GASNODE_MAX_BUFFER_SIZE`, ...)
//! override the config file. `.env` is read first; `RUST_LOG` sets the log
//! level (default `info`).

mod config;
mod platform;
mod relay;
mod sensor;
mod store;

use embassy_futures::block_on;
use gasnode_core::{NodeParts, RelayConnection, Supervisor};
use log::{error, info};

use config::SimConfig;
use platform::{SimClock, SimPower, SoftWatchdog, TimeScale};
use relay::SimRelay;
use sensor::SimulatedSensor;
use store::FileLineStore;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting gasnode simulator");

    let config = match SimConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let store = FileLineStore::new(&config.buffer_path);
    info!(
        "Relay {:?}, time scale {}x, buffer {}, outbox {}",
        config.relay,
        config.time_scale,
        store.path().display(),
        config.outbox_path.display()
    );

    let scale = TimeScale::new(config.time_scale);
    let parts = NodeParts {
        sensor: SimulatedSensor::new(config.seed, config.sensor_failure_rate),
        clock: SimClock::new(scale),
        power: SimPower::new(scale, config.light_sleep),
        store,
        transport: SimRelay::new(
            config.relay,
            &config.outbox_path,
            config.seed.wrapping_add(1),
            config.relay_failure_rate,
        ),
        watchdog: SoftWatchdog::spawn(scale),
    };

    block_on(async {
        let mut node = Supervisor::boot(config.node.clone(), parts).await;

        match config.cycles {
            Some(cycles) => {
                let summary = node.run_cycles(cycles).await;
                let outbox = match node.session().relay() {
                    RelayConnection::Available(relay) => relay.accepted(),
                    RelayConnection::Unavailable(_) => 0,
                };
                info!(
                    "Finished {} cycles: {} sent, {} buffered, {} dropped, {} faults",
                    summary.cycles, summary.sent, summary.buffered, summary.dropped, summary.faults
                );
                info!(
                    "{} readings pending in buffer, {} requests in relay outbox",
                    node.buffer_mut().len(),
                    outbox
                );
            }
            None => node.run().await,
        }
    });

    info!("Simulator exiting");
}
