mod buffer;
mod cloud;
mod config;
mod connection;
mod devices;
mod fault;
mod link;
mod scheduler;
mod sensors;
mod state;
mod time_sync;
mod tracker;
mod transport;

use anyhow::Result;
use cloud::{CloudSync, EventDispatcher};
use config::TrackerConfig;
use connection::{ConnectionConfig, ConnectionManager};
use devices::simulated::{SimulatedAccelerometer, SimulatedGps, SimulatedLte, SimulatedModem};
use devices::{GpsReceiver, LteLink, ModemInfoProvider};
use fault::FaultHandler;
use link::LinkSupervisor;
use scheduler::DutyCycleScheduler;
use sensors::SensorPipeline;
use state::TrackerContext;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracker::Tracker;
use transport::TcpCloudTransport;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = TrackerConfig::load(config_path.as_deref())?;

    info!("Cat tracker starting: {}", config.device_id);
    info!("  Cloud: {}", config.cloud.address);
    info!(
        "  Mode: {}, GPS timeout {} s",
        if config.device.active { "active" } else { "passive" },
        config.device.gps_timeout
    );

    let ctx = Arc::new(TrackerContext::new(
        config.device.clone(),
        config.store.capacity,
    ));
    info!("  GPS buffer: {} slots", ctx.store().await.capacity());
    let (fault, mut faults) = FaultHandler::new();

    // Simulated drivers feed the sensor trigger queue
    let (triggers, trigger_rx) = sensors::channel();
    let gps: Arc<dyn GpsReceiver> = Arc::new(SimulatedGps::new(triggers.clone(), 63.4305, 10.3951));
    let modem: Arc<dyn ModemInfoProvider> = Arc::new(SimulatedModem::new(&config.device_id));
    let lte: Arc<dyn LteLink> = Arc::new(SimulatedLte::default());
    let accel = SimulatedAccelerometer::spawn(triggers, Duration::from_secs(45));

    let pipeline = SensorPipeline::new(ctx.clone(), gps.clone(), config.gps_fix_count);
    let mut tasks = vec![
        accel.abort_handle(),
        fault.supervise("sensor", tokio::spawn(pipeline.run(trigger_rx))),
    ];
    info!("Sensor pipeline started");

    // Cloud connection
    let transport = TcpCloudTransport::new(
        config.cloud.address.clone(),
        config.device_id.clone(),
        config.cloud.connect_timeout(),
    );
    let conn_config = ConnectionConfig {
        keepalive: config.cloud.keepalive(),
        reconnect_delay: config.cloud.reconnect_delay(),
    };
    let conn = ConnectionManager::new(conn_config, transport, fault.clone());

    let sync = CloudSync::new(
        ctx.clone(),
        conn.sender(),
        modem.clone(),
        config.features,
        config.store.batch_size,
        config.config_ack_delay(),
    );
    let link = LinkSupervisor::new(lte, modem, ctx.clone());
    let dispatcher = EventDispatcher::new(ctx.clone(), fault.clone());

    let mut tracker = Tracker::new(conn, sync, link, dispatcher);
    tracker.start().await;

    let scheduler = DutyCycleScheduler::new(ctx.clone(), gps, tracker.work_sender());
    tasks.push(fault.supervise("application", tokio::spawn(tracker.run())));
    tasks.push(fault.supervise("scheduler", tokio::spawn(scheduler.run())));
    info!("Duty cycle started");

    tokio::select! {
        shutdown = faults.recv() => match shutdown {
            Some(shutdown) => {
                fault::stop_tasks(&tasks);
                fault::resolve(config.fault_policy, shutdown).await
            }
            None => {
                error!("Fault channel closed");
                Ok(())
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
