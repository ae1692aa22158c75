use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::info;

use rotation_sampler::{
    init_logging, sensor::SensorHandle, BroadcastNotifier, Database, SamplingController,
    SettingsStore, SimulatedRotationSensor,
};

const DEFAULT_RUN_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let data_dir = std::env::var("ROTATION_SAMPLER_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("rotation-data"));
    let run_secs = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<u64>())
        .transpose()
        .context("run duration must be a whole number of seconds")?
        .unwrap_or(DEFAULT_RUN_SECS);

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let config = settings.config();
    if !config.enabled {
        info!("Rotation sampling disabled in settings; nothing to do");
        return Ok(());
    }
    // Keep the generated device id stable across runs.
    settings.update(config.clone())?;

    let database = Database::new(data_dir.join("rotation.sqlite3"))?;
    let notifier = Arc::new(BroadcastNotifier::new(64));
    let mut events = notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("event: {event}");
        }
    });

    let sensor: Arc<dyn SensorHandle> = Arc::new(SimulatedRotationSensor::new());
    let controller = SamplingController::new(Some(sensor), Arc::new(database.clone()), notifier);

    controller.start(config).await?;
    for _ in 0..run_secs {
        tokio::time::sleep(Duration::from_secs(1)).await;
        info!(
            "current rate: {} readings/s ({} accepted/s)",
            controller.current_rate(),
            controller.accepted_rate()
        );
    }
    let summary = controller.stop().await?;
    controller.request_sync().await?;

    info!(
        "Stored {} samples this run, {} total in {}",
        summary.samples_flushed,
        database.count_samples().await?,
        database.path().display()
    );
    Ok(())
}
