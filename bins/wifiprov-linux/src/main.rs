use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wifiprov_core::{Bootstrap, DoubleResetDetector, ResetDetector, SettingsStore};
use wifiprov_host::console::{ConsoleProvisioner, LineSource};
use wifiprov_host::display::LogDisplay;
use wifiprov_host::fs::DirFs;
use wifiprov_host::led::LogIndicator;
use wifiprov_host::reset::FileFlagStore;
use wifiprov_host::system::HostSystem;
use wifiprov_host::DataDir;

/// Set to make every connect attempt fail.
const OFFLINE_ENV: &str = "WIFIPROV_OFFLINE";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,wifiprov_core=debug,wifiprov_host=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data = DataDir::from_env();
    std::fs::create_dir_all(data.root())
        .with_context(|| format!("creating {}", data.root().display()))?;
    tracing::info!("Data directory: {}", data.root().display());

    let config = data.load_boot_config()?;
    let offline = std::env::var_os(OFFLINE_ENV).is_some();

    let mut store = SettingsStore::new(DirFs::new(data.flash()), config.settings_path.clone());
    let mut detector = DoubleResetDetector::new(
        FileFlagStore::new(data.reset_flag()),
        config.double_reset_window(),
    );
    let mut provisioner =
        ConsoleProvisioner::new(LineSource::stdin(), data.credentials()).offline(offline);
    let mut led = LogIndicator::new();
    let mut system = HostSystem::new();
    let mut lcd = LogDisplay::new();

    tracing::info!("Provisioning bootstrap starting...");
    tracing::info!(
        "Restart within {}s to force the configuration portal",
        config.double_reset_window_secs
    );

    let outcome = Bootstrap::new(
        &config,
        &mut store,
        &mut detector,
        &mut provisioner,
        &mut led,
        &mut system,
    )
    .with_display(&mut lcd)
    .run()?;

    tracing::info!(
        mode = ?outcome.mode,
        saved = outcome.saved,
        "Setup complete, IP address {}",
        outcome.ip
    );
    tracing::info!("Settings: {}", serde_json::to_string(&outcome.settings)?);

    // Keep the double-reset window open until it times out.
    while detector.is_waiting() {
        detector.poll();
        std::thread::sleep(POLL_INTERVAL);
    }
    tracing::info!("Double-reset window closed");

    Ok(())
}
