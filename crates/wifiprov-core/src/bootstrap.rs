//! The provisioning bootstrap.
//!
//! On start the device decides between two modes:
//!
//! - **Config mode**: bring up an access point and serve the configuration
//!   portal. Entered when the device was double-reset or has no usable
//!   saved settings.
//! - **Normal mode**: connect with the saved network credentials.
//!
//! Either mode ends connected or failed. A failure is not retried in place:
//! the device waits a moment and restarts, re-entering the whole sequence.
//!
//! ```text
//! Init -> DoubleResetCheck -> SettingsLoad -> ModeDecision
//!      -> ConfigMode | NormalMode -> Connected | Failed (restart)
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::BootConfig;
use crate::display::{CharDisplay, StatusScreen};
use crate::portal::{settings_from_fields, PortalForm, RawFields};
use crate::reset::ResetDetector;
use crate::settings::DeviceSettings;
use crate::store::{FlashFs, LoadOutcome, SettingsStore};

/// Number of indicator toggles signalling a detected double reset.
pub const DOUBLE_RESET_TOGGLES: usize = 9;

/// Which way the device brings up its network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Serve the configuration portal.
    Config,
    /// Connect with saved credentials.
    Normal,
}

/// Phases of the bootstrap state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPhase {
    Init,
    DoubleResetCheck,
    SettingsLoad,
    ModeDecision,
    ConfigMode,
    NormalMode,
    Connected,
    /// Terminal. The only way out is a restart.
    Failed,
}

impl fmt::Display for BootPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where the configuration portal can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalInfo {
    pub ssid: String,
    pub ip: String,
}

/// How a mode ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectResult {
    /// Joined a network as a station.
    Connected { ip: String },
    /// Timed out without connecting.
    Failed,
}

/// What the provisioner reports after running a mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalOutcome {
    pub result: ConnectResult,
    /// Whether the operator submitted the portal form.
    pub submitted: bool,
    /// Raw values of the submitted form. Empty unless `submitted`.
    pub fields: RawFields,
}

impl PortalOutcome {
    /// Connected without any portal submission.
    pub fn connected(ip: impl Into<String>) -> Self {
        Self {
            result: ConnectResult::Connected { ip: ip.into() },
            submitted: false,
            fields: RawFields::new(),
        }
    }

    /// Connected after the operator submitted the form.
    pub fn submitted(ip: impl Into<String>, fields: RawFields) -> Self {
        Self {
            result: ConnectResult::Connected { ip: ip.into() },
            submitted: true,
            fields,
        }
    }

    /// Timed out.
    pub fn timed_out() -> Self {
        Self {
            result: ConnectResult::Failed,
            submitted: false,
            fields: RawFields::new(),
        }
    }
}

/// Everything a provisioner needs to run either mode.
#[derive(Debug, Clone, Copy)]
pub struct PortalRequest<'a> {
    /// SSID of the configuration access point.
    pub ssid: &'a str,
    /// Passphrase of the configuration access point.
    pub password: &'a str,
    /// Device parameters to show on the portal.
    pub form: &'a PortalForm,
    pub portal_timeout: Duration,
    pub connect_timeout: Duration,
}

/// Errors from the WiFi provisioning service.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The WiFi driver failed.
    #[error("WiFi driver error: {0}")]
    Driver(String),

    /// The portal could not be served.
    #[error("Portal error: {0}")]
    Portal(String),
}

/// WiFi provisioning service: station connect plus configuration portal.
///
/// Both calls block until they connect or time out. A timeout is reported
/// as [`ConnectResult::Failed`], not as an error.
pub trait Provisioner {
    /// Serve the portal unconditionally, then connect with what was entered.
    ///
    /// `on_portal` is called once the access point is up.
    fn start_config_portal(
        &mut self,
        request: &PortalRequest<'_>,
        on_portal: &mut dyn FnMut(&PortalInfo),
    ) -> Result<PortalOutcome, ProvisionError>;

    /// Connect with saved credentials.
    ///
    /// If that is impossible (none saved, or the network is unreachable) the
    /// portal is served as in [`Provisioner::start_config_portal`].
    fn auto_connect(
        &mut self,
        request: &PortalRequest<'_>,
        on_portal: &mut dyn FnMut(&PortalInfo),
    ) -> Result<PortalOutcome, ProvisionError>;
}

/// The status output, usually a single LED.
pub trait Indicator {
    fn set(&mut self, on: bool);

    fn toggle(&mut self);
}

/// Process-level services.
pub trait System {
    fn delay(&mut self, duration: Duration);

    /// Restart the device. On hardware this does not return.
    fn restart(&mut self);
}

/// Errors that end the bootstrap.
#[derive(Debug, Error)]
pub enum BootError {
    /// Neither mode reached a connection in time.
    #[error("Failed to connect in {mode:?} mode and hit timeout")]
    ConnectFailed { mode: Mode },

    #[error("Provisioning failed in {mode:?} mode: {source}")]
    Provision {
        mode: Mode,
        #[source]
        source: ProvisionError,
    },
}

/// Result of a successful boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootOutcome {
    pub mode: Mode,
    pub ip: String,
    /// Settings in effect after boot.
    pub settings: DeviceSettings,
    /// Whether portal settings were written to flash.
    pub saved: bool,
}

/// Decide the mode from the double-reset signal and the load result.
pub fn decide_mode(double_reset: bool, load: &LoadOutcome) -> Mode {
    if double_reset || !load.is_loaded() {
        Mode::Config
    } else {
        Mode::Normal
    }
}

/// Convert and persist portal fields if the form was submitted.
///
/// Returns the settings now in effect and whether they reached flash.
/// A failed write keeps the new settings in memory.
pub fn maybe_save_settings<F: FlashFs>(
    store: &mut SettingsStore<F>,
    current: DeviceSettings,
    submitted: bool,
    fields: &RawFields,
) -> (DeviceSettings, bool) {
    if !submitted {
        return (current, false);
    }

    let settings = settings_from_fields(fields);
    info!(
        label = %settings.label,
        count = settings.count,
        flag = settings.flag,
        day = %settings.weekday(),
        "Applying portal settings"
    );

    match store.save(&settings) {
        Ok(()) => (settings, true),
        Err(e) => {
            warn!("Failed to save settings: {}", e);
            (settings, false)
        }
    }
}

/// One run of the provisioning bootstrap.
pub struct Bootstrap<'a, F: FlashFs> {
    config: &'a BootConfig,
    store: &'a mut SettingsStore<F>,
    detector: &'a mut dyn ResetDetector,
    provisioner: &'a mut dyn Provisioner,
    indicator: &'a mut dyn Indicator,
    system: &'a mut dyn System,
    screen: Option<StatusScreen<&'a mut dyn CharDisplay>>,
    phase: BootPhase,
}

impl<'a, F: FlashFs> Bootstrap<'a, F> {
    pub fn new(
        config: &'a BootConfig,
        store: &'a mut SettingsStore<F>,
        detector: &'a mut dyn ResetDetector,
        provisioner: &'a mut dyn Provisioner,
        indicator: &'a mut dyn Indicator,
        system: &'a mut dyn System,
    ) -> Self {
        Self {
            config,
            store,
            detector,
            provisioner,
            indicator,
            system,
            screen: None,
            phase: BootPhase::Init,
        }
    }

    /// Show progress on a character display.
    pub fn with_display(mut self, display: &'a mut dyn CharDisplay) -> Self {
        self.screen = Some(StatusScreen::new(display));
        self
    }

    pub fn phase(&self) -> BootPhase {
        self.phase
    }

    /// Run the whole sequence.
    ///
    /// On failure the device is restarted through [`System::restart`] after
    /// the configured delay, and the error is returned for platforms where
    /// restart returns.
    pub fn run(mut self) -> Result<BootOutcome, BootError> {
        if let Some(screen) = self.screen.as_mut() {
            screen.banner();
        }

        self.enter(BootPhase::DoubleResetCheck);
        let double_reset = self.detector.detect_double_reset();
        if double_reset {
            info!("Forcing config mode as there was a double reset detected");
            self.blink_double_reset();
        }

        self.enter(BootPhase::SettingsLoad);
        let load = match self.store.load() {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Settings storage unavailable: {}", e);
                LoadOutcome::NotFound
            }
        };
        match &load {
            LoadOutcome::Loaded(_) => {}
            LoadOutcome::NotFound => info!("Forcing config mode as there is no saved config"),
            LoadOutcome::Corrupt(reason) => {
                info!("Forcing config mode as the saved config is unreadable: {}", reason)
            }
        }

        self.enter(BootPhase::ModeDecision);
        let mode = decide_mode(double_reset, &load);
        let settings = load.settings_or(DeviceSettings::default());
        info!(?mode, "Mode decided");

        let config = self.config;
        let form = PortalForm::for_settings(&settings);
        let request = PortalRequest {
            ssid: &config.portal_ssid,
            password: &config.portal_password,
            form: &form,
            portal_timeout: config.portal_timeout(),
            connect_timeout: config.connect_timeout(),
        };

        self.indicator.set(false);
        let result = {
            let screen = &mut self.screen;
            let mut on_portal = |info: &PortalInfo| {
                info!("Entered config mode");
                info!("Config SSID: {}", info.ssid);
                info!("Config IP address: {}", info.ip);
                if let Some(screen) = screen.as_mut() {
                    screen.portal(&info.ssid, &info.ip);
                }
            };

            match mode {
                Mode::Config => {
                    self.phase = BootPhase::ConfigMode;
                    debug!(phase = %self.phase, "Boot phase");
                    self.provisioner
                        .start_config_portal(&request, &mut on_portal)
                }
                Mode::Normal => {
                    self.phase = BootPhase::NormalMode;
                    debug!(phase = %self.phase, "Boot phase");
                    self.provisioner.auto_connect(&request, &mut on_portal)
                }
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(source) => {
                error!("Provisioning failed: {}", source);
                return Err(self.fail(BootError::Provision { mode, source }));
            }
        };

        let ip = match outcome.result {
            ConnectResult::Connected { ip } => ip,
            ConnectResult::Failed => {
                error!("Failed to connect and hit timeout");
                return Err(self.fail(BootError::ConnectFailed { mode }));
            }
        };

        self.enter(BootPhase::Connected);
        self.indicator.set(true);
        info!("WiFi connected, IP address: {}", ip);
        if let Some(screen) = self.screen.as_mut() {
            screen.connected(&ip);
        }

        let (settings, saved) =
            maybe_save_settings(self.store, settings, outcome.submitted, &outcome.fields);
        if saved {
            self.indicator.set(true);
        }

        Ok(BootOutcome {
            mode,
            ip,
            settings,
            saved,
        })
    }

    fn enter(&mut self, phase: BootPhase) {
        debug!(from = %self.phase, to = %phase, "Boot phase");
        self.phase = phase;
    }

    fn blink_double_reset(&mut self) {
        for i in 0..DOUBLE_RESET_TOGGLES {
            if i > 0 {
                self.system.delay(self.config.blink_interval());
            }
            self.indicator.toggle();
        }
    }

    fn fail(&mut self, err: BootError) -> BootError {
        self.enter(BootPhase::Failed);
        if let Some(screen) = self.screen.as_mut() {
            screen.restarting();
        }
        warn!("Restarting in {} ms", self.config.restart_delay().as_millis());
        self.system.delay(self.config.restart_delay());
        // A software restart is not an operator reset.
        self.detector.stop();
        self.system.restart();
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_mode() {
        let loaded = LoadOutcome::Loaded(DeviceSettings::default());
        assert_eq!(decide_mode(false, &loaded), Mode::Normal);
        assert_eq!(decide_mode(true, &loaded), Mode::Config);
        assert_eq!(decide_mode(false, &LoadOutcome::NotFound), Mode::Config);
        assert_eq!(
            decide_mode(false, &LoadOutcome::Corrupt("bad".into())),
            Mode::Config
        );
        assert_eq!(decide_mode(true, &LoadOutcome::NotFound), Mode::Config);
    }

    #[test]
    fn test_maybe_save_skips_when_not_submitted() {
        let mut store = SettingsStore::new(crate::store::MemoryFs::new(), "/s.json");
        let current = DeviceSettings::default();
        let (settings, saved) =
            maybe_save_settings(&mut store, current.clone(), false, &RawFields::new());
        assert_eq!(settings, current);
        assert!(!saved);
        assert!(store.fs().file("/s.json").is_none());
    }

    #[test]
    fn test_maybe_save_keeps_settings_when_write_fails() {
        let mut store = SettingsStore::new(crate::store::MemoryFs::broken(), "/s.json");
        let fields: RawFields = [("key_num", "5")].into_iter().collect();
        let (settings, saved) =
            maybe_save_settings(&mut store, DeviceSettings::default(), true, &fields);
        assert_eq!(settings.count, 5);
        assert!(!saved);
    }
}
