//! Configuration portal as console prompts.
//!
//! The host has no radio, so "serving the portal" means asking for each
//! form field on stdin with the prefilled value as default, and
//! "connecting" means checking that credentials were entered. Station
//! credentials are kept in a JSON file, like the driver keeps them in NVS
//! on the device.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use wifiprov_core::portal::{KEY_DAY, KEY_PASSWORD, KEY_SSID};
use wifiprov_core::{
    PortalInfo, PortalOutcome, PortalParam, PortalRequest, ProvisionError, Provisioner, RawFields,
    WifiCredentials, Weekday,
};

/// Address the portal pretends to serve on.
pub const PORTAL_IP: &str = "192.168.4.1";

/// Station address reported after a simulated connect.
pub const STATION_IP: &str = "127.0.0.1";

/// Lines of operator input, read with a deadline.
pub struct LineSource {
    rx: mpsc::Receiver<String>,
}

impl LineSource {
    /// Read lines from stdin on a background thread.
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("stdin read failed: {}", e);
                            break;
                        }
                    }
                }
            });
        if let Err(e) = reader {
            warn!("Failed to spawn stdin reader: {}", e);
        }
        Self { rx }
    }

    /// A fixed script of lines. Running past the end behaves like a timeout.
    pub fn scripted<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::channel();
        for line in lines {
            let _ = tx.send(line.into());
        }
        Self { rx }
    }

    /// Next line, or `None` once the deadline passes or input ends.
    fn next_line(&self, deadline: Instant) -> Option<String> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.rx.recv_timeout(remaining).ok()
    }
}

/// [`Provisioner`] driven from the console.
pub struct ConsoleProvisioner {
    input: LineSource,
    credentials_path: PathBuf,
    offline: bool,
}

impl ConsoleProvisioner {
    pub fn new(input: LineSource, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            input,
            credentials_path: credentials_path.into(),
            offline: false,
        }
    }

    /// Make every connect attempt fail, as if the network were out of range.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Saved station credentials, if any.
    pub fn saved_credentials(&self) -> Option<WifiCredentials> {
        let text = fs::read_to_string(&self.credentials_path).ok()?;
        match serde_json::from_str(&text) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                warn!(
                    "Ignoring unreadable credentials in {}: {}",
                    self.credentials_path.display(),
                    e
                );
                None
            }
        }
    }

    fn save_credentials(&self, credentials: &WifiCredentials) -> Result<(), ProvisionError> {
        let json = serde_json::to_string_pretty(credentials)
            .map_err(|e| ProvisionError::Driver(e.to_string()))?;
        fs::write(&self.credentials_path, json).map_err(|e| {
            ProvisionError::Driver(format!(
                "saving credentials to {}: {}",
                self.credentials_path.display(),
                e
            ))
        })
    }

    fn connect(&self, credentials: &WifiCredentials, timeout: Duration) -> Option<String> {
        info!("Connecting to '{}'...", credentials.ssid);
        if self.offline {
            warn!(
                "Network '{}' unreachable after {:?}",
                credentials.ssid, timeout
            );
            return None;
        }
        Some(STATION_IP.to_string())
    }

    /// Prompt for one value. `None` on timeout.
    fn ask(&self, prompt: &str, default: &str, deadline: Instant) -> Option<String> {
        let mut out = io::stdout().lock();
        let _ = write!(out, "{} [{}]: ", prompt, default);
        let _ = out.flush();
        drop(out);

        let line = self.input.next_line(deadline)?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            Some(default.to_string())
        } else {
            Some(line.to_string())
        }
    }

    fn serve_portal(
        &mut self,
        request: &PortalRequest<'_>,
        on_portal: &mut dyn FnMut(&PortalInfo),
    ) -> Result<PortalOutcome, ProvisionError> {
        on_portal(&PortalInfo {
            ssid: request.ssid.to_string(),
            ip: PORTAL_IP.to_string(),
        });
        println!(
            "Configuration portal '{}' open for {}s. Press Enter to keep a value.",
            request.ssid,
            request.portal_timeout.as_secs()
        );

        let deadline = Instant::now() + request.portal_timeout;
        let mut fields = RawFields::new();

        let previous = self.saved_credentials();
        let ssid_default = previous.as_ref().map(|c| c.ssid.as_str()).unwrap_or("");
        let Some(ssid) = self.ask("SSID", ssid_default, deadline) else {
            return Ok(PortalOutcome::timed_out());
        };
        fields.insert(KEY_SSID, ssid);
        let Some(password) = self.ask("Password", "", deadline) else {
            return Ok(PortalOutcome::timed_out());
        };
        fields.insert(KEY_PASSWORD, password);

        for param in request.form.params() {
            let PortalParam::Input {
                id,
                label,
                value,
                attributes,
                ..
            } = param
            else {
                continue;
            };

            if attributes.contains("checkbox") {
                let default = if attributes.contains("checked") { "y" } else { "n" };
                let Some(answer) = self.ask(&format!("{} (y/n)", label), default, deadline) else {
                    return Ok(PortalOutcome::timed_out());
                };
                // An unchecked box is left out of the submission.
                if answer.eq_ignore_ascii_case("y") {
                    fields.insert(id.as_str(), value.as_str());
                }
            } else if id == KEY_DAY {
                for day in Weekday::ALL {
                    println!("  {} = {}", day.index(), day.name());
                }
                let Some(answer) = self.ask("Day of week", value, deadline) else {
                    return Ok(PortalOutcome::timed_out());
                };
                fields.insert(id.as_str(), answer);
            } else {
                let Some(answer) = self.ask(label, value, deadline) else {
                    return Ok(PortalOutcome::timed_out());
                };
                fields.insert(id.as_str(), answer);
            }
        }
        debug!(?fields, "Portal submission");

        let Some(credentials) = fields.credentials() else {
            warn!("No SSID entered");
            return Ok(PortalOutcome::timed_out());
        };

        match self.connect(&credentials, request.connect_timeout) {
            Some(ip) => {
                self.save_credentials(&credentials)?;
                Ok(PortalOutcome::submitted(ip, fields))
            }
            None => Ok(PortalOutcome::timed_out()),
        }
    }
}

impl Provisioner for ConsoleProvisioner {
    fn start_config_portal(
        &mut self,
        request: &PortalRequest<'_>,
        on_portal: &mut dyn FnMut(&PortalInfo),
    ) -> Result<PortalOutcome, ProvisionError> {
        self.serve_portal(request, on_portal)
    }

    fn auto_connect(
        &mut self,
        request: &PortalRequest<'_>,
        on_portal: &mut dyn FnMut(&PortalInfo),
    ) -> Result<PortalOutcome, ProvisionError> {
        if let Some(credentials) = self.saved_credentials() {
            if let Some(ip) = self.connect(&credentials, request.connect_timeout) {
                return Ok(PortalOutcome::connected(ip));
            }
        } else {
            info!("No saved credentials");
        }
        self.serve_portal(request, on_portal)
    }
}
