//! WiFi provisioning for ESP32.
//!
//! Normal mode joins the network saved in NVS. Config mode (or a failed
//! normal connect) brings up a soft AP with a small HTTP server serving the
//! portal form, waits for a submission, then joins the submitted network.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use embedded_svc::{
    http::{Headers, Method},
    io::{Read, Write},
    wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{delay::FreeRtos, modem::Modem, peripheral},
    http::server::{Configuration as HttpConfiguration, EspHttpConnection, EspHttpServer, Request},
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use wifiprov_core::portal::decode_form;
use wifiprov_core::{
    PortalInfo, PortalOutcome, PortalRequest, ProvisionError, Provisioner, RawFields,
    WifiCredentials,
};

use crate::nvs;

/// Form submissions are posted here.
pub const SAVE_PATH: &str = "/wifisave";

const MAX_HTTP_BODY: usize = 2048;
const CONNECT_POLL_MS: u32 = 100;
const AP_CHANNEL: u8 = 1;

const SAVED_HTML: &str = "<!DOCTYPE html><html><body>\
    <p>Credentials saved. Trying to connect to the network...</p>\
    <p>If it fails, reconnect to the portal and try again.</p>\
    </body></html>";

/// [`Provisioner`] backed by the ESP-IDF WiFi driver.
pub struct WifiProvisioner {
    wifi: BlockingWifi<EspWifi<'static>>,
    nvs: EspNvs<NvsDefault>,
}

impl WifiProvisioner {
    pub fn new(
        modem: impl peripheral::Peripheral<P = Modem> + 'static,
        sysloop: EspSystemEventLoop,
        partition: EspDefaultNvsPartition,
    ) -> Result<Self> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(partition.clone()))?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
        Ok(Self {
            wifi,
            nvs: nvs::open(partition)?,
        })
    }

    /// Join a network as a station.
    ///
    /// Returns the assigned IP address, or `None` if the link did not come up
    /// within `timeout`.
    fn connect_station(
        &mut self,
        credentials: &WifiCredentials,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let ssid = credentials.ssid.as_str();
        let password = credentials.password.as_str();
        if ssid.is_empty() {
            bail!("WiFi SSID cannot be empty");
        }

        let auth_method = if password.is_empty() {
            info!("WiFi password is empty, using open network");
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        if self.wifi.is_started()? {
            self.wifi.stop()?;
        }
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: ssid
                    .try_into()
                    .map_err(|_| anyhow!("SSID too long (max 32 chars)"))?,
                password: password
                    .try_into()
                    .map_err(|_| anyhow!("Password too long (max 64 chars)"))?,
                auth_method,
                ..Default::default()
            }))?;
        self.wifi.start()?;

        info!("Connecting to '{}'...", ssid);
        if let Err(e) = self.wifi.wifi_mut().connect() {
            warn!("Connect request failed: {}", e);
            return Ok(None);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let up = self.wifi.is_connected().unwrap_or(false)
                && self.wifi.wifi().sta_netif().is_up().unwrap_or(false);
            if up {
                break;
            }
            if Instant::now() >= deadline {
                warn!("No connection to '{}' within {:?}", ssid, timeout);
                let _ = self.wifi.wifi_mut().disconnect();
                return Ok(None);
            }
            FreeRtos::delay_ms(CONNECT_POLL_MS);
        }

        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        info!("WiFi connected!");
        info!("  IP address: {}", ip_info.ip);
        info!("  Gateway:    {}", ip_info.subnet.gateway);
        info!("  Netmask:    {}", ip_info.subnet.mask);
        Ok(Some(ip_info.ip.to_string()))
    }

    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<String> {
        if self.wifi.is_started()? {
            self.wifi.stop()?;
        }
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        self.wifi
            .set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
                ssid: ssid
                    .try_into()
                    .map_err(|_| anyhow!("portal SSID too long"))?,
                password: password
                    .try_into()
                    .map_err(|_| anyhow!("portal password too long"))?,
                auth_method,
                channel: AP_CHANNEL,
                ..Default::default()
            }))?;
        self.wifi.start()?;
        self.wifi.wait_netif_up()?;

        let ip = self.wifi.wifi().ap_netif().get_ip_info()?.ip;
        info!("Portal AP '{}' up at {}", ssid, ip);
        Ok(ip.to_string())
    }

    fn serve_portal(
        &mut self,
        request: &PortalRequest<'_>,
        on_portal: &mut dyn FnMut(&PortalInfo),
    ) -> Result<PortalOutcome> {
        let ip = self.start_access_point(request.ssid, request.password)?;
        on_portal(&PortalInfo {
            ssid: request.ssid.to_string(),
            ip,
        });

        let page = request.form.render_page(request.ssid, SAVE_PATH);
        let (tx, rx) = mpsc::channel();
        let server = start_portal_server(page, tx)?;
        let submission = rx.recv_timeout(request.portal_timeout);
        drop(server);

        let fields = match submission {
            Ok(fields) => fields,
            Err(_) => {
                info!("Portal closed after {:?} without a submission", request.portal_timeout);
                self.wifi.stop()?;
                return Ok(PortalOutcome::timed_out());
            }
        };

        let Some(credentials) = fields.credentials() else {
            warn!("Portal submission without an SSID");
            self.wifi.stop()?;
            return Ok(PortalOutcome::timed_out());
        };

        match self.connect_station(&credentials, request.connect_timeout)? {
            Some(ip) => {
                if let Err(e) = nvs::save_credentials(&mut self.nvs, &credentials) {
                    warn!("Failed to save credentials: {:#}", e);
                }
                Ok(PortalOutcome::submitted(ip, fields))
            }
            None => Ok(PortalOutcome::timed_out()),
        }
    }
}

impl Provisioner for WifiProvisioner {
    fn start_config_portal(
        &mut self,
        request: &PortalRequest<'_>,
        on_portal: &mut dyn FnMut(&PortalInfo),
    ) -> Result<PortalOutcome, ProvisionError> {
        self.serve_portal(request, on_portal)
            .map_err(|e| ProvisionError::Portal(format!("{:#}", e)))
    }

    fn auto_connect(
        &mut self,
        request: &PortalRequest<'_>,
        on_portal: &mut dyn FnMut(&PortalInfo),
    ) -> Result<PortalOutcome, ProvisionError> {
        match nvs::load_credentials(&self.nvs) {
            Some(credentials) => {
                let connected = self
                    .connect_station(&credentials, request.connect_timeout)
                    .map_err(|e| ProvisionError::Driver(format!("{:#}", e)))?;
                if let Some(ip) = connected {
                    return Ok(PortalOutcome::connected(ip));
                }
            }
            None => info!("No saved credentials"),
        }
        self.start_config_portal(request, on_portal)
    }
}

fn start_portal_server(
    page: String,
    submissions: mpsc::Sender<RawFields>,
) -> Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 10 * 1024,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
        req.into_ok_response()?.write_all(page.as_bytes())?;
        Ok(())
    })?;

    server.fn_handler::<anyhow::Error, _>(SAVE_PATH, Method::Post, move |mut req| {
        let body = read_request_body(&mut req)?;
        let fields = decode_form(&String::from_utf8_lossy(&body));
        if submissions.send(fields).is_err() {
            warn!("Portal submission arrived after the portal closed");
        }
        req.into_ok_response()?.write_all(SAVED_HTML.as_bytes())?;
        Ok(())
    })?;

    Ok(server)
}

fn read_request_body(req: &mut Request<&mut EspHttpConnection<'_>>) -> Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_HTTP_BODY {
        bail!("request body too large");
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)
            .map_err(|e| anyhow!("reading request body: {:?}", e))?;
    }
    Ok(body)
}
