use crate::base_connection::BaseConnection;
use crate::config::NetsshConfig;
use crate::device_type::{classify_show_version, DeviceType};
use crate::error::NetsshError;
use indexmap::IndexMap;
use serde_json::Value;
use std::net::TcpStream;
use std::time::Duration;
use tracing::{debug, warn};

/// An authenticated, interactive shell to one device. Connects lazily: the
/// SSH handshake only happens on the first `detect_os()` or `run()` call, and
/// the same channel is reused for every subsequent command until
/// `disconnect()`.
pub struct DeviceSession {
    config: NetsshConfig,
    connection: Option<BaseConnection>,
    detected_os: Option<DeviceType>,
    precheck_reachability: bool,
}

impl DeviceSession {
    pub fn new(address: impl Into<String>, username: impl Into<String>, password: Option<String>) -> Self {
        let mut config = NetsshConfig::default();
        config.host = address.into();
        config.username = username.into();
        config.password = password;

        DeviceSession {
            config,
            connection: None,
            detected_os: None,
            precheck_reachability: true,
        }
    }

    pub fn with_config(config: NetsshConfig) -> Self {
        DeviceSession {
            config,
            connection: None,
            detected_os: None,
            precheck_reachability: true,
        }
    }

    /// Disable the best-effort TCP reachability probe. Some networks block
    /// even a bare TCP SYN to port 22 on firewalled hops; this check is never
    /// required for correctness.
    pub fn disable_reachability_precheck(&mut self) {
        self.precheck_reachability = false;
    }

    fn reachable(&self) -> bool {
        if !self.precheck_reachability {
            return true;
        }
        let addr = format!("{}:{}", self.config.host, self.config.default_port);
        match addr.parse() {
            Ok(socket_addr) => TcpStream::connect_timeout(&socket_addr, Duration::from_secs(5)).is_ok(),
            // Hostnames don't parse as a SocketAddr; skip the precheck and let
            // the real connect attempt do DNS resolution.
            Err(_) => true,
        }
    }

    fn ensure_connected(&mut self) -> Result<&mut BaseConnection, NetsshError> {
        if self.connection.is_none() {
            if !self.reachable() {
                return Err(NetsshError::ConnectionError(format!(
                    "{} is not reachable",
                    self.config.host
                )));
            }

            let mut connection = BaseConnection::with_config(self.config.clone())?;
            connection.connect(
                Some(&self.config.host),
                Some(&self.config.username),
                self.config.password.as_deref(),
                Some(self.config.default_port),
                Some(self.config.connection_timeout),
            )?;
            connection.test_channel_read(None, None)?;
            connection.set_base_prompt(None, None, None, None)?;
            self.connection = Some(connection);
        }
        Ok(self.connection.as_mut().expect("just connected"))
    }

    /// Runs the banner-and-prompt probe (§4.1): disable paging generically,
    /// send `show version`, classify against the ordered substring table.
    /// Result is cached; repeated calls don't re-probe the device.
    pub fn detect_os(&mut self) -> Result<DeviceType, NetsshError> {
        if let Some(detected) = self.detected_os {
            return Ok(detected);
        }

        let connection = self.ensure_connected()?;
        let _ = connection.disable_paging(Some("terminal length 0"), Some(true), None);

        let output = connection.send_command(
            "show version",
            None,
            Some(20.0),
            Some(true),
            Some(true),
            Some(true),
            Some(true),
            Some(true),
        )?;

        let detected = classify_show_version(&output);

        // The probe above disables paging with the generic command before
        // the family is known; now that it's classified, re-issue with the
        // OS-appropriate command (spec.md §4.1: ASA uses `terminal pager 0`)
        // so later `run()` calls see unpaged output.
        let _ = connection.disable_paging(Some(detected.disable_paging_command()), Some(true), None);

        debug!(host = %self.config.host, ?detected, "autodetect complete");
        self.detected_os = Some(detected);
        Ok(detected)
    }

    /// Runs a command and returns its raw text. Error banners in the output
    /// (`% Invalid input`, …) are returned as-is; classifying them is the
    /// caller's job.
    pub fn run(&mut self, command: &str) -> Result<String, NetsshError> {
        let connection = self.ensure_connected()?;
        connection.send_command(
            command,
            None,
            None,
            Some(true),
            Some(true),
            Some(true),
            Some(true),
            Some(true),
        )
    }

    /// Runs a command and attempts to parse it into structured records via
    /// the platform's TextFSM templates. A parse failure never fails the
    /// call: it logs and returns `(raw, None)` so the raw text is always
    /// available to the caller.
    pub fn run_and_parse(
        &mut self,
        command: &str,
    ) -> Result<(String, Option<Vec<IndexMap<String, Value>>>), NetsshError> {
        let raw = self.run(command)?;
        let platform = self
            .detected_os
            .unwrap_or(DeviceType::Unknown)
            .as_platform_str();

        let parsed = crawler_parser::parse(platform, command, &raw);
        if parsed.is_none() {
            warn!(platform, command, "run_and_parse: no structured result, returning raw text only");
        }
        Ok((raw, parsed))
    }

    /// Idempotent; swallows transport errors since there's nothing useful to
    /// do with a failure while tearing down.
    pub fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.disconnect() {
                debug!(host = %self.config.host, error = %e, "disconnect: transport error ignored");
            }
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
