use crawler_core::{DeviceType, NetsshConfig, NetsshError};
use indexmap::IndexMap;
use serde_json::Value;

/// A structured record produced by the parser adapter for one parsed row.
pub type ParsedRecord = IndexMap<String, Value>;

/// The subset of `crawler_core::DeviceSession` the worker pool drives a
/// device through. Abstracted into a trait (spec.md §9's "tagged enum +
/// small dispatch table" redesign extends naturally to mocking this seam)
/// so worker-loop tests can substitute canned SSH output instead of
/// dialing a real device.
pub trait DeviceDriver: Send {
    fn detect_os(&mut self) -> Result<DeviceType, NetsshError>;
    fn run(&mut self, command: &str) -> Result<String, NetsshError>;
    fn run_and_parse(
        &mut self,
        command: &str,
    ) -> Result<(String, Option<Vec<ParsedRecord>>), NetsshError>;
    fn disconnect(&mut self);
}

impl DeviceDriver for crawler_core::DeviceSession {
    fn detect_os(&mut self) -> Result<DeviceType, NetsshError> {
        crawler_core::DeviceSession::detect_os(self)
    }

    fn run(&mut self, command: &str) -> Result<String, NetsshError> {
        crawler_core::DeviceSession::run(self, command)
    }

    fn run_and_parse(
        &mut self,
        command: &str,
    ) -> Result<(String, Option<Vec<ParsedRecord>>), NetsshError> {
        crawler_core::DeviceSession::run_and_parse(self, command)
    }

    fn disconnect(&mut self) {
        crawler_core::DeviceSession::disconnect(self)
    }
}

/// Opens one `DeviceDriver` per device. Kept as a trait (rather than
/// calling `DeviceSession::new` directly from the pool) so tests can inject
/// a factory that hands back canned sessions instead of dialing real SSH
/// endpoints.
pub trait SessionFactory: Send + Sync {
    fn open(&self, address: &str) -> Box<dyn DeviceDriver>;
}

/// Opens a real SSH session for every device, sharing one set of
/// credentials (spec.md §5: "Credentials are shared read-only after
/// coordinator start").
pub struct SshSessionFactory {
    pub username: String,
    pub password: Option<String>,
}

impl SessionFactory for SshSessionFactory {
    fn open(&self, address: &str) -> Box<dyn DeviceDriver> {
        let mut config = NetsshConfig::default();
        config.host = address.to_string();
        config.username = self.username.clone();
        config.password = self.password.clone();
        Box::new(crawler_core::DeviceSession::with_config(config))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub Driver {}

        impl DeviceDriver for Driver {
            fn detect_os(&mut self) -> Result<DeviceType, NetsshError>;
            fn run(&mut self, command: &str) -> Result<String, NetsshError>;
            fn run_and_parse(
                &mut self,
                command: &str,
            ) -> Result<(String, Option<Vec<ParsedRecord>>), NetsshError>;
            fn disconnect(&mut self);
        }
    }
}
