pub mod base_connection;
pub mod channel;
pub mod config;
pub mod device_session;
pub mod device_type;
pub mod error;
pub mod session_log;
pub mod settings;
pub mod vendor_error_patterns;

#[macro_use]
extern crate lazy_static;

// Patterns shared by the transport layer for output cleanup.
pub mod patterns {
    use regex::Regex;

    lazy_static! {
        pub static ref ANSI_ESCAPE_PATTERN: Regex = Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").unwrap();
        pub static ref CRLF_PATTERN: Regex = Regex::new(r"\r\n").unwrap();
    }
}

pub use base_connection::BaseConnection;
pub use config::{NetsshConfig, NetsshConfigBuilder};
pub use device_session::DeviceSession;
pub use device_type::{classify_show_version, DeviceType};
pub use error::NetsshError;
pub use settings::{get_ssh_timeout, Settings, SshTimeoutType};
