use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;
use tracing::error;

/// Global Settings for netssh-rs
/// This file provides a central place to configure timeout values that might
/// need to be adjusted for different environments. Default values are
/// provided for all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SSH-related settings
    pub ssh: SshSettings,
}

/// SSH-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Timeout for blocking libssh2 function calls in seconds (default: 30)
    /// Set to 0 for no timeout
    pub blocking_timeout_secs: u64,

    /// SSH authentication timeout in seconds (default: 30)
    pub auth_timeout_secs: u64,

    /// SSH keepalive interval in seconds (default: 60)
    /// How often to send keepalive packets
    pub keepalive_interval_secs: u64,

    /// SSH channel open timeout in seconds (default: 20)
    pub channel_open_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssh: SshSettings::default(),
        }
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            blocking_timeout_secs: 30,
            auth_timeout_secs: 30,
            keepalive_interval_secs: 60,
            channel_open_timeout_secs: 20,
        }
    }
}

// Global instance of Settings with RwLock for thread-safe access
lazy_static! {
    pub static ref SETTINGS: RwLock<Settings> = RwLock::new(Settings::default());
}

/// Types of SSH timeouts
pub enum SshTimeoutType {
    Blocking,
    Auth,
    ChannelOpen,
    KeepaliveInterval,
}

/// Helper function to get SSH timeouts
pub fn get_ssh_timeout(timeout_type: SshTimeoutType) -> Duration {
    let settings = match SETTINGS.read() {
        Ok(settings) => settings,
        Err(_) => {
            error!("Failed to access global settings, using defaults");
            return match timeout_type {
                SshTimeoutType::Blocking => Duration::from_secs(1),
                SshTimeoutType::Auth => Duration::from_secs(30),
                SshTimeoutType::ChannelOpen => Duration::from_secs(20),
                SshTimeoutType::KeepaliveInterval => Duration::from_secs(60),
            };
        }
    };

    match timeout_type {
        SshTimeoutType::Blocking => Duration::from_secs(settings.ssh.blocking_timeout_secs),
        SshTimeoutType::Auth => Duration::from_secs(settings.ssh.auth_timeout_secs),
        SshTimeoutType::ChannelOpen => Duration::from_secs(settings.ssh.channel_open_timeout_secs),
        SshTimeoutType::KeepaliveInterval => {
            Duration::from_secs(settings.ssh.keepalive_interval_secs)
        }
    }
}
