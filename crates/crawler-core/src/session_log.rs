use crate::error::NetsshError;
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;

/// Optional raw transcript of a device session, enabled by `--debug` or
/// `NetsshConfig::enable_session_log`. Every byte written to or read from the
/// wire is appended here with a timestamp, independent of structured logging.
pub struct SessionLog {
    file: Option<File>,
    enabled: bool,
}

impl SessionLog {
    pub fn new() -> Self {
        SessionLog {
            file: None,
            enabled: false,
        }
    }

    pub fn enable(&mut self, path: &str) -> Result<(), NetsshError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).map_err(NetsshError::IoError)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(true)
            .open(path)
            .map_err(NetsshError::IoError)?;

        writeln!(file, "{}", "=".repeat(80)).map_err(NetsshError::IoError)?;
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        writeln!(file, "SESSION START: {}", timestamp).map_err(NetsshError::IoError)?;
        writeln!(file, "{}", "=".repeat(80)).map_err(NetsshError::IoError)?;
        file.flush().map_err(NetsshError::IoError)?;

        self.file = Some(file);
        self.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self) {
        if self.enabled {
            if let Some(mut file) = self.file.take() {
                let _ = writeln!(file, "\n{}", "=".repeat(80));
                let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
                let _ = writeln!(file, "SESSION END: {}", timestamp);
                let _ = writeln!(file, "{}", "=".repeat(80));
            }
            self.enabled = false;
        }
    }

    pub fn log_command(&mut self, command: &str, output: &str) -> Result<(), NetsshError> {
        if let Some(file) = self.file.as_mut() {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            writeln!(file, "\n{}", "-".repeat(80)).map_err(NetsshError::IoError)?;
            writeln!(file, "Command Executed [{}]", timestamp).map_err(NetsshError::IoError)?;
            writeln!(file, "{}", "-".repeat(80)).map_err(NetsshError::IoError)?;
            writeln!(file, "Input:").map_err(NetsshError::IoError)?;
            writeln!(file, "{}", command).map_err(NetsshError::IoError)?;
            writeln!(file, "\nOutput:").map_err(NetsshError::IoError)?;
            writeln!(file, "{}", output.trim()).map_err(NetsshError::IoError)?;
            writeln!(file, "{}", "-".repeat(80)).map_err(NetsshError::IoError)?;
            file.flush().map_err(NetsshError::IoError)?;
        }
        Ok(())
    }

    pub fn write_raw(&mut self, data: &[u8]) -> Result<(), NetsshError> {
        if let Some(file) = self.file.as_mut() {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            writeln!(file, "\n{}", "-".repeat(80)).map_err(NetsshError::IoError)?;
            writeln!(file, "Raw Data Written [{}]", timestamp).map_err(NetsshError::IoError)?;
            writeln!(file, "{}", "-".repeat(80)).map_err(NetsshError::IoError)?;
            writeln!(file, "Hex: {:02X?}", data).map_err(NetsshError::IoError)?;
            if let Ok(text) = String::from_utf8(data.to_vec()) {
                writeln!(file, "Text: {}", text).map_err(NetsshError::IoError)?;
            }
            writeln!(file, "{}", "-".repeat(80)).map_err(NetsshError::IoError)?;
            file.flush().map_err(NetsshError::IoError)?;
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.enabled
    }

    /// Alias for `is_active` used at call sites that read more naturally in
    /// the negative ("if not enabled, skip").
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn write(&mut self, data: &str) -> Result<(), NetsshError> {
        self.write_raw(data.as_bytes())
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        self.disable();
    }
}
