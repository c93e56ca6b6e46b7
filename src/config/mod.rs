use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Port the original desktop app hard-coded for both roles
pub const DEFAULT_PORT: u16 = 5000;

/// Capacity of one receive-loop read; text messages are expected to fit
/// in a single read of this size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Chat transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Port to listen on or dial
    pub port: u16,

    /// Directory where received files are written
    pub download_dir: PathBuf,

    /// Display name announced to the peer after connecting
    pub display_name: String,

    /// Size of one receive-loop read
    pub read_buffer_size: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let display_name = std::env::var("USER").unwrap_or_else(|_| "anonymous".to_string());
        Self {
            port: DEFAULT_PORT,
            download_dir: PathBuf::from(format!("{}/.lanchat/downloads", home)),
            display_name,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ChatConfig {
    /// Load configuration from file or create default
    pub fn load_or_default(config_path: Option<&str>) -> Self {
        if let Some(config) = config_path
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
        {
            return config;
        }
        Self::default()
    }

    /// Save configuration to file
    pub fn save_to_file(&self, config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Ensure the download directory exists
    pub fn ensure_directories(&self) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(&self.download_dir)
    }

    /// Validate configuration. Port 0 is allowed: it asks the OS for an
    /// ephemeral port.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.read_buffer_size == 0 {
            return Err("Read buffer size must be greater than 0".into());
        }

        if self.display_name.trim().is_empty() {
            return Err("Display name must not be empty".into());
        }

        Ok(())
    }
}
