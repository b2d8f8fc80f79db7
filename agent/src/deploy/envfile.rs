//! Reading deployment switches from an application's env file
//!
//! The file is newline-delimited `KEY=VALUE`. Only `PORT` and
//! `ZERO_DOWNTIME` are interpreted here; the path itself is handed to the
//! runtime untouched.

use std::path::Path;

use crate::filesys::file::File;

pub const PORT_KEY: &str = "PORT";
pub const ZERO_DOWNTIME_KEY: &str = "ZERO_DOWNTIME";

/// Read-only view of an env file. A missing or unreadable file has no keys.
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    contents: String,
}

impl EnvFile {
    pub fn parse(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }

    pub async fn load(path: &Path) -> Self {
        match File::new(path).read_string().await {
            Ok(contents) => Self::parse(contents),
            Err(e) => {
                tracing::debug!("Env file {} not readable: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Value of the first line assigning `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.contents.lines().find_map(|line| {
            let (k, v) = line.trim().split_once('=')?;
            (k.trim() == key).then(|| v.trim())
        })
    }

    /// `ZERO_DOWNTIME` as a switch: `0/false/no/off/n` turn it off, any
    /// other value turns it on. `None` when the key is absent.
    pub fn zero_downtime(&self) -> Option<bool> {
        self.get(ZERO_DOWNTIME_KEY).map(|value| {
            !matches!(
                value.to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off" | "n"
            )
        })
    }

    /// Blue/green is on unless the env file turns it off
    pub fn zero_downtime_enabled(&self) -> bool {
        self.zero_downtime().unwrap_or(true)
    }

    /// `PORT` if it parses, else `default`
    pub fn container_port(&self, default: Option<u16>) -> Option<u16> {
        self.get(PORT_KEY)
            .and_then(|port| port.parse().ok())
            .or(default)
    }
}
