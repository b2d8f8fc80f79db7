//! Host port allocation for scaled units
//!
//! A port is free when none of the configured listening-socket probes
//! reports it bound and it has not already been handed out by this
//! allocator. The check is best effort: a port can still be claimed between
//! the probe and the create call, in which case the create fails for that
//! unit only.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DockyardError;

/// Source of the host's listening ports
#[async_trait]
pub trait PortProbe: Send + Sync {
    /// Ports currently bound for listening. A probe that cannot run reports none.
    async fn bound_ports(&self) -> HashSet<u16>;
}

/// Probe running a socket listing tool such as `netstat -ln` or `ss -ln`
#[derive(Debug, Clone)]
pub struct HostPortProbe {
    program: String,
    args: Vec<String>,
}

impl HostPortProbe {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn netstat() -> Self {
        Self::new("netstat", &["-ln"])
    }

    pub fn ss() -> Self {
        Self::new("ss", &["-ln"])
    }
}

#[async_trait]
impl PortProbe for HostPortProbe {
    async fn bound_ports(&self) -> HashSet<u16> {
        match Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => parse_listening_ports(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                debug!("Port probe {} unavailable: {}", self.program, e);
                HashSet::new()
            }
        }
    }
}

/// Probe reporting a fixed set of ports
#[derive(Debug, Clone, Default)]
pub struct StaticPortProbe {
    bound: HashSet<u16>,
}

impl StaticPortProbe {
    pub fn new(bound: impl IntoIterator<Item = u16>) -> Self {
        Self {
            bound: bound.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PortProbe for StaticPortProbe {
    async fn bound_ports(&self) -> HashSet<u16> {
        self.bound.clone()
    }
}

/// Extract every `addr:port` column from a socket listing
pub fn parse_listening_ports(output: &str) -> HashSet<u16> {
    output
        .split_whitespace()
        .filter_map(|token| token.rsplit_once(':'))
        .filter_map(|(_, port)| port.parse::<u16>().ok())
        .collect()
}

/// Allocator scanning an inclusive port range in ascending order
pub struct PortAllocator {
    start: u16,
    end: u16,
    probes: Vec<Box<dyn PortProbe>>,
    reserved: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(start: u16, end: u16, probes: Vec<Box<dyn PortProbe>>) -> Self {
        Self {
            start,
            end,
            probes,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Allocator consulting both `netstat` and `ss`
    pub fn host(start: u16, end: u16) -> Self {
        Self::new(
            start,
            end,
            vec![Box::new(HostPortProbe::netstat()), Box::new(HostPortProbe::ss())],
        )
    }

    /// First port in range that no probe reports bound and that has not been
    /// handed out before
    pub async fn next_available_port(&self) -> Result<u16, DockyardError> {
        let mut bound = HashSet::new();
        for probe in &self.probes {
            bound.extend(probe.bound_ports().await);
        }

        let mut reserved = self.reserved.lock().unwrap_or_else(|e| e.into_inner());
        for port in self.start..=self.end {
            if !bound.contains(&port) && reserved.insert(port) {
                debug!("Allocated host port {}", port);
                return Ok(port);
            }
        }

        Err(DockyardError::PortsExhausted {
            start: self.start,
            end: self.end,
        })
    }

    /// Return a port that ended up unused
    pub fn release(&self, port: u16) {
        let mut reserved = self.reserved.lock().unwrap_or_else(|e| e.into_inner());
        reserved.remove(&port);
    }
}
