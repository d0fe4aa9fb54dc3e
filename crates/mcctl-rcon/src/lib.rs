//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Remote console bridge for live in-game commands."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Remote console bridge.
//!
//! Each call opens a connection, authenticates, runs one command, and closes.
//! No administrative socket outlives a call.

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use mcctl_common::CommandExecutionResult;

mod client;
pub mod packet;

pub use client::RconClient;
pub use packet::{Packet, PacketType};

/// Error type for console exchanges. Every variant is recoverable by the caller.
#[derive(Debug, thiserror::Error)]
pub enum RconError {
    /// The server rejected the pre-shared password.
    #[error("console authentication failed")]
    AuthenticationFailed,
    /// Nothing is accepting console connections at the address.
    #[error("console connection to {addr} refused")]
    ConnectionRefused {
        /// Address that was dialled.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// No complete reply arrived within the bound.
    #[error("console did not respond within {0:?}")]
    Timeout(Duration),
    /// The server sent a frame that does not follow the protocol.
    #[error("console protocol violation: {0}")]
    Protocol(String),
    /// Other socket failure.
    #[error("console i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Where and how to reach one instance's console.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsoleTarget {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Pre-shared console password.
    pub password: String,
}

impl ConsoleTarget {
    /// `host:port` form used for dialling.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConsoleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Capability interface for executing one in-game command.
#[async_trait]
pub trait ConsoleBridge: Send + Sync {
    /// Run `command` against `target` and return the textual reply as stdout.
    async fn execute(
        &self,
        target: &ConsoleTarget,
        command: &str,
    ) -> Result<CommandExecutionResult, RconError>;
}
