//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Short-lived TCP RCON client."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::io;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mcctl_common::CommandExecutionResult;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::packet::{Packet, PacketType, AUTH_FAILED_ID, MAX_RESPONSE_PAYLOAD};
use crate::{ConsoleBridge, ConsoleTarget, RconError};

/// Extra wait for a follow-up fragment once a full-size fragment arrives.
const FRAGMENT_GRACE: Duration = Duration::from_millis(250);

/// One connection per call, bounded end to end by `timeout`.
#[derive(Debug)]
pub struct RconClient {
    timeout: Duration,
    next_id: AtomicI32,
}

impl RconClient {
    /// Client whose calls each complete or fail within `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            next_id: AtomicI32::new(1),
        }
    }

    fn request_id(&self) -> i32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id <= 0 {
            self.next_id.store(2, Ordering::Relaxed);
            return 1;
        }
        id
    }

    async fn exchange(&self, target: &ConsoleTarget, command: &str) -> Result<String, RconError> {
        let addr = target.address();
        let mut stream = TcpStream::connect(&addr).await.map_err(|source| {
            if source.kind() == io::ErrorKind::ConnectionRefused {
                RconError::ConnectionRefused {
                    addr: addr.clone(),
                    source,
                }
            } else {
                RconError::Io(source)
            }
        })?;
        debug!(%addr, "console connected");

        let login_id = self.request_id();
        let login = Packet::new(login_id, PacketType::Login, target.password.clone());
        write_packet(&mut stream, &login).await?;
        loop {
            let reply = read_packet(&mut stream).await?;
            if reply.request_id == AUTH_FAILED_ID {
                return Err(RconError::AuthenticationFailed);
            }
            // Some servers send an empty response frame ahead of the auth reply.
            if reply.kind == PacketType::Command && reply.request_id == login_id {
                break;
            }
        }

        let command_id = self.request_id();
        write_packet(&mut stream, &Packet::new(command_id, PacketType::Command, command)).await?;
        let mut output = String::new();
        let mut fragment = read_packet(&mut stream).await?;
        loop {
            if fragment.request_id != command_id {
                return Err(RconError::Protocol(format!(
                    "reply id {} does not match request {command_id}",
                    fragment.request_id
                )));
            }
            let full = fragment.payload.len() >= MAX_RESPONSE_PAYLOAD;
            output.push_str(&fragment.payload);
            if !full {
                break;
            }
            match tokio::time::timeout(FRAGMENT_GRACE, read_packet(&mut stream)).await {
                Ok(next) => fragment = next?,
                Err(_) => break,
            }
        }
        let _ = stream.shutdown().await;
        Ok(output)
    }
}

async fn write_packet(stream: &mut TcpStream, packet: &Packet) -> Result<(), RconError> {
    stream.write_all(&packet.encode()).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_packet(stream: &mut TcpStream) -> Result<Packet, RconError> {
    let prefix = stream.read_i32_le().await?;
    let len = Packet::body_len(prefix)?;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Packet::decode(&body)
}

#[async_trait]
impl ConsoleBridge for RconClient {
    async fn execute(
        &self,
        target: &ConsoleTarget,
        command: &str,
    ) -> Result<CommandExecutionResult, RconError> {
        let started = Instant::now();
        let output = tokio::time::timeout(self.timeout, self.exchange(target, command))
            .await
            .map_err(|_| RconError::Timeout(self.timeout))??;
        Ok(CommandExecutionResult::output(output, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_skip_non_positive_values() {
        let client = RconClient::new(Duration::from_secs(1));
        assert_eq!(client.request_id(), 1);
        assert_eq!(client.request_id(), 2);
        client.next_id.store(i32::MAX, Ordering::Relaxed);
        assert_eq!(client.request_id(), i32::MAX);
        assert_eq!(client.request_id(), 1);
        assert_eq!(client.request_id(), 2);
    }
}
