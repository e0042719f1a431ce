// pjlink.rs
//! PJLink class 1 client over TCP.

use super::{Connector, Credentials, DeviceLink};
use crate::{
    error::LinkError,
    models::{PowerState, ShutterState},
};
use async_trait::async_trait;
use md5::{Digest, Md5};
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    time::timeout,
};
use tracing::debug;

pub const DEFAULT_PORT: u16 = 4352;
const TERMINATOR: u8 = b'\r';
const MAX_LINE: usize = 256;

pub struct PjLinkConnector {
    port: u16,
    timeout: Duration,
}

impl PjLinkConnector {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    fn socket_addr(&self, address: &str) -> String {
        if address.contains(':') {
            address.to_string()
        } else {
            format!("{}:{}", address, self.port)
        }
    }
}

impl Default for PjLinkConnector {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, Duration::from_secs(3))
    }
}

#[async_trait]
impl Connector for PjLinkConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn DeviceLink>, LinkError> {
        let addr = self.socket_addr(address);
        let stream = match timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(LinkError::Connect(format!("{addr}: {e}"))),
            Err(_) => return Err(LinkError::Connect(format!("{addr}: timed out"))),
        };

        let mut link = PjLink {
            stream: BufReader::new(stream),
            timeout: self.timeout,
            seed: None,
            digest: None,
        };

        let greeting = link.read_line().await?;
        debug!(%addr, %greeting, "PJLink greeting");
        link.seed = parse_greeting(&greeting)?;
        Ok(Box::new(link))
    }
}

fn parse_greeting(greeting: &str) -> Result<Option<String>, LinkError> {
    match greeting.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["PJLINK", "0"] => Ok(None),
        ["PJLINK", "1", seed] => Ok(Some((*seed).to_string())),
        ["PJLINK", "ERRA"] => Err(LinkError::Auth),
        _ => Err(LinkError::Protocol(format!("unexpected greeting {greeting:?}"))),
    }
}

/// Lowercase hex MD5 of the seed followed by the password.
pub fn auth_digest(seed: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(seed.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct PjLink {
    stream: BufReader<TcpStream>,
    timeout: Duration,
    seed: Option<String>,
    digest: Option<String>,
}

impl PjLink {
    async fn read_line(&mut self) -> Result<String, LinkError> {
        let mut buf = Vec::new();
        let mut limited = (&mut self.stream).take(MAX_LINE as u64 + 1);
        let read = timeout(self.timeout, limited.read_until(TERMINATOR, &mut buf))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"))??;
        if read == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        if buf.last() != Some(&TERMINATOR) {
            if buf.len() > MAX_LINE {
                return Err(LinkError::Protocol("response too long".into()));
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Sends `%1<command> <param>` and returns the value after `=`.
    async fn request(&mut self, command: &str, param: &str) -> Result<String, LinkError> {
        let line = format!(
            "{}%1{} {}\r",
            self.digest.as_deref().unwrap_or(""),
            command,
            param
        );
        timeout(self.timeout, self.stream.get_mut().write_all(line.as_bytes()))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out"))??;

        let response = self.read_line().await?;
        parse_response(command, &response)
    }

    async fn set(&mut self, command: &str, param: &str) -> Result<(), LinkError> {
        match self.request(command, param).await?.as_str() {
            "OK" => Ok(()),
            other => Err(LinkError::Protocol(format!("{command}: unexpected reply {other:?}"))),
        }
    }
}

fn parse_response(command: &str, response: &str) -> Result<String, LinkError> {
    if response == "PJLINK ERRA" {
        return Err(LinkError::Auth);
    }
    let value = response
        .strip_prefix("%1")
        .and_then(|rest| rest.strip_prefix(command))
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or_else(|| LinkError::Protocol(format!("unexpected response {response:?}")))?;
    match value {
        "ERR1" => Err(LinkError::Rejected(format!("{command}: undefined command"))),
        "ERR2" => Err(LinkError::Rejected(format!("{command}: out of parameter"))),
        "ERR3" => Err(LinkError::Rejected(format!("{command}: unavailable time"))),
        "ERR4" => Err(LinkError::Rejected(format!("{command}: projector failure"))),
        value => Ok(value.to_string()),
    }
}

#[async_trait]
impl DeviceLink for PjLink {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), LinkError> {
        if let Some(seed) = &self.seed {
            self.digest = Some(auth_digest(seed, credentials.expose()));
        }
        // The projector only checks the digest once a command arrives.
        self.power().await.map(|_| ())
    }

    async fn power(&mut self) -> Result<PowerState, LinkError> {
        match self.request("POWR", "?").await?.as_str() {
            "0" => Ok(PowerState::Off),
            "1" => Ok(PowerState::On),
            "2" => Ok(PowerState::Cooling),
            "3" => Ok(PowerState::Warming),
            other => Err(LinkError::Protocol(format!("POWR: unknown state {other:?}"))),
        }
    }

    async fn shutter(&mut self) -> Result<ShutterState, LinkError> {
        match self.request("AVMT", "?").await?.as_str() {
            "11" | "31" => Ok(ShutterState::Closed),
            "10" | "20" | "21" | "30" => Ok(ShutterState::Open),
            other => Err(LinkError::Protocol(format!("AVMT: unknown state {other:?}"))),
        }
    }

    async fn set_power(&mut self, on: bool) -> Result<(), LinkError> {
        self.set("POWR", if on { "1" } else { "0" }).await
    }

    async fn set_shutter(&mut self, closed: bool) -> Result<(), LinkError> {
        self.set("AVMT", if closed { "11" } else { "10" }).await
    }
}
