//! Minecraft Java Edition Server List Ping
//!
//! Wire format: every packet is `VarInt length | VarInt packet id | payload`.
//! The client sends a handshake (next state = status) followed by an empty
//! status request, and the server answers with one JSON document.

use async_trait::async_trait;
use hourglass_config::ServerSettings;
use hourglass_host_api::{PlayerCount, ProbeFailure, ProbeResult, StatusProbe};
use serde::Deserialize;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Protocol version sent in the handshake. -1 means "just asking".
const PROBE_PROTOCOL_VERSION: i32 = -1;

const NEXT_STATE_STATUS: i32 = 1;

/// Status responses carry a base64 favicon; anything beyond this is garbage
const MAX_PACKET_LEN: usize = 2 * 1024 * 1024;

/// Decoded status response, only the fields hourglass reads
#[derive(Debug, Clone, Deserialize)]
pub struct ServerStatus {
    pub players: Players,
    #[serde(default)]
    pub version: Option<ServerVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Players {
    pub online: u32,
    #[serde(default)]
    pub max: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerVersion {
    pub name: String,
    pub protocol: i32,
}

/// Player-count probe over Server List Ping
#[derive(Debug, Clone)]
pub struct SlpProbe {
    address: String,
    port: u16,
    timeout: Duration,
}

impl SlpProbe {
    pub fn new(settings: &ServerSettings) -> Self {
        Self {
            address: settings.address.clone(),
            port: settings.port,
            timeout: settings.probe_timeout,
        }
    }

    /// Full status query, bounded by the probe timeout
    pub async fn query(&self) -> ProbeResult<ServerStatus> {
        match tokio::time::timeout(self.timeout, self.exchange()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeFailure::Timeout(self.timeout)),
        }
    }

    async fn exchange(&self) -> ProbeResult<ServerStatus> {
        let mut stream = TcpStream::connect((self.address.as_str(), self.port))
            .await
            .map_err(|e| {
                ProbeFailure::Unreachable(format!("{}:{}: {}", self.address, self.port, e))
            })?;

        let mut request = handshake_packet(&self.address, self.port);
        request.extend_from_slice(&status_request_packet());
        stream.write_all(&request).await.map_err(io_failure)?;

        let json = read_status_response(&mut stream).await?;
        serde_json::from_str(&json).map_err(|e| ProbeFailure::Malformed(e.to_string()))
    }
}

#[async_trait]
impl StatusProbe for SlpProbe {
    async fn probe(&self) -> ProbeResult<PlayerCount> {
        let status = self.query().await?;
        debug!(
            online = status.players.online,
            max = status.players.max,
            version = status.version.as_ref().map(|v| v.name.as_str()),
            "Server list ping"
        );
        Ok(PlayerCount(status.players.online))
    }
}

fn io_failure(e: io::Error) -> ProbeFailure {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ProbeFailure::Malformed("connection closed mid-response".into())
    } else {
        ProbeFailure::Unreachable(e.to_string())
    }
}

/// Append a protocol VarInt (7 bits per byte, little-endian groups)
pub(crate) fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
}

/// Decode a VarInt from the front of `buf`, advancing it
pub(crate) fn read_varint(buf: &mut &[u8]) -> Result<i32, String> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let Some((&byte, rest)) = buf.split_first() else {
            return Err("truncated varint".into());
        };
        *buf = rest;
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err("varint too long".into())
}

async fn read_varint_async<R: AsyncRead + Unpin>(reader: &mut R) -> ProbeResult<i32> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = reader.read_u8().await.map_err(io_failure)?;
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProbeFailure::Malformed("varint too long".into()))
}

fn frame(body: Vec<u8>) -> Vec<u8> {
    let mut packet = Vec::with_capacity(body.len() + 5);
    write_varint(&mut packet, body.len() as i32);
    packet.extend(body);
    packet
}

pub(crate) fn handshake_packet(address: &str, port: u16) -> Vec<u8> {
    let mut body = Vec::new();
    write_varint(&mut body, 0x00);
    write_varint(&mut body, PROBE_PROTOCOL_VERSION);
    write_varint(&mut body, address.len() as i32);
    body.extend_from_slice(address.as_bytes());
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut body, NEXT_STATE_STATUS);
    frame(body)
}

pub(crate) fn status_request_packet() -> Vec<u8> {
    frame(vec![0x00])
}

/// Read one status response packet and return its JSON payload
async fn read_status_response<R: AsyncRead + Unpin>(reader: &mut R) -> ProbeResult<String> {
    let len = read_varint_async(reader).await?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| (1..=MAX_PACKET_LEN).contains(len))
        .ok_or_else(|| ProbeFailure::Malformed(format!("bad packet length {}", len)))?;

    let mut packet = vec![0u8; len];
    reader.read_exact(&mut packet).await.map_err(io_failure)?;
    parse_status_packet(&packet)
}

pub(crate) fn parse_status_packet(packet: &[u8]) -> ProbeResult<String> {
    let mut buf = packet;
    let packet_id = read_varint(&mut buf).map_err(ProbeFailure::Malformed)?;
    if packet_id != 0x00 {
        return Err(ProbeFailure::Malformed(format!(
            "unexpected packet id {:#04x}",
            packet_id
        )));
    }

    let str_len = read_varint(&mut buf).map_err(ProbeFailure::Malformed)?;
    let str_len = usize::try_from(str_len)
        .ok()
        .filter(|n| *n <= buf.len())
        .ok_or_else(|| ProbeFailure::Malformed("status string overruns packet".into()))?;

    String::from_utf8(buf[..str_len].to_vec())
        .map_err(|_| ProbeFailure::Malformed("status is not UTF-8".into()))
}
