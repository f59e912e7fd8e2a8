//! Server status queries.
//!
//! [`A2sQuery`] speaks the A2S_INFO request of the Source/GoldSource server query
//! protocol over UDP. Only the fields needed for status rendering are decoded.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;

use super::types::StatusInfo;

const SIMPLE_HEADER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const SPLIT_HEADER: [u8; 4] = [0xFE, 0xFF, 0xFF, 0xFF];
const A2S_INFO: &[u8] = b"\xFF\xFF\xFF\xFFTSource Engine Query\0";

const S2C_CHALLENGE: u8 = 0x41;
const S2A_INFO_SOURCE: u8 = 0x49;
const S2A_INFO_GOLDSRC: u8 = 0x6D;

/// Servers answer at most one challenge per request; anything beyond is a misbehaving peer
const MAX_CHALLENGES: usize = 2;
const RECV_BUFFER: usize = 4096;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not resolve {0}")]
    Unresolved(String),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Malformed reply: {0}")]
    Malformed(&'static str),

    #[error("Unexpected reply type 0x{0:02X}")]
    UnexpectedReply(u8),

    #[error("Split replies are not supported")]
    SplitReply,

    #[error("Server kept answering with challenges")]
    ChallengeLoop,
}

/// Opaque status query against a single server
#[async_trait::async_trait]
pub trait StatusQuery: Send + Sync {
    /// Query the server once, giving up after `timeout`
    async fn query(&self, host: &str, port: u16, timeout: Duration) -> Result<StatusInfo, QueryError>;
}

/// A2S_INFO over UDP
#[derive(Debug, Default, Clone, Copy)]
pub struct A2sQuery;

impl A2sQuery {
    pub fn new() -> Self {
        Self
    }

    async fn exchange(&self, host: &str, port: u16) -> Result<StatusInfo, QueryError> {
        let addr = lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| QueryError::Unresolved(host.to_string()))?;

        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;

        let mut request = A2S_INFO.to_vec();
        let mut buf = vec![0u8; RECV_BUFFER];

        for _ in 0..=MAX_CHALLENGES {
            socket.send(&request).await?;
            let len = socket.recv(&mut buf).await?;

            match parse_reply(&buf[..len])? {
                Reply::Info(info) => return Ok(info),
                Reply::Challenge(challenge) => {
                    request.truncate(A2S_INFO.len());
                    request.extend_from_slice(&challenge);
                }
            }
        }

        Err(QueryError::ChallengeLoop)
    }
}

#[async_trait::async_trait]
impl StatusQuery for A2sQuery {
    async fn query(&self, host: &str, port: u16, limit: Duration) -> Result<StatusInfo, QueryError> {
        timeout(limit, self.exchange(host, port))
            .await
            .map_err(|_| QueryError::Timeout(limit))?
    }
}

#[derive(Debug, PartialEq)]
enum Reply {
    Challenge([u8; 4]),
    Info(StatusInfo),
}

fn parse_reply(packet: &[u8]) -> Result<Reply, QueryError> {
    let mut reader = Reader::new(packet);

    match reader.take::<4>()? {
        SIMPLE_HEADER => {}
        SPLIT_HEADER => return Err(QueryError::SplitReply),
        _ => return Err(QueryError::Malformed("bad packet header")),
    }

    match reader.u8()? {
        S2C_CHALLENGE => Ok(Reply::Challenge(reader.take::<4>()?)),
        S2A_INFO_SOURCE => {
            let _protocol = reader.u8()?;
            let name = reader.cstring()?;
            let map = reader.cstring()?;
            let game = reader.cstring()?;
            let _description = reader.cstring()?;
            let _app_id = reader.take::<2>()?;
            let player_count = reader.u8()?.into();
            let max_players = reader.u8()?.into();

            Ok(Reply::Info(StatusInfo { name, map, game, player_count, max_players }))
        }
        S2A_INFO_GOLDSRC => {
            let _address = reader.cstring()?;
            let name = reader.cstring()?;
            let map = reader.cstring()?;
            let game = reader.cstring()?;
            let _description = reader.cstring()?;
            let player_count = reader.u8()?.into();
            let max_players = reader.u8()?.into();

            Ok(Reply::Info(StatusInfo { name, map, game, player_count, max_players }))
        }
        other => Err(QueryError::UnexpectedReply(other)),
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], QueryError> {
        let (head, rest) = self
            .buf
            .split_first_chunk::<N>()
            .ok_or(QueryError::Malformed("truncated packet"))?;
        self.buf = rest;
        Ok(*head)
    }

    fn u8(&mut self) -> Result<u8, QueryError> {
        Ok(self.take::<1>()?[0])
    }

    fn cstring(&mut self) -> Result<String, QueryError> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(QueryError::Malformed("unterminated string"))?;
        let value = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf = &self.buf[end + 1..];
        Ok(value)
    }
}
