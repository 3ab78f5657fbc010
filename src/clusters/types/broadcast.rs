use std::net::SocketAddr;
use std::sync::Arc;

use crate::clusters::codec::{decode_ip, decode_u16, decode_u32, encode_ip, encode_u16, encode_u32};
use crate::clusters::{AddressFamily, GossipError, Node, NodeDirectory, Result};

/// An opaque application payload riding on gossip traffic.
///
/// ```text
/// 0        ip_len   origin IP
/// ip_len   2        origin response port
/// +2       4        broadcast counter
/// +4       2        payload length N
/// +2       N        payload
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    origin: Arc<Node>,
    index: u32,
    bytes: Vec<u8>,
}

impl Broadcast {
    pub fn new(origin: Arc<Node>, index: u32, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() > u16::MAX as usize {
            return Err(GossipError::BroadcastTooLarge(bytes.len()));
        }
        Ok(Self {
            origin,
            index,
            bytes,
        })
    }

    pub fn origin(&self) -> &Arc<Node> {
        &self.origin
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Identity used to drop broadcasts already seen.
    pub fn key(&self) -> (SocketAddr, u32) {
        (self.origin.addr(), self.index)
    }

    pub(crate) fn encoded_len(&self, family: AddressFamily) -> usize {
        family.ip_len() + 8 + self.bytes.len()
    }

    /// Writes the broadcast into `buf` at `offset` and returns the bytes written.
    pub(crate) fn encode_into(&self, family: AddressFamily, buf: &mut [u8], offset: usize) -> usize {
        let mut p = offset;
        let origin = self.origin.addr();
        p += encode_ip(origin.ip(), family, buf, p);
        p += encode_u16(origin.port(), buf, p);
        p += encode_u32(self.index, buf, p);
        // Length is bounded by `new`.
        p += encode_u16(self.bytes.len() as u16, buf, p);
        buf[p..p + self.bytes.len()].copy_from_slice(&self.bytes);
        p += self.bytes.len();
        p - offset
    }

    pub fn encode(&self, family: AddressFamily) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len(family)];
        self.encode_into(family, &mut buf, 0);
        buf
    }

    /// Parses a broadcast tail. An empty tail means the message carries none.
    pub fn decode(
        bytes: &[u8],
        family: AddressFamily,
        directory: &dyn NodeDirectory,
    ) -> Result<Option<Self>> {
        if bytes.is_empty() {
            return Ok(None);
        }

        let header_len = family.ip_len() + 8;
        if bytes.len() < header_len {
            return Err(GossipError::MalformedBroadcast(format!(
                "{} bytes is shorter than the {header_len}-byte header",
                bytes.len()
            )));
        }

        let (ip, p) = decode_ip(bytes, family, 0);
        let (port, p) = decode_u16(bytes, p);
        let (index, p) = decode_u32(bytes, p);
        let (len, p) = decode_u16(bytes, p);

        let len = len as usize;
        let remaining = bytes.len() - p;
        if remaining < len {
            return Err(GossipError::MalformedBroadcast(format!(
                "payload declares {len} bytes but only {remaining} remain"
            )));
        }

        let origin = directory.lookup_or_create(SocketAddr::new(ip, port))?;
        Ok(Some(Self {
            origin,
            index,
            bytes: bytes[p..p + len].to_vec(),
        }))
    }
}
