//! Fixed-width big-endian primitives for the gossip datagram.
//!
//! Encoders write at `offset` and return how many bytes they wrote so callers can
//! advance a cursor; decoders return the value and the next cursor position.
//! None of them check bounds: the message layer sizes every slice from the
//! declared counts before calling in here, and they panic on a short slice.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use adler2::Adler32;

use crate::clusters::AddressFamily;

/// The first 4 bytes of a datagram hold its checksum.
pub const CHECKSUM_LEN: usize = 4;

#[inline]
pub fn encode_u8(value: u8, buf: &mut [u8], offset: usize) -> usize {
    buf[offset] = value;
    1
}

#[inline]
pub fn encode_u16(value: u16, buf: &mut [u8], offset: usize) -> usize {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    2
}

#[inline]
pub fn encode_u32(value: u32, buf: &mut [u8], offset: usize) -> usize {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    4
}

#[inline]
pub fn decode_u8(buf: &[u8], offset: usize) -> (u8, usize) {
    (buf[offset], offset + 1)
}

#[inline]
pub fn decode_u16(buf: &[u8], offset: usize) -> (u16, usize) {
    let value = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
    (value, offset + 2)
}

#[inline]
pub fn decode_u32(buf: &[u8], offset: usize) -> (u32, usize) {
    let value = u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]);
    (value, offset + 4)
}

/// Writes `ip` in the active family's width. The directory only hands out
/// addresses representable in that family, so the fallbacks never fire for
/// nodes obtained through it.
pub fn encode_ip(ip: IpAddr, family: AddressFamily, buf: &mut [u8], offset: usize) -> usize {
    match family {
        AddressFamily::V4 => {
            let v4 = match ip {
                IpAddr::V4(v4) => v4,
                IpAddr::V6(v6) => v6.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
            };
            buf[offset..offset + 4].copy_from_slice(&v4.octets());
            4
        }
        AddressFamily::V6 => {
            let v6 = match ip {
                IpAddr::V4(v4) => v4.to_ipv6_mapped(),
                IpAddr::V6(v6) => v6,
            };
            buf[offset..offset + 16].copy_from_slice(&v6.octets());
            16
        }
    }
}

pub fn decode_ip(buf: &[u8], family: AddressFamily, offset: usize) -> (IpAddr, usize) {
    match family {
        AddressFamily::V4 => {
            let octets: [u8; 4] = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
            (IpAddr::V4(Ipv4Addr::from(octets)), offset + 4)
        }
        AddressFamily::V6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[offset..offset + 16]);
            (IpAddr::V6(Ipv6Addr::from(octets)), offset + 16)
        }
    }
}

/// Adler-32 over `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut adler = Adler32::new();
    adler.write_slice(bytes);
    adler.checksum()
}
