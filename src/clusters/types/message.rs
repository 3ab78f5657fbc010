use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::clusters::codec::{
    CHECKSUM_LEN, checksum, decode_ip, decode_u8, decode_u16, decode_u32, encode_ip, encode_u8,
    encode_u16, encode_u32,
};
use crate::clusters::types::verb::{MAX_MEMBERS, pack_verb_byte, unpack_verb_byte};
use crate::clusters::{
    AddressFamily, Broadcast, GossipError, MessageVerb, Node, NodeDirectory, NodeStatus, Result,
};

/// Checksum (4) + packed verb/count (1) + sender port (2) + sender heartbeat (4).
pub(crate) const HEADER_LEN: usize = 11;

/// Status (1) + host IP + port (2) + heartbeat (4) + source IP + source port (2).
#[inline]
pub(crate) const fn member_len(family: AddressFamily) -> usize {
    9 + 2 * family.ip_len()
}

/// One gossip assertion: `node` has `status` at `heartbeat`, as heard from `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMember {
    pub node: Arc<Node>,
    pub status: NodeStatus,
    pub heartbeat: u32,
    pub source: Option<Arc<Node>>,
}

/// A single gossip datagram.
///
/// ```text
/// offset  size          field
/// 0       4             checksum (Adler-32 over bytes[4..])
/// 4       1             bits[7:2] member count, bits[1:0] verb
/// 5       2             sender response port
/// 7       4             sender heartbeat
/// 11      n*(9+2*ipLen) members
/// ..      rest          broadcast, if any
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: Arc<Node>,
    sender_heartbeat: u32,
    verb: MessageVerb,
    members: Vec<MessageMember>,
    broadcast: Option<Broadcast>,
}

/// Result of [`Message::decode`]. A malformed broadcast tail does not throw
/// away the header and members that parsed fine.
#[derive(Debug)]
pub struct Decoded {
    pub message: Message,
    pub broadcast_error: Option<GossipError>,
}

impl Message {
    pub fn new(verb: MessageVerb, sender: Arc<Node>, sender_heartbeat: u32) -> Self {
        Self {
            sender,
            sender_heartbeat,
            verb,
            members: Vec::new(),
            broadcast: None,
        }
    }

    pub fn verb(&self) -> MessageVerb {
        self.verb
    }

    pub fn sender(&self) -> &Arc<Node> {
        &self.sender
    }

    pub fn sender_heartbeat(&self) -> u32 {
        self.sender_heartbeat
    }

    pub fn members(&self) -> &[MessageMember] {
        &self.members
    }

    pub fn broadcast(&self) -> Option<&Broadcast> {
        self.broadcast.as_ref()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= MAX_MEMBERS
    }

    /// Appends a member. The count shares a byte with the verb, hence 63 at most.
    pub fn add_member(
        &mut self,
        node: Arc<Node>,
        status: NodeStatus,
        heartbeat: u32,
        source: Option<Arc<Node>>,
    ) -> Result<()> {
        if self.is_full() {
            return Err(GossipError::MemberListOverflow);
        }
        self.members.push(MessageMember {
            node,
            status,
            heartbeat,
            source,
        });
        Ok(())
    }

    /// Only one broadcast fits in a message; the last one added wins.
    pub fn add_broadcast(&mut self, broadcast: Broadcast) {
        self.broadcast = Some(broadcast);
    }

    /// The probe target of a PINGREQ: member 0, when it carries `ForwardTo`.
    pub fn get_forward_to(&self) -> Option<&MessageMember> {
        if self.verb != MessageVerb::PingReq {
            return None;
        }
        self.members
            .first()
            .filter(|m| m.status == NodeStatus::ForwardTo)
    }

    pub fn encoded_len(&self, family: AddressFamily) -> usize {
        HEADER_LEN
            + self.members.len() * member_len(family)
            + self
                .broadcast
                .as_ref()
                .map_or(0, |b| b.encoded_len(family))
    }

    pub fn encode(&self, family: AddressFamily) -> Vec<u8> {
        let mut bytes = vec![0u8; self.encoded_len(family)];

        let mut p = CHECKSUM_LEN;
        p += encode_u8(pack_verb_byte(self.verb, self.members.len()), &mut bytes, p);
        p += encode_u16(self.sender.addr().port(), &mut bytes, p);
        p += encode_u32(self.sender_heartbeat, &mut bytes, p);

        for member in &self.members {
            p += encode_u8(member.status.into(), &mut bytes, p);
            let addr = member.node.addr();
            p += encode_ip(addr.ip(), family, &mut bytes, p);
            p += encode_u16(addr.port(), &mut bytes, p);
            p += encode_u32(member.heartbeat, &mut bytes, p);

            // The slot is fixed-width; a missing source stays zero-filled.
            match &member.source {
                Some(source) => {
                    let addr = source.addr();
                    p += encode_ip(addr.ip(), family, &mut bytes, p);
                    p += encode_u16(addr.port(), &mut bytes, p);
                }
                None => p += family.ip_len() + 2,
            }
        }

        if let Some(broadcast) = &self.broadcast {
            broadcast.encode_into(family, &mut bytes, p);
        }

        let sum = checksum(&bytes[CHECKSUM_LEN..]);
        encode_u32(sum, &mut bytes, 0);

        bytes
    }

    /// Parses a datagram received from `source_ip`.
    ///
    /// The sender and every member are resolved through `directory`; unknown
    /// addresses come back as fresh `Unknown` nodes and are not admitted here.
    pub fn decode(
        source_ip: IpAddr,
        bytes: &[u8],
        family: AddressFamily,
        directory: &dyn NodeDirectory,
    ) -> Result<Decoded> {
        if bytes.len() < HEADER_LEN {
            return Err(GossipError::Truncated {
                needed: HEADER_LEN,
                have: bytes.len(),
            });
        }

        let (expected, p) = decode_u32(bytes, 0);
        let actual = checksum(&bytes[CHECKSUM_LEN..]);
        if expected != actual {
            return Err(GossipError::ChecksumMismatch {
                from: source_ip,
                expected,
                actual,
            });
        }

        let (packed, p) = decode_u8(bytes, p);
        let (verb, member_count) = unpack_verb_byte(packed);
        let (sender_port, p) = decode_u16(bytes, p);
        let (sender_heartbeat, p) = decode_u32(bytes, p);

        let sender = directory.lookup_or_create(SocketAddr::new(source_ip, sender_port))?;

        let members_end = p + member_count * member_len(family);
        if bytes.len() < members_end {
            return Err(GossipError::Truncated {
                needed: members_end,
                have: bytes.len(),
            });
        }

        let members = decode_members(member_count, &bytes[p..members_end], family, directory)?;

        let (broadcast, broadcast_error) =
            match Broadcast::decode(&bytes[members_end..], family, directory) {
                Ok(broadcast) => (broadcast, None),
                Err(e) => (None, Some(e)),
            };

        Ok(Decoded {
            message: Message {
                sender,
                sender_heartbeat,
                verb,
                members,
                broadcast,
            },
            broadcast_error,
        })
    }
}

/// Decodes `count` fixed-width member slots. `bytes` must be exactly
/// `count * member_len(family)` long.
pub(crate) fn decode_members(
    count: usize,
    bytes: &[u8],
    family: AddressFamily,
    directory: &dyn NodeDirectory,
) -> Result<Vec<MessageMember>> {
    debug_assert_eq!(bytes.len(), count * member_len(family));

    let mut members = Vec::with_capacity(count);
    let mut p = 0;

    for _ in 0..count {
        let (status, next) = decode_u8(bytes, p);
        let status = NodeStatus::try_from(status)?;
        let (ip, next) = decode_ip(bytes, family, next);
        let (port, next) = decode_u16(bytes, next);
        let (heartbeat, next) = decode_u32(bytes, next);
        let (source_ip, next) = decode_ip(bytes, family, next);
        let (source_port, next) = decode_u16(bytes, next);
        p = next;

        let node = directory.lookup_or_create(SocketAddr::new(ip, port))?;
        let source = if source_ip.is_unspecified() && source_port == 0 {
            None
        } else {
            Some(directory.lookup_or_create(SocketAddr::new(source_ip, source_port))?)
        };

        members.push(MessageMember {
            node,
            status,
            heartbeat,
            source,
        });
    }

    Ok(members)
}
