use std::fmt;

/// Verbs of the probe protocol. Two bits on the wire, so every value is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageVerb {
    /// Direct probe. Answered with `Ack`; on timeout the prober escalates to `PingReq`.
    Ping = 0,
    /// Answer to `Ping` or `NfPing`. Never forwarded.
    Ack = 1,
    /// Asks the recipient to probe the `ForwardTo` member on the sender's behalf.
    PingReq = 2,
    /// Ping sent on behalf of a `PingReq`. Its timeout does not start another
    /// indirect round.
    NfPing = 3,
}

pub(crate) const MAX_MEMBERS: usize = 63;

const VERB_MASK: u8 = 0b0000_0011;

impl MessageVerb {
    fn from_bits(bits: u8) -> Self {
        match bits & VERB_MASK {
            0 => MessageVerb::Ping,
            1 => MessageVerb::Ack,
            2 => MessageVerb::PingReq,
            _ => MessageVerb::NfPing,
        }
    }
}

/// Packs the verb into bits `[1:0]` and the member count into bits `[7:2]`.
///
/// ```text
///   7   6   5   4   3   2   1   0
/// +---+---+---+---+---+---+---+---+
/// |     member count (0-63)   | verb  |
/// +---+---+---+---+---+---+---+---+
/// ```
#[inline]
pub(crate) fn pack_verb_byte(verb: MessageVerb, member_count: usize) -> u8 {
    debug_assert!(member_count <= MAX_MEMBERS);
    ((member_count as u8) << 2) | verb as u8
}

#[inline]
pub(crate) fn unpack_verb_byte(byte: u8) -> (MessageVerb, usize) {
    (MessageVerb::from_bits(byte), (byte >> 2) as usize)
}

impl fmt::Display for MessageVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageVerb::Ping => "PING",
            MessageVerb::Ack => "ACK",
            MessageVerb::PingReq => "PINGREQ",
            MessageVerb::NfPing => "NFPING",
        };
        f.write_str(name)
    }
}
