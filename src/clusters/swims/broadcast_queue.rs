use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;

use super::gossip_buffer::dissemination_count;
use crate::clusters::Broadcast;

// Remember this many broadcast identities to drop echoes of payloads we already relayed.
const MAX_SEEN: usize = 4096;

/// Outgoing application broadcasts. Each message carries at most one, so the
/// queue hands out the broadcast with the most transmissions left.
#[derive(Default)]
pub(super) struct BroadcastQueue {
    pending: Vec<PendingBroadcast>,
    seen: HashSet<(SocketAddr, u32)>,
    seen_order: VecDeque<(SocketAddr, u32)>,
}

struct PendingBroadcast {
    broadcast: Broadcast,
    remaining: u32,
}

impl BroadcastQueue {
    /// Queues `broadcast` for re-gossip. Returns false for one already seen.
    pub(super) fn enqueue(&mut self, broadcast: Broadcast, cluster_size: usize) -> bool {
        let key = broadcast.key();
        if !self.seen.insert(key) {
            return false;
        }

        self.seen_order.push_back(key);
        if self.seen_order.len() > MAX_SEEN {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.pending.push(PendingBroadcast {
            broadcast,
            remaining: dissemination_count(cluster_size),
        });
        true
    }

    pub(super) fn next(&mut self) -> Option<Broadcast> {
        let (pos, _) = self
            .pending
            .iter()
            .enumerate()
            .max_by_key(|(i, p)| (p.remaining, std::cmp::Reverse(*i)))?;

        let entry = &mut self.pending[pos];
        entry.remaining -= 1;
        let broadcast = entry.broadcast.clone();
        if entry.remaining == 0 {
            self.pending.remove(pos);
        }
        Some(broadcast)
    }

    #[cfg(test)]
    pub(super) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
