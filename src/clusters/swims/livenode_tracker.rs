use rand::{Rng, SeedableRng, rngs::StdRng};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::ops::Deref;

use crate::clusters::NodeStatus;

// Used to decide who to ping. You don't want to waste network traffic pinging nodes you already know are dead.
#[derive(Default)]
pub(super) struct LiveNodeTracker {
    nodes: VecDeque<SocketAddr>,
}

impl Deref for LiveNodeTracker {
    type Target = VecDeque<SocketAddr>;

    fn deref(&self) -> &Self::Target {
        &self.nodes
    }
}

impl LiveNodeTracker {
    // Random insertion keeps the probe order shuffled without reshuffling every round.
    pub(super) fn add(&mut self, addr: SocketAddr) {
        if self.nodes.contains(&addr) {
            return;
        }
        let mut rng = StdRng::from_entropy();
        let selected = rng.gen_range(0..=self.nodes.len());
        self.nodes.insert(selected, addr);
    }

    pub(super) fn remove(&mut self, addr: &SocketAddr) {
        if let Some(index) = self.nodes.iter().position(|x| x == addr) {
            self.nodes.remove(index);
        }
    }

    pub(super) fn next(&mut self) -> Option<SocketAddr> {
        let addr = self.nodes.pop_front()?;
        self.nodes.push_back(addr);
        Some(addr)
    }

    pub(super) fn update(&mut self, addr: SocketAddr, status: NodeStatus) {
        match status {
            NodeStatus::Alive => self.add(addr),
            NodeStatus::Suspected | NodeStatus::Dead | NodeStatus::Unknown => self.remove(&addr),
            NodeStatus::ForwardTo => {}
        }
    }
}
