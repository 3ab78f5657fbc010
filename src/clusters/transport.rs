use crate::clusters::swims::{OutboundPacket, SwimCommand};
use crate::clusters::{AddressFamily, Decoded, KnownNodes, Message};

// ==========================================
// TRANSPORT LAYER (Presentation)
// ==========================================
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::UdpSocket, sync::mpsc};

// Largest datagram UDP can carry.
const RECV_BUFFER_LEN: usize = 65536;

pub struct SwimTransportActor {
    socket: UdpSocket,
    family: AddressFamily,
    directory: Arc<KnownNodes>,
    to_actor: mpsc::Sender<SwimCommand>,
    from_actor: mpsc::Receiver<OutboundPacket>,
}

impl SwimTransportActor {
    pub async fn new(
        bind_addr: SocketAddr,
        directory: Arc<KnownNodes>,
        to_actor: mpsc::Sender<SwimCommand>,
        from_actor: mpsc::Receiver<OutboundPacket>,
    ) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        Ok(Self {
            socket,
            family: directory.family(),
            directory,
            to_actor,
            from_actor,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn run(mut self) {
        if let Ok(addr) = self.socket.local_addr() {
            tracing::info!("Transport Layer listening on {}", addr);
        }

        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        loop {
            tokio::select! {
                // INCOMING: Socket -> Decode -> Actor
                received = self.socket.recv_from(&mut buf) => {
                    let (len, src) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            tracing::warn!("Failed to receive datagram: {}", e);
                            continue;
                        }
                    };
                    let Some(message) = self.decode(src, &buf[..len]) else {
                        continue;
                    };
                    if self.to_actor.send(SwimCommand::PacketReceived { message }).await.is_err() {
                        tracing::debug!("SwimActor is gone, stopping transport");
                        return;
                    }
                }

                // OUTGOING: Actor -> Encode -> Socket
                outbound = self.from_actor.recv() => {
                    let Some(packet) = outbound else {
                        tracing::debug!("Outbound channel closed, stopping transport");
                        return;
                    };
                    let bytes = packet.message().encode(self.family);
                    if let Err(e) = self.socket.send_to(&bytes, packet.target).await {
                        tracing::warn!("Failed to send {} to {}: {}", packet.message().verb(), packet.target, e);
                    }
                }
            }
        }
    }

    fn decode(&self, src: SocketAddr, bytes: &[u8]) -> Option<Message> {
        match Message::decode(src.ip(), bytes, self.family, self.directory.as_ref()) {
            Ok(Decoded {
                message,
                broadcast_error,
            }) => {
                if let Some(e) = broadcast_error {
                    tracing::warn!("Dropping broadcast from {}: {}", src, e);
                }
                Some(message)
            }
            Err(e) => {
                tracing::warn!("Failed to decode datagram from {}: {}", src, e);
                None
            }
        }
    }
}
