use bytes::{Buf, BufMut, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
};

use crate::{config::SERDE_CONFIG, connections::error::RpcError};

const MAX_MSG_SIZE: usize = 4 * 1024 * 1024; // 4MB
const LEN_PREFIX: usize = 4;

pub struct ClientStreamWriter(pub(crate) OwnedWriteHalf);

impl ClientStreamWriter {
    /// Writes one length-prefixed bincode frame.
    pub async fn write_frame<T>(&mut self, value: &T) -> Result<(), RpcError>
    where
        T: bincode::Encode,
    {
        let body = bincode::encode_to_vec(value, SERDE_CONFIG)?;
        if body.len() > MAX_MSG_SIZE {
            return Err(RpcError::FrameTooLarge {
                len: body.len(),
                max: MAX_MSG_SIZE,
            });
        }

        let mut frame = BytesMut::with_capacity(LEN_PREFIX + body.len());
        frame.put_u32(body.len() as u32);
        frame.put_slice(&body);

        self.0.write_all(&frame).await?;
        self.0.flush().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ClientStreamReader {
    pub(crate) stream: OwnedReadHalf,
    // Persistent Buffer - instead of creating a new buffer for every message,
    // we keep one buffer
    buffer: BytesMut,
}

impl ClientStreamReader {
    pub fn new(stream: OwnedReadHalf) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(1024),
        }
    }

    pub async fn read_bytes(&mut self) -> Result<BytesMut, RpcError> {
        loop {
            // 1. Attempt to parse what we already have buffered
            //    If we received multiple messages in one packet, this ensures we process them all
            //    before reading from the socket again.
            if let Some(msg) = self.parse_frame()? {
                return Ok(msg);
            }

            // 2. If no full frame is available, read more data from the socket.
            //    'read_buf' automatically appends to the BytesMut
            let n = self.stream.read_buf(&mut self.buffer).await?;
            if 0 == n {
                return if self.buffer.is_empty() {
                    Err(RpcError::ConnectionClosed)
                } else {
                    Err(RpcError::PartialFrame)
                };
            }
        }
    }

    /// Tries to split off a full message from the internal buffer.
    /// Returns Ok(None) if we need more data.
    pub fn parse_frame(&mut self) -> Result<Option<BytesMut>, RpcError> {
        // 1. Do we have enough for the length prefix (4bytes)?
        if self.buffer.len() < LEN_PREFIX {
            return Ok(None);
        }

        // 2. Peek the length integer (without consuming bytes yet)
        let mut len_bytes = &self.buffer[..LEN_PREFIX];
        let len = len_bytes.get_u32() as usize;

        // 3. Security check: prevent massive allocations from malicious clients
        if len > MAX_MSG_SIZE {
            return Err(RpcError::FrameTooLarge {
                len,
                max: MAX_MSG_SIZE,
            });
        }

        // 4. Do we have the full message body in the buffer?
        let total_frame_len = LEN_PREFIX + len;
        if self.buffer.len() < total_frame_len {
            if self.buffer.capacity() < total_frame_len {
                self.buffer.reserve(total_frame_len - self.buffer.len());
            }
            return Ok(None);
        }

        // 5. Consume header and split off the body
        self.buffer.advance(LEN_PREFIX);
        let msg = self.buffer.split_to(len);

        // Whatever is left in self.buffer stays there for the next call.
        Ok(Some(msg))
    }

    pub async fn read_request<U>(&mut self) -> Result<U, RpcError>
    where
        U: bincode::Decode<()>,
    {
        let body = self.read_bytes().await?;
        let (request, _) = bincode::decode_from_slice(&body, SERDE_CONFIG)?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::request::RpcRequest;
    use tokio::net::{TcpListener, TcpStream};

    async fn pair() -> (ClientStreamWriter, ClientStreamReader) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let (_, write_half) = client.into_split();
        let (read_half, _) = server.into_split();
        (ClientStreamWriter(write_half), ClientStreamReader::new(read_half))
    }

    #[tokio::test]
    async fn frames_survive_the_wire_back_to_back() {
        let (mut writer, mut reader) = pair().await;

        writer.write_frame(&RpcRequest::Nodes).await.unwrap();
        writer
            .write_frame(&RpcRequest::Broadcast(b"payload".to_vec()))
            .await
            .unwrap();

        assert_eq!(reader.read_request::<RpcRequest>().await.unwrap(), RpcRequest::Nodes);
        assert_eq!(
            reader.read_request::<RpcRequest>().await.unwrap(),
            RpcRequest::Broadcast(b"payload".to_vec())
        );
    }

    #[tokio::test]
    async fn closed_connection_is_reported() {
        let (writer, mut reader) = pair().await;
        drop(writer);

        assert!(matches!(
            reader.read_request::<RpcRequest>().await,
            Err(RpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut writer, mut reader) = pair().await;
        writer.0.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        assert!(matches!(
            reader.read_bytes().await,
            Err(RpcError::FrameTooLarge { .. })
        ));
    }
}
