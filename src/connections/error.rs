use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("partial frame received before the connection closed")]
    PartialFrame,

    #[error("frame of {len} bytes exceeds maximum allowed {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode frame: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}
