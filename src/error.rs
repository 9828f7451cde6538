use thiserror::Error;

/// Failures that terminate a connection or an individual transfer.
///
/// The wire protocol has no error frame, so none of these are reported to
/// the peer; protocol violations and transport failures simply close the
/// connection, and an interrupted upload additionally unlinks its temp file.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported command byte {0:#04x}")]
    BadCommand(u8),

    #[error("unknown artifact variant byte {0:#04x}")]
    BadVariant(u8),

    #[error("malformed size field")]
    BadSize,

    #[error("put issued outside a transaction")]
    NoTransaction,

    #[error("received {received} of {declared} declared bytes")]
    SizeMismatch { declared: u64, received: u64 },

    #[error("response channel closed")]
    ChannelClosed,
}
