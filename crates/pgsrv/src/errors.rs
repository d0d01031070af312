use crate::backend::BackendError;
use std::io;

pub type Result<T, E = PgSrvError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum PgSrvError {
    #[error("invalid protocol version: {0}")]
    InvalidProtocolVersion(i32),

    #[error("invalid startup packet length: {0}")]
    InvalidStartupLength(usize),

    #[error("unexpected frontend message: {0}")]
    UnexpectedFrontendMessage(&'static str),

    #[error("unexpected frontend message during extended query: {0}")]
    UnexpectedExtendedMessage(&'static str),

    #[error("message larger than i32 max, size: {0}")]
    MsgTooLarge(usize),

    #[error("message truncated")]
    MsgTruncated,

    #[error("missing null byte")]
    MissingNullByte,

    #[error("invalid message type: {}", *.0 as char)] // Easier to debug character representation.
    InvalidMsgType(u8),

    #[error("invalid describe object type: {}", *.0 as char)]
    InvalidDescribeObjectType(u8),

    #[error("startup rejected: {0}")]
    StartupRejected(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Fmt(#[from] std::fmt::Error),
}
