use thiserror::Error;

pub const WRONGTYPE_MESSAGE: &str =
    "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Error, Debug)]
pub enum KvError {
    /// Returned by reads against an absent or expired key.
    #[error("redkv: nil returned")]
    Nil,

    #[error("{}", WRONGTYPE_MESSAGE)]
    WrongType,

    #[error("value is not an integer or out of range")]
    NotInteger,

    #[error("increment or decrement would overflow")]
    Overflow,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// An error reply decoded off the wire.
    #[error("{0}")]
    Reply(String),

    #[error("cannot convert {from} reply to {to}")]
    Conversion {
        from: &'static str,
        to: &'static str,
    },

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[cfg(feature = "redis-backend")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KvError {
    pub fn is_nil(&self) -> bool {
        matches!(self, KvError::Nil)
    }

    pub fn is_wrong_type(&self) -> bool {
        matches!(self, KvError::WrongType)
    }

    /// Wrap an arbitrary storage failure without changing its message.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        KvError::Backend(err.into())
    }
}

pub type Result<T> = std::result::Result<T, KvError>;
