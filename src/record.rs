//! The byte layout of one key on a naive backend.
//!
//! ```text
//! record  := '!' group deadline payload
//! group   := 's' | 'l' | 'h'
//! deadline:= RESP integer, absolute unix seconds, 0 = no expiry
//! payload := bulk string (s) | array of bulk strings (l, h)
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{KvError, Result};
use crate::resp::{Decoder, Encoder, RespValue};
use crate::types::{Group, TTL_MISSING, TTL_NO_EXPIRY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    String(Vec<u8>),
    /// Index 0 is the head.
    List(Vec<Vec<u8>>),
    /// Fields in insertion order, never duplicated.
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
}

impl Payload {
    pub fn group(&self) -> Group {
        match self {
            Payload::String(_) => Group::String,
            Payload::List(_) => Group::List,
            Payload::Hash(_) => Group::Hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Absolute unix seconds.
    pub deadline: Option<i64>,
    pub payload: Payload,
}

impl Record {
    pub fn new(payload: Payload) -> Self {
        Self {
            deadline: None,
            payload,
        }
    }

    pub fn group(&self) -> Group {
        self.payload.group()
    }

    /// Fails with `WrongType` unless the record belongs to `group`.
    pub fn expect_group(&self, group: Group) -> Result<()> {
        if self.group() == group {
            Ok(())
        } else {
            Err(KvError::WrongType)
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.deadline
            .is_some_and(|d| now_ms >= d.saturating_mul(1000))
    }

    /// Seconds left, rounded up. `-1` without a deadline, `-2` once expired.
    pub fn ttl(&self, now_ms: i64) -> i64 {
        match self.deadline {
            None => TTL_NO_EXPIRY,
            Some(d) => {
                let remaining = d.saturating_mul(1000) - now_ms;
                if remaining <= 0 {
                    TTL_MISSING
                } else {
                    (remaining + 999) / 1000
                }
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_header(self.group(), self.deadline.unwrap_or(0));
        match &self.payload {
            Payload::String(b) => enc.write_bulk(b),
            Payload::List(items) => {
                enc.write_len(b'*', items.len());
                for item in items {
                    enc.write_bulk(item);
                }
            }
            Payload::Hash(pairs) => {
                enc.write_len(b'*', pairs.len() * 2);
                for (field, value) in pairs {
                    enc.write_bulk(field);
                    enc.write_bulk(value);
                }
            }
        }
        enc.into_bytes()
    }

    pub fn decode(b: &[u8]) -> Result<Self> {
        if b.is_empty() {
            return Err(KvError::Corrupt("empty record".into()));
        }
        let mut dec = Decoder::new(b);
        let (group, deadline) = dec.read_header()?;
        let reply = dec.read_reply()?;
        if dec.remaining() != 0 {
            return Err(KvError::Corrupt(format!(
                "{} trailing bytes after payload",
                dec.remaining()
            )));
        }

        let payload = match group {
            Group::String => match reply {
                RespValue::BulkString(Some(b)) => Payload::String(b),
                other => {
                    return Err(KvError::Corrupt(format!(
                        "expected bulk string for group s, got {}",
                        other.kind()
                    )))
                }
            },
            Group::List => Payload::List(bulk_items(group, reply)?),
            Group::Hash => {
                let items = bulk_items(group, reply)?;
                if items.len() % 2 != 0 {
                    return Err(KvError::Corrupt("hash list is not divisible by 2".into()));
                }
                let mut pairs = Vec::with_capacity(items.len() / 2);
                let mut it = items.into_iter();
                while let (Some(field), Some(value)) = (it.next(), it.next()) {
                    pairs.push((field, value));
                }
                Payload::Hash(pairs)
            }
        };

        Ok(Self {
            deadline: (deadline != 0).then_some(deadline),
            payload,
        })
    }
}

fn bulk_items(group: Group, reply: RespValue) -> Result<Vec<Vec<u8>>> {
    let RespValue::Array(Some(items)) = reply else {
        return Err(KvError::Corrupt(format!(
            "non list marshalled for redis group {}",
            char::from(group.as_byte())
        )));
    };
    items
        .into_iter()
        .map(|item| match item {
            RespValue::BulkString(Some(b)) => Ok(b),
            other => Err(KvError::Corrupt(format!(
                "expected bulk string element, got {}",
                other.kind()
            ))),
        })
        .collect()
}

/// Current time in milliseconds since epoch
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
