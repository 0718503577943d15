//! Results of read commands, with redis-style coercions.
//!
//! A [`Value`] wraps either a decoded reply or the error that prevented one.
//! The coercion methods accept the loose typing callers expect from redis: a
//! bulk string `"1"` reads as the integer `1`, the boolean `true`, or the
//! bytes `b"1"`. When there is no value, the underlying error comes back
//! unchanged, so `KvError::Nil` stays distinguishable from corruption.

use std::collections::HashMap;

use crate::error::{KvError, Result};
use crate::resp::RespValue;

#[derive(Debug)]
pub struct Value {
    reply: Result<RespValue>,
}

impl Value {
    pub fn new(reply: RespValue) -> Self {
        Self { reply: Ok(reply) }
    }

    pub fn from_error(err: KvError) -> Self {
        Self { reply: Err(err) }
    }

    pub fn nil() -> Self {
        Self::from_error(KvError::Nil)
    }

    pub fn from_bytes(b: Vec<u8>) -> Self {
        Self::new(RespValue::BulkString(Some(b)))
    }

    pub fn is_nil(&self) -> bool {
        match &self.reply {
            Ok(reply) => reply.is_nil(),
            Err(e) => e.is_nil(),
        }
    }

    pub fn err(&self) -> Option<&KvError> {
        self.reply.as_ref().err()
    }

    pub fn into_reply(self) -> Result<RespValue> {
        self.reply
    }

    pub fn int(self) -> Result<i64> {
        match scalar(self.reply)? {
            RespValue::Integer(n) => Ok(n),
            RespValue::BulkString(Some(b)) => parse_i64(&b),
            RespValue::SimpleString(s) => parse_i64(s.as_bytes()),
            other => Err(conversion(&other, "integer")),
        }
    }

    pub fn bool(self) -> Result<bool> {
        match scalar(self.reply)? {
            RespValue::Integer(n) => Ok(n != 0),
            RespValue::BulkString(Some(b)) => parse_bool(&b),
            RespValue::SimpleString(s) => parse_bool(s.as_bytes()),
            other => Err(conversion(&other, "bool")),
        }
    }

    pub fn string(self) -> Result<String> {
        match scalar(self.reply)? {
            RespValue::Integer(n) => Ok(n.to_string()),
            RespValue::BulkString(Some(b)) => {
                String::from_utf8(b).map_err(|_| KvError::Conversion {
                    from: "non-utf8 bulk string",
                    to: "string",
                })
            }
            RespValue::SimpleString(s) => Ok(s),
            other => Err(conversion(&other, "string")),
        }
    }

    pub fn bytes(self) -> Result<Vec<u8>> {
        match scalar(self.reply)? {
            RespValue::Integer(n) => Ok(n.to_string().into_bytes()),
            RespValue::BulkString(Some(b)) => Ok(b),
            RespValue::SimpleString(s) => Ok(s.into_bytes()),
            other => Err(conversion(&other, "bytes")),
        }
    }
}

/// Unwraps the reply, turning nil markers into `KvError::Nil` and error
/// replies into `KvError::Reply`.
fn scalar(reply: Result<RespValue>) -> Result<RespValue> {
    match reply? {
        r if r.is_nil() => Err(KvError::Nil),
        RespValue::Error(msg) => Err(KvError::Reply(msg)),
        r => Ok(r),
    }
}

fn conversion(reply: &RespValue, to: &'static str) -> KvError {
    KvError::Conversion {
        from: reply.kind(),
        to,
    }
}

fn parse_i64(b: &[u8]) -> Result<i64> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(KvError::NotInteger)
}

fn parse_bool(b: &[u8]) -> Result<bool> {
    match b {
        b"1" | b"t" | b"T" | b"TRUE" | b"true" | b"True" => Ok(true),
        b"0" | b"f" | b"F" | b"FALSE" | b"false" | b"False" => Ok(false),
        _ => Err(KvError::Conversion {
            from: "bulk string",
            to: "bool",
        }),
    }
}

/// Multi-element results: hashes flattened as field, value, field, value...
/// and list ranges.
#[derive(Debug)]
pub struct Values {
    reply: Result<Vec<RespValue>>,
}

impl Values {
    pub fn new(items: Vec<RespValue>) -> Self {
        Self { reply: Ok(items) }
    }

    pub fn from_error(err: KvError) -> Self {
        Self { reply: Err(err) }
    }

    pub fn from_bytes(items: Vec<Vec<u8>>) -> Self {
        Self::new(
            items
                .into_iter()
                .map(|b| RespValue::BulkString(Some(b)))
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn err(&self) -> Option<&KvError> {
        self.reply.as_ref().err()
    }

    pub fn len(&self) -> usize {
        self.reply.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_replies(self) -> Result<Vec<RespValue>> {
        self.reply
    }

    pub fn strings(self) -> Result<Vec<String>> {
        self.reply?.into_iter().map(element_string).collect()
    }

    pub fn byte_slices(self) -> Result<Vec<Vec<u8>>> {
        self.reply?.into_iter().map(element_bytes).collect()
    }

    /// Consecutive pairs as a map. A repeated key keeps the last value.
    pub fn string_map(self) -> Result<HashMap<String, String>> {
        Ok(self.string_pairs()?.into_iter().collect())
    }

    /// Consecutive pairs in order. A repeated key stays at its first
    /// position and takes the last value.
    pub fn string_pairs(self) -> Result<Vec<(String, String)>> {
        let items = self.reply?;
        if items.len() % 2 != 0 {
            return Err(KvError::Conversion {
                from: "odd length array",
                to: "string map",
            });
        }
        let mut pairs: Vec<(String, String)> = Vec::with_capacity(items.len() / 2);
        let mut it = items.into_iter();
        while let (Some(k), Some(v)) = (it.next(), it.next()) {
            let (k, v) = (element_string(k)?, element_string(v)?);
            match pairs.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => pairs.push((k, v)),
            }
        }
        Ok(pairs)
    }
}

fn element_string(item: RespValue) -> Result<String> {
    if item.is_nil() {
        return Ok(String::new());
    }
    Value::new(item).string()
}

fn element_bytes(item: RespValue) -> Result<Vec<u8>> {
    if item.is_nil() {
        return Ok(Vec::new());
    }
    Value::new(item).bytes()
}
