//! Minimal RESP encoder/decoder used for on-backend records.
//!
//! This is not a network codec. It writes bulk strings, arrays and integers
//! into a buffer and parses the five reply sigils back out, failing with
//! [`KvError::Protocol`] on anything malformed instead of panicking.

use std::borrow::Cow;

use bytes::{Buf, BufMut, BytesMut};

use super::RespValue;
use crate::error::{KvError, Result};
use crate::types::Group;

/// Marker byte that opens every record header. Gives us room to change the
/// layout later.
pub const RECORD_MARKER: u8 = b'!';

/// Records nest at most one array deep; anything far past that is garbage.
const MAX_NESTING: usize = 32;

/// A scalar argument accepted by write commands.
///
/// Only these shapes can be stored; anything else has to be converted by the
/// caller first.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg<'a> {
    Bytes(Cow<'a, [u8]>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
}

impl<'a> Arg<'a> {
    /// Canonical text for the argument, as it is stored on the backend.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Arg::Bytes(b) => b.into_owned(),
            Arg::Int(n) => n.to_string().into_bytes(),
            Arg::Float(f) => f.to_string().into_bytes(),
            Arg::Bool(true) => b"1".to_vec(),
            Arg::Bool(false) => b"0".to_vec(),
            Arg::Nil => Vec::new(),
        }
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(s: &'a str) -> Self {
        Arg::Bytes(Cow::Borrowed(s.as_bytes()))
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(s: &'a String) -> Self {
        Arg::Bytes(Cow::Borrowed(s.as_bytes()))
    }
}

impl From<String> for Arg<'static> {
    fn from(s: String) -> Self {
        Arg::Bytes(Cow::Owned(s.into_bytes()))
    }
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(b: &'a [u8]) -> Self {
        Arg::Bytes(Cow::Borrowed(b))
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Arg<'a> {
    fn from(b: &'a [u8; N]) -> Self {
        Arg::Bytes(Cow::Borrowed(b.as_slice()))
    }
}

impl<'a> From<&'a Vec<u8>> for Arg<'a> {
    fn from(b: &'a Vec<u8>) -> Self {
        Arg::Bytes(Cow::Borrowed(b.as_slice()))
    }
}

impl From<Vec<u8>> for Arg<'static> {
    fn from(b: Vec<u8>) -> Self {
        Arg::Bytes(Cow::Owned(b))
    }
}

impl From<i64> for Arg<'static> {
    fn from(n: i64) -> Self {
        Arg::Int(n)
    }
}

impl From<i32> for Arg<'static> {
    fn from(n: i32) -> Self {
        Arg::Int(i64::from(n))
    }
}

impl From<u32> for Arg<'static> {
    fn from(n: u32) -> Self {
        Arg::Int(i64::from(n))
    }
}

impl From<usize> for Arg<'static> {
    fn from(n: usize) -> Self {
        // Lengths beyond i64::MAX do not occur in practice; saturate rather
        // than wrap.
        Arg::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Arg<'static> {
    fn from(f: f64) -> Self {
        Arg::Float(f)
    }
}

impl From<bool> for Arg<'static> {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl<'a, T: Into<Arg<'a>>> From<Option<T>> for Arg<'a> {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Arg::Nil, Into::into)
    }
}

/// Appends RESP frames to an in-memory buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a `$<n>\r\n` or `*<n>\r\n` style length line.
    pub fn write_len(&mut self, prefix: u8, n: usize) {
        self.buf.put_u8(prefix);
        self.buf.put_slice(n.to_string().as_bytes());
        self.buf.put_slice(b"\r\n");
    }

    pub fn write_bulk(&mut self, data: &[u8]) {
        self.write_len(b'$', data.len());
        self.buf.put_slice(data);
        self.buf.put_slice(b"\r\n");
    }

    pub fn write_integer(&mut self, n: i64) {
        self.buf.put_u8(b':');
        self.buf.put_slice(n.to_string().as_bytes());
        self.buf.put_slice(b"\r\n");
    }

    /// Scalars are always stored as bulk strings of their canonical text.
    pub fn write_arg(&mut self, arg: &Arg<'_>) {
        match arg {
            Arg::Bytes(b) => self.write_bulk(b),
            other => self.write_bulk(&other.clone().into_bytes()),
        }
    }

    /// Marker, group tag, then the absolute unix deadline in seconds
    /// (0 for no expiry).
    pub fn write_header(&mut self, group: Group, deadline: i64) {
        self.buf.put_u8(RECORD_MARKER);
        self.buf.put_u8(group.as_byte());
        self.write_integer(deadline);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Reads RESP frames out of a borrowed byte slice.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Read one CRLF-terminated line, without the terminator.
    pub fn read_line(&mut self) -> Result<&'a [u8]> {
        let chunk: &'a [u8] = self.buf;
        let Some(nl) = chunk.iter().position(|&b| b == b'\n') else {
            return Err(protocol("truncated response line"));
        };
        if nl == 0 || chunk[nl - 1] != b'\r' {
            return Err(protocol("bad response line terminator"));
        }
        self.buf.advance(nl + 1);
        Ok(&chunk[..nl - 1])
    }

    pub fn read_reply(&mut self) -> Result<RespValue> {
        self.read_nested(0)
    }

    fn read_nested(&mut self, depth: usize) -> Result<RespValue> {
        let line = self.read_line()?;
        let Some((&sigil, rest)) = line.split_first() else {
            return Err(protocol("short response line"));
        };
        match sigil {
            b'+' => Ok(RespValue::SimpleString(
                String::from_utf8_lossy(rest).into_owned(),
            )),
            b'-' => Ok(RespValue::Error(String::from_utf8_lossy(rest).into_owned())),
            b':' => parse_int(rest).map(RespValue::Integer),
            b'$' => {
                let Some(n) = parse_len(rest)? else {
                    return Ok(RespValue::BulkString(None));
                };
                if self.buf.remaining() < n.saturating_add(2) {
                    return Err(protocol("truncated bulk string"));
                }
                let data = self.buf[..n].to_vec();
                self.buf.advance(n);
                if self.read_line()?.is_empty() {
                    Ok(RespValue::BulkString(Some(data)))
                } else {
                    Err(protocol("bad bulk string format"))
                }
            }
            b'*' => {
                let Some(n) = parse_len(rest)? else {
                    return Ok(RespValue::Array(None));
                };
                if depth >= MAX_NESTING {
                    return Err(protocol("nesting too deep"));
                }
                // Every element takes at least 3 bytes, so a length beyond
                // that is already truncated; don't trust it for allocation.
                let mut items = Vec::with_capacity(n.min(self.buf.remaining() / 3));
                for _ in 0..n {
                    items.push(self.read_nested(depth + 1)?);
                }
                Ok(RespValue::Array(Some(items)))
            }
            _ => Err(protocol("unexpected response line")),
        }
    }

    /// Read a record header written by [`Encoder::write_header`].
    pub fn read_header(&mut self) -> Result<(Group, i64)> {
        if self.buf.remaining() < 2 {
            return Err(KvError::Corrupt("failed to parse value header".into()));
        }
        let marker = self.buf.get_u8();
        if marker != RECORD_MARKER {
            return Err(KvError::Corrupt(format!(
                "expected first byte of value header to be '!' got {:?}",
                char::from(marker)
            )));
        }
        let tag = self.buf.get_u8();
        let group = Group::from_byte(tag).ok_or_else(|| {
            KvError::Corrupt(format!("unknown redis group {:?}", char::from(tag)))
        })?;

        let deadline = match self.read_reply() {
            Ok(RespValue::Integer(n)) => n,
            // A bulk string deadline is accepted too.
            Ok(RespValue::BulkString(Some(b))) => std::str::from_utf8(&b)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| KvError::Corrupt("failed to parse value deadline".into()))?,
            Ok(other) => {
                return Err(KvError::Corrupt(format!(
                    "failed to parse value deadline: got {}",
                    other.kind()
                )))
            }
            Err(e) => {
                return Err(KvError::Corrupt(format!(
                    "failed to parse value deadline: {e}"
                )))
            }
        };
        if deadline < 0 {
            return Err(KvError::Corrupt(format!("negative deadline {deadline}")));
        }
        Ok((group, deadline))
    }
}

fn protocol(msg: &str) -> KvError {
    KvError::Protocol(msg.to_string())
}

/// Parses bulk string and array lengths. `-1` is the nil length.
fn parse_len(p: &[u8]) -> Result<Option<usize>> {
    if p == b"-1" {
        return Ok(None);
    }
    if p.is_empty() {
        return Err(protocol("malformed length"));
    }
    let mut n: usize = 0;
    for &b in p {
        if !b.is_ascii_digit() {
            return Err(protocol("illegal bytes in length"));
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add(usize::from(b - b'0')))
            .ok_or_else(|| protocol("length overflow"))?;
    }
    Ok(Some(n))
}

fn parse_int(p: &[u8]) -> Result<i64> {
    let (negate, digits) = match p.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, p),
    };
    if digits.is_empty() {
        return Err(protocol("malformed integer"));
    }
    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(protocol("illegal bytes in integer"));
        }
        let d = i64::from(b - b'0');
        n = n
            .checked_mul(10)
            .and_then(|n| if negate { n.checked_sub(d) } else { n.checked_add(d) })
            .ok_or_else(|| protocol("integer overflow"))?;
    }
    Ok(n)
}
