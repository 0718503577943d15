use bytes::{BufMut, BytesMut};

use crate::error::WRONGTYPE_MESSAGE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    pub fn null() -> Self {
        RespValue::BulkString(None)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        RespValue::Error(format!("ERR {}", msg.into()))
    }

    pub fn wrong_type() -> Self {
        RespValue::Error(WRONGTYPE_MESSAGE.to_string())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        RespValue::BulkString(Some(bytes))
    }

    pub fn from_string(s: String) -> Self {
        RespValue::BulkString(Some(s.into_bytes()))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, RespValue::BulkString(None) | RespValue::Array(None))
    }

    /// Short name used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(Some(_)) => "bulk string",
            RespValue::BulkString(None) | RespValue::Array(None) => "nil",
            RespValue::Array(Some(_)) => "array",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.to_vec()
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => put_line(buf, b'+', s.as_bytes()),
            RespValue::Error(s) => put_line(buf, b'-', s.as_bytes()),
            RespValue::Integer(n) => put_line(buf, b':', n.to_string().as_bytes()),
            RespValue::BulkString(None) => buf.put_slice(b"$-1\r\n"),
            RespValue::BulkString(Some(data)) => {
                put_line(buf, b'$', data.len().to_string().as_bytes());
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            RespValue::Array(None) => buf.put_slice(b"*-1\r\n"),
            RespValue::Array(Some(items)) => {
                put_line(buf, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.encode_into(buf);
                }
            }
        }
    }
}

fn put_line(buf: &mut BytesMut, sigil: u8, body: &[u8]) {
    buf.put_u8(sigil);
    buf.put_slice(body);
    buf.put_slice(b"\r\n");
}

impl From<i64> for RespValue {
    fn from(n: i64) -> Self {
        RespValue::Integer(n)
    }
}

impl From<bool> for RespValue {
    fn from(b: bool) -> Self {
        RespValue::Integer(if b { 1 } else { 0 })
    }
}

impl From<String> for RespValue {
    fn from(s: String) -> Self {
        RespValue::from_string(s)
    }
}

impl From<Vec<u8>> for RespValue {
    fn from(bytes: Vec<u8>) -> Self {
        RespValue::from_bytes(bytes)
    }
}

impl From<Option<Vec<u8>>> for RespValue {
    fn from(opt: Option<Vec<u8>>) -> Self {
        RespValue::BulkString(opt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_simple_string() {
        assert_eq!(RespValue::ok().encode(), b"+OK\r\n");
    }

    #[test]
    fn test_encode_error() {
        let v = RespValue::error("something went wrong");
        assert_eq!(v.encode(), b"-ERR something went wrong\r\n");
        assert!(RespValue::wrong_type().encode().starts_with(b"-WRONGTYPE "));
    }

    #[test]
    fn test_encode_integer() {
        assert_eq!(RespValue::Integer(-42).encode(), b":-42\r\n");
    }

    #[test]
    fn test_encode_bulk_string() {
        let v = RespValue::BulkString(Some(b"hello".to_vec()));
        assert_eq!(v.encode(), b"$5\r\nhello\r\n");
        assert_eq!(RespValue::null().encode(), b"$-1\r\n");
    }

    #[test]
    fn test_encode_array() {
        let v = RespValue::Array(Some(vec![
            RespValue::from_bytes(b"foo".to_vec()),
            RespValue::Integer(7),
        ]));
        assert_eq!(v.encode(), b"*2\r\n$3\r\nfoo\r\n:7\r\n");
        assert_eq!(RespValue::Array(None).encode(), b"*-1\r\n");
    }

    #[test]
    fn test_kind() {
        assert!(RespValue::Array(None).is_nil());
        assert_eq!(RespValue::Array(None).kind(), "nil");
        assert_eq!(RespValue::Integer(1).kind(), "integer");
    }
}
