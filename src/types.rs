/// TTL reply for a key that exists but carries no deadline.
pub const TTL_NO_EXPIRY: i64 = -1;
/// TTL reply for a key that is absent or already expired.
pub const TTL_MISSING: i64 = -2;

/// Which family of commands a key belongs to. Redis calls these command
/// groups; `String` is the classic GET/SET group and does not imply the
/// payload is text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Group {
    String = b's',
    List = b'l',
    Hash = b'h',
}

impl Group {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b's' => Some(Group::String),
            b'l' => Some(Group::List),
            b'h' => Some(Group::Hash),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Group::String => "string",
            Group::List => "list",
            Group::Hash => "hash",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_bytes() {
        for g in [Group::String, Group::List, Group::Hash] {
            assert_eq!(Group::from_byte(g.as_byte()), Some(g));
        }
        assert_eq!(Group::from_byte(b'z'), None);
        assert_eq!(Group::Hash.as_byte(), b'h');
    }
}
