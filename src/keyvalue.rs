//! Typed key-value surface on top of a [`NaiveKeyValue`].
//!
//! Every key holds one encoded [`Record`]. Commands decode the record,
//! check that its group matches, apply the change in memory and write the
//! re-encoded bytes back. Read-modify-write commands run inside
//! [`NaiveKeyValue::update`], so they are exactly as atomic as the
//! backend's `update`.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{KvError, Result};
use crate::naive::{MemoryNaiveKeyValue, NaiveKeyValue, Update};
use crate::record::{now_ms, Payload, Record};
use crate::resp::{Arg, RespValue};
use crate::types::{Group, TTL_MISSING};
use crate::value::{Value, Values};

/// Redis-flavoured typed store shared by application services.
pub trait KeyValue: Send + Sync {
    fn get(&self, key: &str) -> Value;
    /// Sets `value` and returns the previous string value (nil if absent).
    fn get_set(&self, key: &str, value: Arg<'_>) -> Value;
    fn set(&self, key: &str, value: Arg<'_>) -> Result<()>;
    /// `set` followed by `expire`. If the expire fails the value stays set.
    fn set_ex(&self, key: &str, ttl_seconds: i64, value: Arg<'_>) -> Result<()>;
    /// Increments the integer at `key` (absent counts as 0) and returns it.
    fn incr(&self, key: &str) -> Result<i64>;
    fn del(&self, key: &str) -> Result<()>;
    /// Seconds to expiry, `-1` without expiry, `-2` if absent.
    fn ttl(&self, key: &str) -> Result<i64>;
    /// Returns whether the key existed. A non-positive TTL deletes it.
    fn expire(&self, key: &str, ttl_seconds: i64) -> Result<bool>;

    fn hget(&self, key: &str, field: &str) -> Value;
    /// Field/value pairs flattened in insertion order.
    fn hgetall(&self, key: &str) -> Values;
    /// Returns `true` if the field was new.
    fn hset(&self, key: &str, field: &str, value: Arg<'_>) -> Result<bool>;

    /// Prepends one element and returns the new length.
    fn lpush(&self, key: &str, value: Arg<'_>) -> Result<usize>;
    fn lrange(&self, key: &str, start: i64, stop: i64) -> Values;
    fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()>;
    fn llen(&self, key: &str) -> Result<usize>;

    /// Deletes every key starting with `prefix`. Not atomic.
    fn delete_all(&self, prefix: &str) -> Result<u64>;

    /// The same store with backend calls bound to `ctx`.
    fn with_context(&self, ctx: Context) -> Arc<dyn KeyValue>;
    /// The same store with every key namespaced as `prefix:key`.
    fn with_prefix(&self, prefix: &str) -> Arc<dyn KeyValue>;
}

/// A fresh in-process store.
pub fn memory_key_value() -> Arc<dyn KeyValue> {
    Arc::new(TypedKeyValue::new(Arc::new(MemoryNaiveKeyValue::new())))
}

/// What a read-modify-write wants done with the key.
enum Change {
    Keep,
    Put(Record),
    Remove,
}

/// The dispatch layer: typed commands over an opaque byte backend.
#[derive(Clone)]
pub struct TypedKeyValue {
    naive: Arc<dyn NaiveKeyValue>,
    ctx: Context,
}

impl TypedKeyValue {
    pub fn new(naive: Arc<dyn NaiveKeyValue>) -> Self {
        Self {
            naive,
            ctx: Context::background(),
        }
    }

    pub fn naive(&self) -> &Arc<dyn NaiveKeyValue> {
        &self.naive
    }

    /// Current live record at `key`. Expired records are deleted on the way.
    fn load(&self, key: &str) -> Result<Option<Record>> {
        let raw = match self.naive.get(&self.ctx, key) {
            Ok(raw) => raw,
            Err(KvError::Nil) => return Ok(None),
            Err(e) => return Err(e),
        };
        let record = Record::decode(&raw)?;
        if record.is_expired(now_ms()) {
            tracing::trace!(key, "record past deadline, deleting");
            self.naive.del(&self.ctx, key)?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn load_group(&self, key: &str, group: Group) -> Result<Option<Record>> {
        let record = self.load(key)?;
        if let Some(r) = &record {
            r.expect_group(group)?;
        }
        Ok(record)
    }

    /// Run `op` against the live record inside one backend update.
    ///
    /// `op` may be called more than once if the backend retries. When the
    /// written record carries a deadline, the backend is told about it so a
    /// real store can reap the key itself. That hint is best effort.
    fn modify<T, F>(&self, key: &str, mut op: F) -> Result<T>
    where
        F: FnMut(Option<Record>) -> Result<(Change, T)>,
    {
        let mut out = None;
        let mut written_deadline = None;
        self.naive.update(&self.ctx, key, &mut |raw| {
            written_deadline = None;
            let now = now_ms();
            let (current, expired) = match raw {
                None => (None, false),
                Some(b) => {
                    let r = Record::decode(b)?;
                    if r.is_expired(now) {
                        (None, true)
                    } else {
                        (Some(r), false)
                    }
                }
            };
            let (change, value) = op(current)?;
            // Nothing is written once the caller has given up.
            self.ctx.check()?;
            out = Some(value);
            Ok(match change {
                Change::Keep if expired => Update::Remove,
                Change::Keep => Update::Keep,
                Change::Remove => Update::Remove,
                Change::Put(record) => {
                    written_deadline = record.deadline.map(|d| (d, now));
                    Update::Put(record.encode())
                }
            })
        })?;

        if let Some((deadline, now)) = written_deadline {
            // Rounded up so the backend never reaps before the deadline.
            let remaining_ms = deadline.saturating_mul(1000) - now;
            let hint = (remaining_ms.saturating_add(999) / 1000).max(1);
            // The write is committed and the header deadline still applies,
            // so a lost hint only delays reaping.
            if let Err(e) = self.naive.expire(&self.ctx, key, hint) {
                tracing::debug!(key, error = %e, "backend expire hint failed");
            }
        }
        out.ok_or_else(|| KvError::Corrupt(format!("backend skipped update of {key:?}")))
    }
}

impl KeyValue for TypedKeyValue {
    fn get(&self, key: &str) -> Value {
        match self.load_group(key, Group::String) {
            Ok(Some(Record {
                payload: Payload::String(b),
                ..
            })) => Value::from_bytes(b),
            Ok(_) => Value::nil(),
            Err(e) => Value::from_error(e),
        }
    }

    fn get_set(&self, key: &str, value: Arg<'_>) -> Value {
        let new = value.into_bytes();
        let result = self.modify(key, |current| {
            let previous = match current {
                None => Value::nil(),
                Some(Record {
                    payload: Payload::String(b),
                    ..
                }) => Value::from_bytes(b),
                Some(_) => return Err(KvError::WrongType),
            };
            let record = Record::new(Payload::String(new.clone()));
            Ok((Change::Put(record), previous))
        });
        result.unwrap_or_else(Value::from_error)
    }

    fn set(&self, key: &str, value: Arg<'_>) -> Result<()> {
        let record = Record::new(Payload::String(value.into_bytes()));
        self.naive.set(&self.ctx, key, &record.encode())
    }

    fn set_ex(&self, key: &str, ttl_seconds: i64, value: Arg<'_>) -> Result<()> {
        self.set(key, value)?;
        self.expire(key, ttl_seconds)?;
        Ok(())
    }

    fn incr(&self, key: &str) -> Result<i64> {
        self.modify(key, |current| {
            let (n, deadline) = match current {
                None => (1, None),
                Some(Record {
                    payload: Payload::String(b),
                    deadline,
                }) => {
                    let n: i64 = std::str::from_utf8(&b)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .ok_or(KvError::NotInteger)?;
                    (n.checked_add(1).ok_or(KvError::Overflow)?, deadline)
                }
                Some(_) => return Err(KvError::WrongType),
            };
            let record = Record {
                deadline,
                payload: Payload::String(n.to_string().into_bytes()),
            };
            Ok((Change::Put(record), n))
        })
    }

    fn del(&self, key: &str) -> Result<()> {
        self.naive.del(&self.ctx, key)
    }

    fn ttl(&self, key: &str) -> Result<i64> {
        Ok(match self.load(key)? {
            None => TTL_MISSING,
            Some(r) => r.ttl(now_ms()),
        })
    }

    fn expire(&self, key: &str, ttl_seconds: i64) -> Result<bool> {
        if ttl_seconds <= 0 {
            let existed = self.load(key)?.is_some();
            self.naive.del(&self.ctx, key)?;
            return Ok(existed);
        }
        self.modify(key, |current| match current {
            None => Ok((Change::Keep, false)),
            Some(mut r) => {
                r.deadline = Some((now_ms() / 1000).saturating_add(ttl_seconds));
                Ok((Change::Put(r), true))
            }
        })
    }

    fn hget(&self, key: &str, field: &str) -> Value {
        match self.load_group(key, Group::Hash) {
            Ok(Some(Record {
                payload: Payload::Hash(pairs),
                ..
            })) => pairs
                .into_iter()
                .find(|(f, _)| f.as_slice() == field.as_bytes())
                .map_or_else(Value::nil, |(_, v)| Value::from_bytes(v)),
            Ok(_) => Value::nil(),
            Err(e) => Value::from_error(e),
        }
    }

    fn hgetall(&self, key: &str) -> Values {
        match self.load_group(key, Group::Hash) {
            Ok(Some(Record {
                payload: Payload::Hash(pairs),
                ..
            })) => Values::new(
                pairs
                    .into_iter()
                    .flat_map(|(f, v)| [RespValue::from_bytes(f), RespValue::from_bytes(v)])
                    .collect(),
            ),
            Ok(_) => Values::empty(),
            Err(e) => Values::from_error(e),
        }
    }

    fn hset(&self, key: &str, field: &str, value: Arg<'_>) -> Result<bool> {
        let value = value.into_bytes();
        self.modify(key, |current| {
            let (mut pairs, deadline) = match current {
                None => (Vec::new(), None),
                Some(Record {
                    payload: Payload::Hash(pairs),
                    deadline,
                }) => (pairs, deadline),
                Some(_) => return Err(KvError::WrongType),
            };
            let created = match pairs.iter_mut().find(|(f, _)| f.as_slice() == field.as_bytes()) {
                Some(slot) => {
                    slot.1 = value.clone();
                    false
                }
                None => {
                    pairs.push((field.as_bytes().to_vec(), value.clone()));
                    true
                }
            };
            let record = Record {
                deadline,
                payload: Payload::Hash(pairs),
            };
            Ok((Change::Put(record), created))
        })
    }

    fn lpush(&self, key: &str, value: Arg<'_>) -> Result<usize> {
        let value = value.into_bytes();
        self.modify(key, |current| {
            let (mut items, deadline) = match current {
                None => (Vec::new(), None),
                Some(Record {
                    payload: Payload::List(items),
                    deadline,
                }) => (items, deadline),
                Some(_) => return Err(KvError::WrongType),
            };
            items.insert(0, value.clone());
            let len = items.len();
            let record = Record {
                deadline,
                payload: Payload::List(items),
            };
            Ok((Change::Put(record), len))
        })
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Values {
        match self.load_group(key, Group::List) {
            Ok(Some(Record {
                payload: Payload::List(mut items),
                ..
            })) => match range_bounds(start, stop, items.len()) {
                Some((low, high)) => {
                    items.truncate(high);
                    Values::from_bytes(items.split_off(low))
                }
                None => Values::empty(),
            },
            Ok(_) => Values::empty(),
            Err(e) => Values::from_error(e),
        }
    }

    fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        self.modify(key, |current| {
            let (mut items, deadline) = match current {
                None => return Ok((Change::Keep, ())),
                Some(Record {
                    payload: Payload::List(items),
                    deadline,
                }) => (items, deadline),
                Some(_) => return Err(KvError::WrongType),
            };
            let Some((low, high)) = range_bounds(start, stop, items.len()) else {
                // Redis drops a list once it is empty.
                return Ok((Change::Remove, ()));
            };
            items.truncate(high);
            let items = items.split_off(low);
            let record = Record {
                deadline,
                payload: Payload::List(items),
            };
            Ok((Change::Put(record), ()))
        })
    }

    fn llen(&self, key: &str) -> Result<usize> {
        Ok(match self.load_group(key, Group::List)? {
            Some(Record {
                payload: Payload::List(items),
                ..
            }) => items.len(),
            _ => 0,
        })
    }

    fn delete_all(&self, prefix: &str) -> Result<u64> {
        self.naive.delete_prefix(&self.ctx, prefix)
    }

    fn with_context(&self, ctx: Context) -> Arc<dyn KeyValue> {
        Arc::new(Self {
            naive: self.naive.clone(),
            ctx,
        })
    }

    fn with_prefix(&self, prefix: &str) -> Arc<dyn KeyValue> {
        Arc::new(Prefixed {
            inner: Arc::new(self.clone()),
            prefix: prefix.to_string(),
        })
    }
}

/// Resolve an inclusive `start..=stop` (negative counts from the end)
/// against `len` into a half-open `low..high`. `None` means empty.
///
/// `start` is clamped into `0..len`, so a start past the end still selects
/// the last element. `stop` is clamped into `-1..len`.
pub fn range_bounds(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    if len == 0 {
        return None;
    }
    let low = clamp_offset(0, len, start);
    let high = clamp_offset(-1, len, stop) + 1;
    if high <= low {
        return None;
    }
    Some((low as usize, high as usize))
}

fn clamp_offset(low: i64, high: i64, offset: i64) -> i64 {
    let offset = if offset < 0 {
        high.saturating_add(offset)
    } else {
        offset
    };
    offset.clamp(low, high - 1)
}

/// Namespaces every key of an inner store as `prefix:key`.
pub struct Prefixed {
    inner: Arc<dyn KeyValue>,
    prefix: String,
}

impl Prefixed {
    pub fn new(inner: Arc<dyn KeyValue>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

impl KeyValue for Prefixed {
    fn get(&self, key: &str) -> Value {
        self.inner.get(&self.key(key))
    }

    fn get_set(&self, key: &str, value: Arg<'_>) -> Value {
        self.inner.get_set(&self.key(key), value)
    }

    fn set(&self, key: &str, value: Arg<'_>) -> Result<()> {
        self.inner.set(&self.key(key), value)
    }

    fn set_ex(&self, key: &str, ttl_seconds: i64, value: Arg<'_>) -> Result<()> {
        self.inner.set_ex(&self.key(key), ttl_seconds, value)
    }

    fn incr(&self, key: &str) -> Result<i64> {
        self.inner.incr(&self.key(key))
    }

    fn del(&self, key: &str) -> Result<()> {
        self.inner.del(&self.key(key))
    }

    fn ttl(&self, key: &str) -> Result<i64> {
        self.inner.ttl(&self.key(key))
    }

    fn expire(&self, key: &str, ttl_seconds: i64) -> Result<bool> {
        self.inner.expire(&self.key(key), ttl_seconds)
    }

    fn hget(&self, key: &str, field: &str) -> Value {
        self.inner.hget(&self.key(key), field)
    }

    fn hgetall(&self, key: &str) -> Values {
        self.inner.hgetall(&self.key(key))
    }

    fn hset(&self, key: &str, field: &str, value: Arg<'_>) -> Result<bool> {
        self.inner.hset(&self.key(key), field, value)
    }

    fn lpush(&self, key: &str, value: Arg<'_>) -> Result<usize> {
        self.inner.lpush(&self.key(key), value)
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Values {
        self.inner.lrange(&self.key(key), start, stop)
    }

    fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        self.inner.ltrim(&self.key(key), start, stop)
    }

    fn llen(&self, key: &str) -> Result<usize> {
        self.inner.llen(&self.key(key))
    }

    fn delete_all(&self, prefix: &str) -> Result<u64> {
        self.inner.delete_all(&self.key(prefix))
    }

    fn with_context(&self, ctx: Context) -> Arc<dyn KeyValue> {
        Arc::new(Prefixed {
            inner: self.inner.with_context(ctx),
            prefix: self.prefix.clone(),
        })
    }

    fn with_prefix(&self, prefix: &str) -> Arc<dyn KeyValue> {
        Arc::new(Prefixed {
            inner: self.inner.clone(),
            prefix: self.key(prefix),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naive::Updater;

    fn store() -> (TypedKeyValue, Arc<MemoryNaiveKeyValue>) {
        let naive = Arc::new(MemoryNaiveKeyValue::new());
        (TypedKeyValue::new(naive.clone()), naive)
    }

    fn put_raw(naive: &MemoryNaiveKeyValue, key: &str, record: &Record) {
        naive
            .set(&Context::background(), key, &record.encode())
            .unwrap();
    }

    #[test]
    fn test_range_bounds() {
        assert_eq!(range_bounds(0, -1, 5), Some((0, 5)));
        assert_eq!(range_bounds(1, -2, 5), Some((1, 4)));
        assert_eq!(range_bounds(-4, 3, 5), Some((1, 4)));
        assert_eq!(range_bounds(-100, 100, 5), Some((0, 5)));
        assert_eq!(range_bounds(0, 10, 5), Some((0, 5)));
        assert_eq!(range_bounds(3, 1, 5), None);
        assert_eq!(range_bounds(0, -6, 5), None);
        assert_eq!(range_bounds(0, -1, 0), None);
        // A start past the end sticks to the last element.
        assert_eq!(range_bounds(5, 10, 5), Some((4, 5)));
        assert_eq!(range_bounds(10, 20, 5), Some((4, 5)));
        assert_eq!(range_bounds(i64::MAX, i64::MAX, 5), Some((4, 5)));
        assert_eq!(range_bounds(i64::MIN, i64::MIN, 5), None);
    }

    #[test]
    fn test_range_past_end_keeps_last() {
        let (kv, _) = store();
        for v in ["4", "3", "2", "1", "0"] {
            kv.lpush("l", v.into()).unwrap();
        }
        assert_eq!(kv.lrange("l", 10, 20).strings().unwrap(), vec!["4"]);
        kv.ltrim("l", 5, 10).unwrap();
        assert_eq!(kv.lrange("l", 0, -1).strings().unwrap(), vec!["4"]);
        assert_eq!(kv.llen("l").unwrap(), 1);
    }

    #[test]
    fn test_wrong_type_leaves_value() {
        let (kv, _) = store();
        kv.set("s", "keep".into()).unwrap();
        assert!(kv.hget("s", "f").err().unwrap().is_wrong_type());
        assert!(kv.hset("s", "f", "v".into()).unwrap_err().is_wrong_type());
        assert!(kv.lpush("s", "v".into()).unwrap_err().is_wrong_type());
        assert!(kv.llen("s").unwrap_err().is_wrong_type());
        assert_eq!(kv.get("s").string().unwrap(), "keep");

        kv.lpush("l", "x".into()).unwrap();
        assert!(kv.get("l").err().unwrap().is_wrong_type());
        assert!(kv.incr("l").unwrap_err().is_wrong_type());
        assert!(kv.get_set("l", "y".into()).err().unwrap().is_wrong_type());
        assert_eq!(kv.llen("l").unwrap(), 1);
    }

    #[test]
    fn test_set_overwrites_any_group() {
        let (kv, _) = store();
        kv.hset("k", "f", "v".into()).unwrap();
        kv.set("k", "s".into()).unwrap();
        assert_eq!(kv.get("k").string().unwrap(), "s");
    }

    #[test]
    fn test_del_unbinds_group() {
        let (kv, _) = store();
        kv.set("k", "1".into()).unwrap();
        kv.del("k").unwrap();
        kv.lpush("k", "a".into()).unwrap();
        assert_eq!(kv.llen("k").unwrap(), 1);
    }

    #[test]
    fn test_expired_record_is_removed_on_read() {
        let (kv, naive) = store();
        let past = now_ms() / 1000 - 10;
        put_raw(
            &naive,
            "old",
            &Record {
                deadline: Some(past),
                payload: Payload::String(b"v".to_vec()),
            },
        );
        assert!(naive.contains_raw("old"));
        assert_eq!(kv.ttl("old").unwrap(), TTL_MISSING);
        assert!(!naive.contains_raw("old"));

        put_raw(
            &naive,
            "old",
            &Record {
                deadline: Some(past),
                payload: Payload::String(b"v".to_vec()),
            },
        );
        assert!(kv.get("old").is_nil());
        assert!(!naive.contains_raw("old"));
    }

    #[test]
    fn test_expired_record_does_not_keep_group() {
        let (kv, naive) = store();
        put_raw(
            &naive,
            "k",
            &Record {
                deadline: Some(1),
                payload: Payload::Hash(vec![(b"f".to_vec(), b"v".to_vec())]),
            },
        );
        assert_eq!(kv.lpush("k", "a".into()).unwrap(), 1);
        assert_eq!(kv.lrange("k", 0, -1).strings().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_ltrim_of_expired_list_removes_it() {
        let (kv, naive) = store();
        put_raw(
            &naive,
            "l",
            &Record {
                deadline: Some(1),
                payload: Payload::List(vec![b"a".to_vec()]),
            },
        );
        kv.ltrim("l", 0, -1).unwrap();
        assert!(!naive.contains_raw("l"));
    }

    #[test]
    fn test_corrupt_record_surfaces() {
        let (kv, naive) = store();
        naive
            .set(&Context::background(), "bad", b"!h:0\r\n*1\r\n$1\r\na\r\n")
            .unwrap();
        assert!(matches!(kv.hgetall("bad").err(), Some(KvError::Corrupt(_))));
        assert!(matches!(
            kv.hset("bad", "f", "v".into()),
            Err(KvError::Corrupt(_))
        ));

        naive.set(&Context::background(), "junk", b"hello").unwrap();
        assert!(matches!(kv.get("junk").err(), Some(KvError::Corrupt(_))));
    }

    #[test]
    fn test_deeply_nested_record_is_an_error() {
        let (kv, naive) = store();
        let mut raw = b"!l:0\r\n".to_vec();
        for _ in 0..20_000 {
            raw.extend_from_slice(b"*1\r\n");
        }
        naive.set(&Context::background(), "deep", &raw).unwrap();
        assert!(matches!(kv.llen("deep"), Err(KvError::Protocol(_))));
        assert!(kv.lrange("deep", 0, -1).err().is_some());
    }

    #[test]
    fn test_writes_preserve_deadline() {
        let (kv, naive) = store();
        kv.hset("h", "a", "1".into()).unwrap();
        assert!(kv.expire("h", 100).unwrap());
        kv.hset("h", "b", "2".into()).unwrap();
        let ttl = kv.ttl("h").unwrap();
        assert!((99..=100).contains(&ttl), "ttl was {ttl}");
        // The backend was told as well.
        let raw_ttl = naive.ttl(&Context::background(), "h").unwrap();
        assert!((99..=100).contains(&raw_ttl), "raw ttl was {raw_ttl}");

        // SET clears it.
        kv.set_ex("s", 100, "x".into()).unwrap();
        kv.set("s", "y".into()).unwrap();
        assert_eq!(kv.ttl("s").unwrap(), -1);
    }

    /// Memory backend whose `expire` always fails.
    struct NoExpire(MemoryNaiveKeyValue);

    impl NaiveKeyValue for NoExpire {
        fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
            self.0.get(ctx, key)
        }

        fn set(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
            self.0.set(ctx, key, value)
        }

        fn del(&self, ctx: &Context, key: &str) -> Result<()> {
            self.0.del(ctx, key)
        }

        fn expire(&self, _ctx: &Context, _key: &str, _ttl_seconds: i64) -> Result<()> {
            Err(KvError::Unsupported("expire"))
        }

        fn ttl(&self, ctx: &Context, key: &str) -> Result<i64> {
            self.0.ttl(ctx, key)
        }

        fn update(&self, ctx: &Context, key: &str, f: &mut Updater<'_>) -> Result<()> {
            self.0.update(ctx, key, f)
        }
    }

    #[test]
    fn test_failed_expire_hint_keeps_write() {
        let kv = TypedKeyValue::new(Arc::new(NoExpire(MemoryNaiveKeyValue::new())));
        let deadline = now_ms() / 1000 + 100;
        let record = Record {
            deadline: Some(deadline),
            payload: Payload::List(vec![b"a".to_vec()]),
        };
        kv.naive()
            .set(&Context::background(), "l", &record.encode())
            .unwrap();

        assert_eq!(kv.lpush("l", "b".into()).unwrap(), 2);
        assert_eq!(kv.lrange("l", 0, -1).strings().unwrap(), vec!["b", "a"]);
        let ttl = kv.ttl("l").unwrap();
        assert!((99..=100).contains(&ttl), "ttl was {ttl}");

        kv.set("s", "1".into()).unwrap();
        assert!(kv.expire("s", 50).unwrap());
        assert!(kv.ttl("s").unwrap() > 0);
    }

    #[test]
    fn test_expire_missing_key() {
        let (kv, _) = store();
        assert!(!kv.expire("nope", 10).unwrap());
        assert!(!kv.expire("nope", 0).unwrap());
        assert_eq!(kv.ttl("nope").unwrap(), TTL_MISSING);
    }

    #[test]
    fn test_incr_overflow_and_garbage() {
        let (kv, _) = store();
        kv.set("max", i64::MAX.into()).unwrap();
        assert!(matches!(kv.incr("max"), Err(KvError::Overflow)));
        kv.set("text", "abc".into()).unwrap();
        assert!(matches!(kv.incr("text"), Err(KvError::NotInteger)));
        assert_eq!(kv.get("text").string().unwrap(), "abc");
        kv.set("neg", (-3i64).into()).unwrap();
        assert_eq!(kv.incr("neg").unwrap(), -2);
    }

    #[test]
    fn test_canceled_context_writes_nothing() {
        let (kv, naive) = store();
        let (ctx, token) = Context::with_cancel();
        let bound = kv.with_context(ctx);
        bound.set("k", "1".into()).unwrap();
        token.cancel();
        assert!(matches!(bound.incr("k"), Err(KvError::Canceled)));
        assert!(matches!(bound.get("k").err(), Some(KvError::Canceled)));
        assert_eq!(kv.get("k").int().unwrap(), 1);
        assert_eq!(naive.raw_len(), 1);
    }

    #[test]
    fn test_prefix_namespacing() {
        let (kv, naive) = store();
        let a = kv.with_prefix("a");
        let ab = a.with_prefix("b");
        a.set("k", "1".into()).unwrap();
        ab.set("k", "2".into()).unwrap();
        kv.set("k", "0".into()).unwrap();

        assert!(naive.contains_raw("a:k"));
        assert!(naive.contains_raw("a:b:k"));
        assert_eq!(a.get("k").string().unwrap(), "1");
        assert_eq!(ab.get("k").string().unwrap(), "2");

        assert_eq!(a.delete_all("").unwrap(), 2);
        assert!(a.get("k").is_nil());
        assert!(ab.get("k").is_nil());
        assert_eq!(kv.get("k").string().unwrap(), "0");
    }
}
