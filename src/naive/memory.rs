use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{NaiveKeyValue, Update, Updater};
use crate::context::Context;
use crate::error::{KvError, Result};
use crate::types::{TTL_MISSING, TTL_NO_EXPIRY};

struct Entry {
    value: Vec<u8>,
    deadline: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

/// In-process backend: a map guarded by one mutex, with lazy expiry.
///
/// Each call holds the lock for its whole read-check-write, so
/// [`NaiveKeyValue::update`] is atomic here.
#[derive(Default)]
pub struct MemoryNaiveKeyValue {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryNaiveKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones nobody has touched
    /// yet.
    pub fn raw_len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether an entry is physically present, ignoring expiry.
    pub fn contains_raw(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }
}

/// Look up a live entry, dropping it first if its deadline has passed.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    if entries
        .get(key)
        .is_some_and(|e| e.is_expired(Instant::now()))
    {
        entries.remove(key);
        tracing::trace!(key, "lazily expired");
        return None;
    }
    entries.get_mut(key)
}

impl NaiveKeyValue for MemoryNaiveKeyValue {
    fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        ctx.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        live(&mut entries, key)
            .map(|e| e.value.clone())
            .ok_or(KvError::Nil)
    }

    fn set(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
        ctx.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                deadline: None,
            },
        );
        Ok(())
    }

    fn del(&self, ctx: &Context, key: &str) -> Result<()> {
        ctx.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    fn expire(&self, ctx: &Context, key: &str, ttl_seconds: i64) -> Result<()> {
        ctx.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if ttl_seconds <= 0 {
            entries.remove(key);
            return Ok(());
        }
        if let Some(entry) = live(&mut entries, key) {
            // A deadline past what Instant can hold is the same as none.
            entry.deadline = Instant::now().checked_add(Duration::from_secs(ttl_seconds as u64));
        }
        Ok(())
    }

    fn ttl(&self, ctx: &Context, key: &str) -> Result<i64> {
        ctx.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = live(&mut entries, key) else {
            return Ok(TTL_MISSING);
        };
        let Some(deadline) = entry.deadline else {
            return Ok(TTL_NO_EXPIRY);
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        // Round up to the nearest second.
        let millis = remaining.as_millis() as i64;
        Ok(((millis + 999) / 1000).max(1))
    }

    fn update(&self, ctx: &Context, key: &str, f: &mut Updater<'_>) -> Result<()> {
        ctx.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let current = live(&mut entries, key).map(|e| e.value.as_slice());
        match f(current)? {
            Update::Keep => {}
            Update::Put(value) => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value,
                        deadline: None,
                    },
                );
            }
            Update::Remove => {
                entries.remove(key);
            }
        }
        Ok(())
    }

    fn delete_prefix(&self, ctx: &Context, prefix: &str) -> Result<u64> {
        ctx.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::background()
    }

    #[test]
    fn test_get_missing_is_nil() {
        let m = MemoryNaiveKeyValue::new();
        assert!(m.get(&ctx(), "nope").unwrap_err().is_nil());
    }

    #[test]
    fn test_set_get_del() {
        let m = MemoryNaiveKeyValue::new();
        m.set(&ctx(), "k", b"v").unwrap();
        assert_eq!(m.get(&ctx(), "k").unwrap(), b"v");
        m.del(&ctx(), "k").unwrap();
        assert!(m.get(&ctx(), "k").unwrap_err().is_nil());
    }

    #[test]
    fn test_empty_value_is_not_missing() {
        let m = MemoryNaiveKeyValue::new();
        m.set(&ctx(), "k", b"").unwrap();
        assert_eq!(m.get(&ctx(), "k").unwrap(), b"");
    }

    #[test]
    fn test_ttl_states() {
        let m = MemoryNaiveKeyValue::new();
        assert_eq!(m.ttl(&ctx(), "k").unwrap(), TTL_MISSING);
        m.set(&ctx(), "k", b"v").unwrap();
        assert_eq!(m.ttl(&ctx(), "k").unwrap(), TTL_NO_EXPIRY);
        m.expire(&ctx(), "k", 60).unwrap();
        let ttl = m.ttl(&ctx(), "k").unwrap();
        assert!((59..=60).contains(&ttl), "ttl was {ttl}");
        // SET clears the expiry.
        m.set(&ctx(), "k", b"v2").unwrap();
        assert_eq!(m.ttl(&ctx(), "k").unwrap(), TTL_NO_EXPIRY);
    }

    #[test]
    fn test_expire_non_positive_deletes() {
        let m = MemoryNaiveKeyValue::new();
        m.set(&ctx(), "k", b"v").unwrap();
        m.expire(&ctx(), "k", 0).unwrap();
        assert!(!m.contains_raw("k"));
        assert_eq!(m.ttl(&ctx(), "k").unwrap(), TTL_MISSING);

        m.set(&ctx(), "k", b"v").unwrap();
        m.expire(&ctx(), "k", -5).unwrap();
        assert!(!m.contains_raw("k"));
    }

    #[test]
    fn test_expire_missing_is_noop() {
        let m = MemoryNaiveKeyValue::new();
        m.expire(&ctx(), "ghost", 10).unwrap();
        assert_eq!(m.raw_len(), 0);
    }

    #[test]
    fn test_lazy_expiry_removes_entry() {
        let m = MemoryNaiveKeyValue::new();
        m.set(&ctx(), "k", b"v").unwrap();
        m.entries.lock().unwrap().get_mut("k").unwrap().deadline =
            Some(Instant::now() - Duration::from_secs(1));
        assert!(m.contains_raw("k"));
        assert!(m.get(&ctx(), "k").unwrap_err().is_nil());
        assert!(!m.contains_raw("k"));
    }

    #[test]
    fn test_update() {
        let m = MemoryNaiveKeyValue::new();
        m.update(&ctx(), "k", &mut |cur| {
            assert!(cur.is_none());
            Ok(Update::Put(b"1".to_vec()))
        })
        .unwrap();
        m.update(&ctx(), "k", &mut |cur| {
            assert_eq!(cur, Some(&b"1"[..]));
            Ok(Update::Keep)
        })
        .unwrap();
        assert_eq!(m.get(&ctx(), "k").unwrap(), b"1");

        let err = m
            .update(&ctx(), "k", &mut |_| Err(KvError::WrongType))
            .unwrap_err();
        assert!(err.is_wrong_type());
        assert_eq!(m.get(&ctx(), "k").unwrap(), b"1");

        m.update(&ctx(), "k", &mut |_| Ok(Update::Remove)).unwrap();
        assert!(!m.contains_raw("k"));
    }

    #[test]
    fn test_update_is_atomic_across_threads() {
        let m = std::sync::Arc::new(MemoryNaiveKeyValue::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = m.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.update(&Context::background(), "n", &mut |cur| {
                            let n: u64 = cur
                                .map(|b| std::str::from_utf8(b).unwrap().parse().unwrap())
                                .unwrap_or(0);
                            Ok(Update::Put((n + 1).to_string().into_bytes()))
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.get(&ctx(), "n").unwrap(), b"800");
    }

    #[test]
    fn test_delete_prefix() {
        let m = MemoryNaiveKeyValue::new();
        for k in ["a:1", "a:2", "b:1"] {
            m.set(&ctx(), k, b"x").unwrap();
        }
        assert_eq!(m.delete_prefix(&ctx(), "a:").unwrap(), 2);
        assert_eq!(m.raw_len(), 1);
        assert!(m.contains_raw("b:1"));
    }

    #[test]
    fn test_expire_huge_ttl() {
        let m = MemoryNaiveKeyValue::new();
        m.set(&ctx(), "k", b"v").unwrap();
        m.expire(&ctx(), "k", i64::MAX).unwrap();
        assert_eq!(m.get(&ctx(), "k").unwrap(), b"v");
        assert_eq!(m.ttl(&ctx(), "k").unwrap(), TTL_NO_EXPIRY);
    }

    #[test]
    fn test_canceled_context() {
        let m = MemoryNaiveKeyValue::new();
        let (ctx, token) = Context::with_cancel();
        token.cancel();
        assert!(matches!(m.set(&ctx, "k", b"v"), Err(KvError::Canceled)));
        assert_eq!(m.raw_len(), 0);
    }
}
