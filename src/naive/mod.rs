//! The minimal byte-oriented contract every storage adapter provides.
//!
//! Backends never see structure: they store opaque blobs, track expiry and
//! report "not found" as [`KvError::Nil`], never as an empty value. The typed
//! layer in [`crate::keyvalue`] builds strings, lists and hashes on top.

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

use crate::context::Context;
use crate::error::{KvError, Result};

pub use memory::MemoryNaiveKeyValue;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisNaiveKeyValue;

/// Outcome of an update callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Leave the key as it is.
    Keep,
    /// Replace the key's bytes.
    Put(Vec<u8>),
    /// Delete the key.
    Remove,
}

/// Callback run by [`NaiveKeyValue::update`]. Receives the current bytes
/// (`None` if absent) and may be invoked more than once by backends that
/// retry optimistically.
pub type Updater<'a> = dyn FnMut(Option<&[u8]>) -> Result<Update> + 'a;

pub trait NaiveKeyValue: Send + Sync {
    /// Returns `Err(KvError::Nil)` when the key is absent or expired.
    fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>>;

    /// Stores `value`, clearing any backend-level expiry.
    fn set(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()>;

    fn del(&self, ctx: &Context, key: &str) -> Result<()>;

    /// A non-positive TTL deletes the key. Missing keys are ignored.
    fn expire(&self, ctx: &Context, key: &str, ttl_seconds: i64) -> Result<()>;

    /// Seconds until expiry, `-1` without expiry, `-2` if absent.
    fn ttl(&self, ctx: &Context, key: &str) -> Result<i64>;

    /// Read-modify-write of one key.
    ///
    /// The default runs `get` then `set`/`del` as separate calls, so two
    /// concurrent updates of the same key can lose a write. Backends that can
    /// do better (a lock, CAS, WATCH/MULTI) override this. If `f` fails
    /// nothing is written and its error is returned.
    fn update(&self, ctx: &Context, key: &str, f: &mut Updater<'_>) -> Result<()> {
        let current = match self.get(ctx, key) {
            Ok(b) => Some(b),
            Err(KvError::Nil) => None,
            Err(e) => return Err(e),
        };
        match f(current.as_deref())? {
            Update::Keep => Ok(()),
            Update::Put(b) => self.set(ctx, key, &b),
            Update::Remove => self.del(ctx, key),
        }
    }

    /// Deletes every key starting with `prefix`, returning how many went.
    /// Not atomic with respect to concurrent writers.
    fn delete_prefix(&self, ctx: &Context, prefix: &str) -> Result<u64> {
        let _ = (ctx, prefix);
        Err(KvError::Unsupported("delete_prefix"))
    }
}
