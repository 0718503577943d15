//! Redkv - typed Redis-style commands over pluggable byte stores
//!
//! Values are stored as self-describing records (`!` + group + deadline +
//! RESP payload), so any store that can get, set and delete bytes can serve
//! strings, hashes and lists with Redis semantics.
//!
//! # Example
//!
//! ```
//! use redkv::{memory_key_value, KeyValue};
//!
//! let kv = memory_key_value();
//!
//! kv.set("key", "value".into()).unwrap();
//! assert_eq!(kv.get("key").string().unwrap(), "value");
//!
//! kv.hset("user:1", "name", "ada".into()).unwrap();
//! assert_eq!(kv.hgetall("user:1").string_map().unwrap()["name"], "ada");
//!
//! assert!(kv.get("missing").is_nil());
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod keyvalue;
pub mod naive;
pub mod record;
pub mod resp;
pub mod server;
pub mod types;
pub mod value;

pub use backend::Backend;
pub use config::StoreConfig;
pub use context::Context;
pub use error::{KvError, Result};
pub use keyvalue::{memory_key_value, KeyValue, Prefixed, TypedKeyValue};
pub use naive::{MemoryNaiveKeyValue, NaiveKeyValue, Update};
#[cfg(feature = "redis-backend")]
pub use naive::RedisNaiveKeyValue;
pub use resp::{Arg, RespValue};
pub use server::Server;
pub use types::Group;
pub use value::{Value, Values};
