//! Naive backend over a real Redis server.
//!
//! Each call opens its own connection; pooling, retries and auth policy are
//! left to the caller's URL and infrastructure.

use std::time::Duration;

use redis::{Client, Connection};

use super::{NaiveKeyValue, Update, Updater};
use crate::context::Context;
use crate::error::{KvError, Result};

/// Keys deleted per DEL when clearing a prefix.
const DELETE_BATCH_SIZE: usize = 5000;

pub struct RedisNaiveKeyValue {
    client: Client,
}

impl RedisNaiveKeyValue {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn open(url: &str) -> Result<Self> {
        Ok(Self::new(Client::open(url)?))
    }

    /// Connects, bounding socket reads and writes by the context deadline.
    fn conn(&self, ctx: &Context) -> Result<Connection> {
        ctx.check()?;
        let Some(remaining) = ctx.remaining() else {
            return Ok(self.client.get_connection()?);
        };
        // Zero would mean "no timeout" to the socket layer.
        let timeout = remaining.max(Duration::from_millis(1));
        let con = self.client.get_connection_with_timeout(timeout)?;
        con.set_read_timeout(Some(timeout))?;
        con.set_write_timeout(Some(timeout))?;
        Ok(con)
    }
}

impl NaiveKeyValue for RedisNaiveKeyValue {
    fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        let mut con = self.conn(ctx)?;
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query(&mut con)?;
        value.ok_or(KvError::Nil)
    }

    fn set(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
        let mut con = self.conn(ctx)?;
        redis::cmd("SET").arg(key).arg(value).query::<()>(&mut con)?;
        Ok(())
    }

    fn del(&self, ctx: &Context, key: &str) -> Result<()> {
        let mut con = self.conn(ctx)?;
        redis::cmd("DEL").arg(key).query::<()>(&mut con)?;
        Ok(())
    }

    fn expire(&self, ctx: &Context, key: &str, ttl_seconds: i64) -> Result<()> {
        if ttl_seconds <= 0 {
            return self.del(ctx, key);
        }
        let mut con = self.conn(ctx)?;
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds)
            .query::<()>(&mut con)?;
        Ok(())
    }

    fn ttl(&self, ctx: &Context, key: &str) -> Result<i64> {
        let mut con = self.conn(ctx)?;
        Ok(redis::cmd("TTL").arg(key).query(&mut con)?)
    }

    /// WATCH the key, run `f`, and commit with MULTI/EXEC, retrying when
    /// another client touched the key in between.
    fn update(&self, ctx: &Context, key: &str, f: &mut Updater<'_>) -> Result<()> {
        let mut con = self.conn(ctx)?;
        let mut failure: Option<KvError> = None;
        let mut attempts = 0u32;

        redis::transaction(&mut con, &[key], |con, pipe| {
            attempts += 1;
            if attempts > 1 {
                tracing::debug!(key, attempts, "watched key changed, retrying update");
            }
            if let Err(e) = ctx.check() {
                failure = Some(e);
                return Ok(Some(()));
            }
            let current: Option<Vec<u8>> = redis::cmd("GET").arg(key).query(con)?;
            match f(current.as_deref()) {
                Err(e) => {
                    failure = Some(e);
                    Ok(Some(()))
                }
                Ok(Update::Keep) => Ok(Some(())),
                Ok(Update::Put(value)) => pipe.cmd("SET").arg(key).arg(value).ignore().query(con),
                Ok(Update::Remove) => pipe.cmd("DEL").arg(key).ignore().query(con),
            }
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn delete_prefix(&self, ctx: &Context, prefix: &str) -> Result<u64> {
        let mut con = self.conn(ctx)?;
        let pattern = format!("{}*", escape_glob(prefix));

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            ctx.check()?;
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(DELETE_BATCH_SIZE)
                .query(&mut con)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        let mut deleted = 0u64;
        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            ctx.check()?;
            let n: u64 = redis::cmd("DEL").arg(chunk).query(&mut con)?;
            deleted += n;
        }
        Ok(deleted)
    }
}

/// Escape redis glob metacharacters so the prefix matches literally.
fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
