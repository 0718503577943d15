use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::error::KvError;
use crate::keyvalue::KeyValue;
use crate::resp::{Arg, RespReader, RespValue};
use crate::types::TTL_MISSING;
use crate::value::{Value, Values};

pub struct Server {
    kv: Arc<dyn KeyValue>,
}

impl Server {
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        Self { kv }
    }

    pub async fn run(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until accept fails.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        tracing::info!("redkv listening on {}", listener.local_addr()?);

        loop {
            let (socket, peer_addr) = listener.accept().await?;
            tracing::debug!("Connection from {}", peer_addr);

            let kv = self.kv.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, kv).await {
                    tracing::error!("Connection error: {}", e);
                }
            });
        }
    }
}

async fn handle_connection(socket: TcpStream, kv: Arc<dyn KeyValue>) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = RespReader::new(reader);

    while let Some(args) = reader.read_command().await? {
        let quit = args
            .first()
            .is_some_and(|cmd| cmd.eq_ignore_ascii_case(b"QUIT"));

        // Backends may block on their own I/O.
        let kv = kv.clone();
        let response = tokio::task::spawn_blocking(move || execute_command(kv.as_ref(), &args))
            .await
            .unwrap_or_else(|e| RespValue::error(format!("command failed: {e}")));

        writer.write_all(&response.encode()).await?;
        writer.flush().await?;

        if quit {
            break;
        }
    }

    Ok(())
}

fn execute_command(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.is_empty() {
        return RespValue::error("empty command");
    }

    let cmd = String::from_utf8_lossy(&args[0]).to_uppercase();
    let cmd_args = &args[1..];

    match cmd.as_str() {
        // Server commands
        "PING" => cmd_ping(cmd_args),
        "ECHO" => cmd_echo(cmd_args),
        "COMMAND" => cmd_command(),
        "QUIT" => RespValue::ok(),
        // Keys
        "DEL" => cmd_del(kv, cmd_args),
        "EXPIRE" => cmd_expire(kv, cmd_args),
        "TTL" => cmd_ttl(kv, cmd_args),
        // String operations
        "GET" => cmd_get(kv, cmd_args),
        "SET" => cmd_set(kv, cmd_args),
        "GETSET" => cmd_getset(kv, cmd_args),
        "SETEX" => cmd_setex(kv, cmd_args),
        "INCR" => cmd_incr(kv, cmd_args),
        // Hash operations
        "HGET" => cmd_hget(kv, cmd_args),
        "HSET" => cmd_hset(kv, cmd_args),
        "HGETALL" => cmd_hgetall(kv, cmd_args),
        // List operations
        "LPUSH" => cmd_lpush(kv, cmd_args),
        "LRANGE" => cmd_lrange(kv, cmd_args),
        "LTRIM" => cmd_ltrim(kv, cmd_args),
        "LLEN" => cmd_llen(kv, cmd_args),
        _ => RespValue::error(format!("unknown command '{}'", cmd)),
    }
}

fn wrong_args(cmd: &str) -> RespValue {
    RespValue::error(format!("wrong number of arguments for '{}' command", cmd))
}

fn error_reply(err: KvError) -> RespValue {
    match err {
        KvError::Nil => RespValue::null(),
        KvError::WrongType => RespValue::wrong_type(),
        e => RespValue::error(e.to_string()),
    }
}

fn value_reply(value: Value) -> RespValue {
    value.into_reply().unwrap_or_else(error_reply)
}

fn values_reply(values: Values) -> RespValue {
    match values.into_replies() {
        Ok(items) => RespValue::Array(Some(items)),
        Err(e) => error_reply(e),
    }
}

fn parse_key(arg: &[u8]) -> Result<&str, RespValue> {
    std::str::from_utf8(arg).map_err(|_| RespValue::error("invalid key"))
}

fn parse_int(arg: &[u8]) -> Result<i64, RespValue> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RespValue::error("value is not an integer or out of range"))
}

// --- Server commands ---

fn cmd_ping(args: &[Vec<u8>]) -> RespValue {
    if args.is_empty() {
        RespValue::pong()
    } else {
        RespValue::BulkString(Some(args[0].clone()))
    }
}

fn cmd_echo(args: &[Vec<u8>]) -> RespValue {
    if args.len() != 1 {
        return wrong_args("echo");
    }
    RespValue::BulkString(Some(args[0].clone()))
}

fn cmd_command() -> RespValue {
    // Minimal implementation for client compatibility
    RespValue::Array(Some(vec![]))
}

// --- Key commands ---

fn cmd_del(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.is_empty() {
        return wrong_args("del");
    }

    let mut removed = 0;
    for arg in args {
        let key = match parse_key(arg) {
            Ok(k) => k,
            Err(reply) => return reply,
        };
        match kv.ttl(key) {
            Ok(TTL_MISSING) => continue,
            Ok(_) => removed += 1,
            Err(e) => return error_reply(e),
        }
        if let Err(e) = kv.del(key) {
            return error_reply(e);
        }
    }
    RespValue::Integer(removed)
}

fn cmd_expire(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 2 {
        return wrong_args("expire");
    }
    let (key, seconds) = match (parse_key(&args[0]), parse_int(&args[1])) {
        (Ok(k), Ok(s)) => (k, s),
        (Err(reply), _) | (_, Err(reply)) => return reply,
    };

    match kv.expire(key, seconds) {
        Ok(existed) => existed.into(),
        Err(e) => error_reply(e),
    }
}

fn cmd_ttl(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 1 {
        return wrong_args("ttl");
    }
    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(reply) => return reply,
    };

    match kv.ttl(key) {
        Ok(ttl) => RespValue::Integer(ttl),
        Err(e) => error_reply(e),
    }
}

// --- String commands ---

fn cmd_get(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 1 {
        return wrong_args("get");
    }
    match parse_key(&args[0]) {
        Ok(key) => value_reply(kv.get(key)),
        Err(reply) => reply,
    }
}

fn cmd_set(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 2 && args.len() != 4 {
        return wrong_args("set");
    }
    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(reply) => return reply,
    };
    let value = Arg::from(&args[1]);

    let result = if args.len() == 4 {
        if !args[2].eq_ignore_ascii_case(b"EX") {
            return RespValue::error("syntax error");
        }
        let seconds = match parse_int(&args[3]) {
            Ok(s) if s > 0 => s,
            Ok(_) => return RespValue::error("invalid expire time in 'set' command"),
            Err(reply) => return reply,
        };
        kv.set_ex(key, seconds, value)
    } else {
        kv.set(key, value)
    };

    match result {
        Ok(()) => RespValue::ok(),
        Err(e) => error_reply(e),
    }
}

fn cmd_getset(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 2 {
        return wrong_args("getset");
    }
    match parse_key(&args[0]) {
        Ok(key) => value_reply(kv.get_set(key, Arg::from(&args[1]))),
        Err(reply) => reply,
    }
}

fn cmd_setex(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 3 {
        return wrong_args("setex");
    }
    let (key, seconds) = match (parse_key(&args[0]), parse_int(&args[1])) {
        (Ok(k), Ok(s)) => (k, s),
        (Err(reply), _) | (_, Err(reply)) => return reply,
    };
    if seconds <= 0 {
        return RespValue::error("invalid expire time in 'setex' command");
    }

    match kv.set_ex(key, seconds, Arg::from(&args[2])) {
        Ok(()) => RespValue::ok(),
        Err(e) => error_reply(e),
    }
}

fn cmd_incr(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 1 {
        return wrong_args("incr");
    }
    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(reply) => return reply,
    };

    match kv.incr(key) {
        Ok(n) => RespValue::Integer(n),
        Err(e) => error_reply(e),
    }
}

// --- Hash commands ---

fn cmd_hget(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 2 {
        return wrong_args("hget");
    }
    let (key, field) = match (parse_key(&args[0]), std::str::from_utf8(&args[1])) {
        (Ok(k), Ok(f)) => (k, f),
        (Err(reply), _) => return reply,
        (_, Err(_)) => return RespValue::error("invalid field"),
    };
    value_reply(kv.hget(key, field))
}

fn cmd_hset(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() < 3 || args.len() % 2 == 0 {
        return wrong_args("hset");
    }
    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(reply) => return reply,
    };

    let mut created = 0;
    for pair in args[1..].chunks(2) {
        let field = match std::str::from_utf8(&pair[0]) {
            Ok(f) => f,
            Err(_) => return RespValue::error("invalid field"),
        };
        match kv.hset(key, field, Arg::from(&pair[1])) {
            Ok(true) => created += 1,
            Ok(false) => {}
            Err(e) => return error_reply(e),
        }
    }
    RespValue::Integer(created)
}

fn cmd_hgetall(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 1 {
        return wrong_args("hgetall");
    }
    match parse_key(&args[0]) {
        Ok(key) => values_reply(kv.hgetall(key)),
        Err(reply) => reply,
    }
}

// --- List commands ---

fn cmd_lpush(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() < 2 {
        return wrong_args("lpush");
    }
    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(reply) => return reply,
    };

    let mut len = 0;
    for value in &args[1..] {
        match kv.lpush(key, Arg::from(value)) {
            Ok(n) => len = n,
            Err(e) => return error_reply(e),
        }
    }
    RespValue::Integer(len as i64)
}

fn cmd_lrange(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 3 {
        return wrong_args("lrange");
    }
    let (key, start, stop) = match (parse_key(&args[0]), parse_int(&args[1]), parse_int(&args[2])) {
        (Ok(k), Ok(start), Ok(stop)) => (k, start, stop),
        (Err(reply), _, _) | (_, Err(reply), _) | (_, _, Err(reply)) => return reply,
    };
    values_reply(kv.lrange(key, start, stop))
}

fn cmd_ltrim(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 3 {
        return wrong_args("ltrim");
    }
    let (key, start, stop) = match (parse_key(&args[0]), parse_int(&args[1]), parse_int(&args[2])) {
        (Ok(k), Ok(start), Ok(stop)) => (k, start, stop),
        (Err(reply), _, _) | (_, Err(reply), _) | (_, _, Err(reply)) => return reply,
    };

    match kv.ltrim(key, start, stop) {
        Ok(()) => RespValue::ok(),
        Err(e) => error_reply(e),
    }
}

fn cmd_llen(kv: &dyn KeyValue, args: &[Vec<u8>]) -> RespValue {
    if args.len() != 1 {
        return wrong_args("llen");
    }
    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(reply) => return reply,
    };

    match kv.llen(key) {
        Ok(n) => RespValue::Integer(n as i64),
        Err(e) => error_reply(e),
    }
}
