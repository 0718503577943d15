//! RESP front end driven by a real redis client.
//!
//! Each test starts its own in-process server on an ephemeral port.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use redis::Commands;
use redkv::{memory_key_value, Server};

// ============================================================================
// HELPERS
// ============================================================================

/// Serve a fresh memory store on a background runtime; returns the address.
fn start_server() -> String {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build runtime");
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind");
            tx.send(listener.local_addr().expect("No local addr")).unwrap();
            let _ = Server::new(memory_key_value()).serve(listener).await;
        });
    });
    let addr = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("Server did not start");
    format!("redis://{}", addr)
}

fn connection() -> redis::Connection {
    redis::Client::open(start_server())
        .expect("Failed to create client")
        .get_connection()
        .expect("Failed to get connection")
}

// ============================================================================
// TESTS
// ============================================================================

#[test]
fn test_ping_echo() {
    let mut con = connection();
    let pong: String = redis::cmd("PING").query(&mut con).unwrap();
    assert_eq!(pong, "PONG");
    let echo: String = redis::cmd("ECHO").arg("hello").query(&mut con).unwrap();
    assert_eq!(echo, "hello");
}

#[test]
fn test_strings() {
    let mut con = connection();

    let missing: Option<String> = con.get("k").unwrap();
    assert_eq!(missing, None);

    let _: () = con.set("k", "1").unwrap();
    let n: i64 = redis::cmd("INCR").arg("k").query(&mut con).unwrap();
    assert_eq!(n, 2);

    let old: String = con.getset("k", "v").unwrap();
    assert_eq!(old, "2");
    let v: String = con.get("k").unwrap();
    assert_eq!(v, "v");

    let _: () = con.set("bin", vec![0u8, 255, 10]).unwrap();
    let b: Vec<u8> = con.get("bin").unwrap();
    assert_eq!(b, vec![0u8, 255, 10]);

    let deleted: i64 = con.del(&["k", "bin", "nope"]).unwrap();
    assert_eq!(deleted, 2);
}

#[test]
fn test_expiry() {
    let mut con = connection();

    let _: () = con.set_ex("k", "v", 60).unwrap();
    let ttl: i64 = con.ttl("k").unwrap();
    assert!((50..=60).contains(&ttl), "ttl was {ttl}");

    let _: () = con.set("j", "v").unwrap();
    let ttl: i64 = con.ttl("j").unwrap();
    assert_eq!(ttl, -1);
    let set: bool = con.expire("j", 1).unwrap();
    assert!(set);

    let ttl: i64 = con.ttl("nope").unwrap();
    assert_eq!(ttl, -2);
    let set: bool = con.expire("nope", 10).unwrap();
    assert!(!set);

    thread::sleep(Duration::from_millis(1100));
    let gone: Option<String> = con.get("j").unwrap();
    assert_eq!(gone, None);
}

#[test]
fn test_hashes() {
    let mut con = connection();

    let created: i64 = redis::cmd("HSET")
        .arg("h")
        .arg("a")
        .arg("1")
        .arg("b")
        .arg("2")
        .query(&mut con)
        .unwrap();
    assert_eq!(created, 2);

    let a: String = con.hget("h", "a").unwrap();
    assert_eq!(a, "1");
    let none: Option<String> = con.hget("h", "zzz").unwrap();
    assert_eq!(none, None);

    let all: Vec<(String, String)> = con.hgetall("h").unwrap();
    assert_eq!(
        all,
        vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
    );
}

#[test]
fn test_lists() {
    let mut con = connection();

    let len: i64 = con.lpush("l", &["c", "b", "a"]).unwrap();
    assert_eq!(len, 3);
    let items: Vec<String> = con.lrange("l", 0, -1).unwrap();
    assert_eq!(items, vec!["a", "b", "c"]);

    let _: () = con.ltrim("l", 1, -1).unwrap();
    let len: i64 = con.llen("l").unwrap();
    assert_eq!(len, 2);
    let items: Vec<String> = con.lrange("l", 0, 10).unwrap();
    assert_eq!(items, vec!["b", "c"]);
}

#[test]
fn test_wrong_type() {
    let mut con = connection();

    let _: () = con.lpush("l", "x").unwrap();
    let err = con.get::<_, String>("l").unwrap_err();
    assert!(err.to_string().contains("WRONGTYPE"), "got {err}");

    let err = con.hset::<_, _, _, i64>("l", "f", "v").unwrap_err();
    assert!(err.to_string().contains("WRONGTYPE"), "got {err}");

    // The list is untouched
    let len: i64 = con.llen("l").unwrap();
    assert_eq!(len, 1);
}

#[test]
fn test_concurrent_clients() {
    let url = start_server();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let url = url.clone();
            thread::spawn(move || {
                let mut con = redis::Client::open(url).unwrap().get_connection().unwrap();
                for _ in 0..50 {
                    let _: i64 = redis::cmd("INCR").arg("counter").query(&mut con).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut con = redis::Client::open(url).unwrap().get_connection().unwrap();
    let n: i64 = con.get("counter").unwrap();
    assert_eq!(n, 200);
}
