//! Loopback Redis responder for tests.
//!
//! [`RespServer`] speaks just enough RESP2 for [`NetworkedStore`]:
//! `PING`, `CLIENT`, `SELECT`, `HSET`, `HGET`, `EXISTS`, `PUBLISH`,
//! `SUBSCRIBE`, `LPUSH` and `RPOP`. It can make existing connections fail
//! their pings or go away entirely, which is what the health check and
//! the event relay have to cope with.
//!
//! [`NetworkedStore`]: crate::networked::NetworkedStore

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use annotator_core::retry::RetryPolicy;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::StoreConfig;

type Outbox = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Default)]
struct Data {
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
    subscribers: HashMap<String, Vec<Outbox>>,
}

#[derive(Default)]
struct Shared {
    data: Mutex<Data>,
    /// Sequence number handed to the next accepted connection.
    next_conn: AtomicU64,
    /// Connections numbered below this answer `PING` with an error.
    failing_below: AtomicU64,
}

pub struct RespServer {
    port: u16,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl RespServer {
    /// Listen on an ephemeral loopback port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let port = listener.local_addr().expect("listener address").port();
        let shared = Arc::new(Shared::default());
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
        Self { port, shared, task }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Store settings pointing at this server, with budgets small enough
    /// that a dead server is given up on quickly.
    pub fn config(&self) -> StoreConfig {
        StoreConfig {
            host: "127.0.0.1".to_string(),
            port: self.port,
            probe_timeout: Duration::from_millis(200),
            dns_timeout: Duration::from_millis(200),
            op_timeout: Duration::from_millis(500),
            startup_retry: RetryPolicy::fixed(2, Duration::from_millis(10)),
            worker_retry: RetryPolicy::fixed(1, Duration::from_millis(1)),
            fallback_hosts: Vec::new(),
            ..Default::default()
        }
    }

    /// Every connection opened so far answers `PING` with an error.
    /// Connections opened later behave normally.
    pub fn fail_pings(&self) {
        let opened = self.shared.next_conn.load(Ordering::SeqCst);
        self.shared.failing_below.store(opened, Ordering::SeqCst);
    }

    /// Current value of a hash field, read directly from the server.
    pub fn field(&self, key: &str, field: &str) -> Option<String> {
        let data = self.shared.data.lock().expect("responder state");
        data.hashes.get(key).and_then(|h| h.get(field)).cloned()
    }

    /// Close the listener and every open connection.
    pub async fn shutdown(&mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for RespServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    // Dropping the set when this task is aborted closes every connection.
    let mut connections = JoinSet::new();
    while let Ok((socket, _)) = listener.accept().await {
        let conn_id = shared.next_conn.fetch_add(1, Ordering::SeqCst);
        connections.spawn(serve(socket, conn_id, Arc::clone(&shared)));
        while connections.try_join_next().is_some() {}
    }
}

async fn serve(socket: TcpStream, conn_id: u64, shared: Arc<Shared>) {
    let (mut reader, mut writer) = socket.into_split();
    let (outbox, mut queued) = mpsc::unbounded_channel::<Vec<u8>>();

    let write = async move {
        while let Some(bytes) = queued.recv().await {
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
        }
    };

    let read = async {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            while let Some((args, used)) = parse_command(&buf) {
                buf.drain(..used);
                let reply = shared.execute(&args, conn_id, &outbox);
                if outbox.send(reply).is_err() {
                    return;
                }
            }
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
    };

    tokio::select! {
        _ = write => {}
        _ = read => {}
    }
}

impl Shared {
    fn execute(&self, args: &[String], conn_id: u64, outbox: &Outbox) -> Vec<u8> {
        let Some(name) = args.first() else {
            return error("ERR empty command");
        };
        let name = name.to_ascii_uppercase();
        let mut data = self.data.lock().expect("responder state");

        match (name.as_str(), args.len()) {
            ("PING", _) => {
                if conn_id < self.failing_below.load(Ordering::SeqCst) {
                    error("ERR store unavailable")
                } else {
                    simple("PONG")
                }
            }
            ("CLIENT" | "SELECT", _) => simple("OK"),
            ("HSET", 4) => {
                let hash = data.hashes.entry(args[1].clone()).or_default();
                let added = hash.insert(args[2].clone(), args[3].clone()).is_none();
                integer(i64::from(added))
            }
            ("HGET", 3) => bulk(data.hashes.get(&args[1]).and_then(|h| h.get(&args[2]))),
            ("EXISTS", n) if n >= 2 => {
                let found = args[1..]
                    .iter()
                    .filter(|k| data.hashes.contains_key(*k) || data.lists.contains_key(*k))
                    .count();
                integer(found as i64)
            }
            ("PUBLISH", 3) => {
                let frame = array(&[
                    bulk(Some(&"message".to_string())),
                    bulk(Some(&args[1])),
                    bulk(Some(&args[2])),
                ]);
                let subscribers = data.subscribers.entry(args[1].clone()).or_default();
                subscribers.retain(|s| s.send(frame.clone()).is_ok());
                integer(subscribers.len() as i64)
            }
            ("SUBSCRIBE", n) if n >= 2 => {
                let mut reply = Vec::new();
                for (i, channel) in args[1..].iter().enumerate() {
                    data.subscribers
                        .entry(channel.clone())
                        .or_default()
                        .push(outbox.clone());
                    reply.extend(array(&[
                        bulk(Some(&"subscribe".to_string())),
                        bulk(Some(channel)),
                        integer(i as i64 + 1),
                    ]));
                }
                reply
            }
            ("LPUSH", n) if n >= 3 => {
                let list = data.lists.entry(args[1].clone()).or_default();
                for value in &args[2..] {
                    list.push_front(value.clone());
                }
                integer(list.len() as i64)
            }
            ("RPOP", 2) => {
                let popped = data.lists.get_mut(&args[1]).and_then(|l| l.pop_back());
                if data.lists.get(&args[1]).is_some_and(|l| l.is_empty()) {
                    data.lists.remove(&args[1]);
                }
                bulk(popped.as_ref())
            }
            _ => error(&format!("ERR unsupported command '{name}'")),
        }
    }
}

/// Split one complete command (an array of bulk strings) off the front of
/// `buf`. Returns the arguments and the number of bytes consumed.
fn parse_command(buf: &[u8]) -> Option<(Vec<String>, usize)> {
    let (count, mut pos) = read_header(buf, 0, b'*')?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let (len, start) = read_header(buf, pos, b'$')?;
        let end = start + len;
        if buf.len() < end + 2 {
            return None;
        }
        args.push(String::from_utf8_lossy(&buf[start..end]).into_owned());
        pos = end + 2;
    }
    Some((args, pos))
}

fn read_header(buf: &[u8], pos: usize, prefix: u8) -> Option<(usize, usize)> {
    if *buf.get(pos)? != prefix {
        return None;
    }
    let line_len = buf[pos..].windows(2).position(|w| w == b"\r\n")?;
    let number = std::str::from_utf8(&buf[pos + 1..pos + line_len]).ok()?;
    Some((number.parse().ok()?, pos + line_len + 2))
}

fn simple(text: &str) -> Vec<u8> {
    format!("+{text}\r\n").into_bytes()
}

fn error(text: &str) -> Vec<u8> {
    format!("-{text}\r\n").into_bytes()
}

fn integer(n: i64) -> Vec<u8> {
    format!(":{n}\r\n").into_bytes()
}

fn bulk(value: Option<&String>) -> Vec<u8> {
    match value {
        Some(v) => format!("${}\r\n{v}\r\n", v.len()).into_bytes(),
        None => b"$-1\r\n".to_vec(),
    }
}

fn array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipelined_commands() {
        let buf = b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nRPOP\r\n$1\r\nq\r\n";

        let (first, used) = parse_command(buf).unwrap();
        assert_eq!(first, vec!["PING"]);
        let (second, rest) = parse_command(&buf[used..]).unwrap();
        assert_eq!(second, vec!["RPOP", "q"]);
        assert_eq!(used + rest, buf.len());
    }

    #[test]
    fn waits_for_a_complete_command() {
        assert!(parse_command(b"*2\r\n$4\r\nHGET\r\n$3\r\nke").is_none());
    }
}
