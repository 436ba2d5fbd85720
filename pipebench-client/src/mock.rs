//! In-process RESP store for tests
//!
//! Understands just enough of the protocol to serve a benchmark batch:
//! `PING`, `AUTH`, `SET`, `GET`, `HSET` and `LPUSH`. Failures can be injected
//! per command name, and the server can be told to hang up on every client.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::resp::{RespParser, RespSerializer, RespValue};

#[derive(Default)]
struct Data {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
}

struct MockState {
    data: Mutex<Data>,
    password: Option<String>,
    failing: Vec<String>,
    hang_up: bool,
    commands: AtomicU64,
    connections: AtomicU64,
}

/// Configures a [`MockServer`]
#[derive(Default)]
pub struct MockServerBuilder {
    password: Option<String>,
    failing: Vec<String>,
    hang_up: bool,
}

impl MockServerBuilder {
    /// Require `AUTH password` before any other command
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Answer every command with this name with an error reply
    pub fn fail_command(mut self, name: &str) -> Self {
        self.failing.push(name.to_ascii_uppercase());
        self
    }

    /// Close every connection as soon as it sends anything
    pub fn hang_up(mut self) -> Self {
        self.hang_up = true;
        self
    }

    pub async fn start(self) -> std::io::Result<MockServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(MockState {
            data: Mutex::new(Data::default()),
            password: self.password,
            failing: self.failing,
            hang_up: self.hang_up,
            commands: AtomicU64::new(0),
            connections: AtomicU64::new(0),
        });

        let accept_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(serve(socket, Arc::clone(&accept_state)));
            }
        });

        Ok(MockServer {
            addr,
            state,
            handle,
        })
    }
}

/// A RESP server bound to an ephemeral localhost port
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::default()
    }

    pub async fn start() -> std::io::Result<Self> {
        Self::builder().start().await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Commands answered so far, `AUTH` included
    pub fn commands(&self) -> u64 {
        self.state.commands.load(Ordering::Relaxed)
    }

    /// Connections accepted so far
    pub fn connections(&self) -> u64 {
        self.state.connections.load(Ordering::Relaxed)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.state.data.lock().strings.get(key).cloned()
    }

    pub fn hash_field(&self, key: &str, field: &str) -> Option<String> {
        self.state
            .data
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned()
    }

    pub fn list(&self, key: &str) -> Vec<String> {
        self.state
            .data
            .lock()
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of scalar keys stored
    pub fn string_keys(&self) -> usize {
        self.state.data.lock().strings.len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut socket: TcpStream, state: Arc<MockState>) {
    let mut parser = RespParser::new();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut authenticated = state.password.is_none();

    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        if state.hang_up {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut out = Vec::new();
        loop {
            let (value, consumed) = match parser.parse(&buf) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => break,
                Err(_) => return,
            };
            buf.drain(..consumed);
            state.commands.fetch_add(1, Ordering::Relaxed);

            let reply = match command_args(value) {
                Some(args) => execute(&state, &mut authenticated, &args),
                None => RespValue::Error("ERR protocol error".to_string()),
            };
            out.extend_from_slice(&RespSerializer::serialize(&reply));
        }

        if !out.is_empty() && socket.write_all(&out).await.is_err() {
            return;
        }
    }
}

fn command_args(value: RespValue) -> Option<Vec<String>> {
    let RespValue::Array(items) = value else {
        return None;
    };
    items
        .into_iter()
        .map(|item| match item {
            RespValue::BulkString(Some(s)) => Some(s),
            _ => None,
        })
        .collect()
}

fn execute(state: &MockState, authenticated: &mut bool, args: &[String]) -> RespValue {
    let Some(name) = args.first().map(|n| n.to_ascii_uppercase()) else {
        return RespValue::Error("ERR empty command".to_string());
    };

    if name == "AUTH" {
        return match (&state.password, args.get(1)) {
            (Some(expected), Some(given)) if expected == given => {
                *authenticated = true;
                RespValue::SimpleString("OK".to_string())
            }
            (None, _) => RespValue::Error("ERR AUTH called without any password configured".to_string()),
            _ => RespValue::Error("WRONGPASS invalid password".to_string()),
        };
    }
    if !*authenticated {
        return RespValue::Error("NOAUTH Authentication required.".to_string());
    }
    if state.failing.contains(&name) {
        return RespValue::Error(format!("ERR injected failure for {name}"));
    }

    let mut data = state.data.lock();
    match (name.as_str(), args.len()) {
        ("PING", _) => RespValue::SimpleString("PONG".to_string()),
        ("SET", 3) => {
            data.strings.insert(args[1].clone(), args[2].clone());
            RespValue::SimpleString("OK".to_string())
        }
        ("GET", 2) => RespValue::BulkString(data.strings.get(&args[1]).cloned()),
        ("HSET", n) if n >= 4 && n % 2 == 0 => {
            let hash = data.hashes.entry(args[1].clone()).or_default();
            let added = args[2..]
                .chunks(2)
                .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                .count();
            RespValue::Integer(added as i64)
        }
        ("LPUSH", n) if n >= 3 => {
            let list = data.lists.entry(args[1].clone()).or_default();
            for item in &args[2..] {
                list.push_front(item.clone());
            }
            RespValue::Integer(list.len() as i64)
        }
        ("SET" | "GET" | "HSET" | "LPUSH", _) => RespValue::Error(format!(
            "ERR wrong number of arguments for '{}' command",
            name.to_ascii_lowercase()
        )),
        _ => RespValue::Error(format!("ERR unknown command '{name}'")),
    }
}
