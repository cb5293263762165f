//! Common test utilities for integration tests.
//!
//! `FakeRedis` speaks just enough RESP (PING, GET, SET, SETEX, DEL) for the
//! session store, keeps its data in memory, and can hold back the next
//! occurrence of a command to force interleavings.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tessera_redis::RedisConfig;
use tessera_session::{SessionRecord, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Default)]
struct State {
    data: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    delays: Mutex<HashMap<String, VecDeque<Duration>>>,
}

impl State {
    fn take_delay(&self, command: &str) -> Option<Duration> {
        self.delays.lock().get_mut(command)?.pop_front()
    }

    async fn apply(&self, args: &[Vec<u8>]) -> Vec<u8> {
        let command = args
            .first()
            .map(|name| String::from_utf8_lossy(name).to_ascii_uppercase())
            .unwrap_or_default();
        if let Some(delay) = self.take_delay(&command) {
            tokio::time::sleep(delay).await;
        }

        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
        match command.as_str() {
            "PING" => b"+PONG\r\n".to_vec(),
            "GET" => match self.data.lock().get(&arg(1)) {
                Some(value) => bulk(value),
                None => b"$-1\r\n".to_vec(),
            },
            "SET" => {
                self.data.lock().insert(arg(1), arg(2));
                b"+OK\r\n".to_vec()
            }
            "SETEX" => {
                self.data.lock().insert(arg(1), arg(3));
                b"+OK\r\n".to_vec()
            }
            "DEL" => {
                let mut data = self.data.lock();
                let removed = args[1..]
                    .iter()
                    .filter(|key| data.remove(*key).is_some())
                    .count();
                format!(":{removed}\r\n").into_bytes()
            }
            _ => b"+OK\r\n".to_vec(),
        }
    }
}

fn bulk(value: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", value.len()).into_bytes();
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
    out
}

/// An in-process Redis stand-in listening on a random local port.
pub struct FakeRedis {
    pub addr: SocketAddr,
    state: Arc<State>,
    _handle: JoinHandle<()>,
}

impl FakeRedis {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State::default());

        let shared = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, Arc::clone(&shared)));
            }
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    /// Backend configuration pointing at this server, keys prefixed `test:`.
    pub fn config(&self) -> RedisConfig {
        RedisConfig::new()
            .with_address(self.addr.to_string())
            .with_prefix("test:")
            .with_timeout(Duration::from_secs(2))
    }

    /// Hold back the next `command` (upper case) by `delay`.
    pub fn delay_next(&self, command: &str, delay: Duration) {
        self.state
            .delays
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(delay);
    }

    pub fn put_raw(&self, key: &str, blob: &[u8]) {
        self.state
            .data
            .lock()
            .insert(key.as_bytes().to_vec(), blob.to_vec());
    }

    pub fn put_record(&self, key: &str, entries: &[(&str, Value)]) {
        let entries = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.put_raw(key, &SessionRecord::new(entries).encode().unwrap());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.data.lock().contains_key(key.as_bytes())
    }

    /// Decoded record stored under `key`, if any.
    pub fn record(&self, key: &str) -> Option<HashMap<String, Value>> {
        let blob = self.state.data.lock().get(key.as_bytes()).cloned()?;
        Some(SessionRecord::decode(&blob).unwrap().entries)
    }
}

async fn serve(socket: TcpStream, state: Arc<State>) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    while let Some(args) = read_command(&mut reader).await {
        let reply = state.apply(&args).await;
        if write.write_all(&reply).await.is_err() {
            break;
        }
    }
}

async fn read_command<R>(reader: &mut R) -> Option<Vec<Vec<u8>>>
where
    R: AsyncBufReadExt + AsyncReadExt + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(buf);
    }
    Some(args)
}
