//! Bounded pool of multiplexed Redis connections.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};
use tessera_session::{Error, Result};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::config::RedisConfig;

struct IdleConnection {
    conn: MultiplexedConnection,
    since: Instant,
}

/// Connection pool shared by every store of one backend.
///
/// At most `max_active` connections are checked out at once; returned
/// connections are kept for reuse up to `max_idle` and for no longer than
/// `idle_timeout`. Every call, connection setup included, is bounded by
/// the configured timeout.
pub(crate) struct Pool {
    client: redis::Client,
    idle: Mutex<Vec<IdleConnection>>,
    active: Semaphore,
    max_idle: usize,
    idle_timeout: Duration,
    timeout: Duration,
}

impl Pool {
    pub(crate) fn new(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection_url().as_str())
            .map_err(|e| Error::Backend(format!("invalid redis configuration: {e}")))?;
        let permits = match config.max_active {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        };

        Ok(Self {
            client,
            idle: Mutex::new(Vec::new()),
            active: Semaphore::new(permits),
            max_idle: config.max_idle,
            idle_timeout: config.idle_timeout,
            timeout: config.timeout,
        })
    }

    /// Check out a connection, reusing an idle one when possible.
    async fn checkout(&self) -> Result<Pooled<'_>> {
        let permit = timeout(self.timeout, self.active.acquire())
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
            .map_err(|_| Error::Backend("connection pool closed".to_string()))?;

        if let Some(conn) = self.take_idle() {
            trace!("Reusing idle redis connection");
            return Ok(Pooled::new(self, conn, permit));
        }

        let conn = timeout(self.timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
            .map_err(|e| Error::Backend(e.to_string()))?;
        debug!("Opened redis connection");
        Ok(Pooled::new(self, conn, permit))
    }

    fn take_idle(&self) -> Option<MultiplexedConnection> {
        let mut idle = self.idle.lock();
        while let Some(entry) = idle.pop() {
            if entry.since.elapsed() < self.idle_timeout {
                return Some(entry.conn);
            }
        }
        None
    }

    fn give_back(&self, conn: MultiplexedConnection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(IdleConnection {
                conn,
                since: Instant::now(),
            });
        }
    }

    /// Run one command on a pooled connection within the timeout.
    ///
    /// A connection that errored or timed out is dropped rather than
    /// returned to the pool.
    async fn exec<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let pooled = self.checkout().await?;
        match timeout(self.timeout, op(pooled.connection())).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                pooled.discard();
                Err(Error::Backend(e.to_string()))
            }
            Err(_) => {
                pooled.discard();
                Err(Error::Timeout(self.timeout))
            }
        }
    }

    pub(crate) async fn ping(&self) -> Result<()> {
        self.exec(|mut conn| async move {
            let pong: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            pong
        })
        .await
        .map(|_| ())
    }

    pub(crate) async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.exec(move |mut conn| async move {
            let blob: RedisResult<Option<Vec<u8>>> = conn.get(key).await;
            blob
        })
        .await
    }

    pub(crate) async fn store(&self, key: &str, blob: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let key = key.to_string();
        self.exec(move |mut conn| async move {
            let done: RedisResult<()> = conn.set_ex(key, blob, ttl_secs).await;
            done
        })
        .await
    }

    pub(crate) async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.exec(move |mut conn| async move {
            let done: RedisResult<()> = conn.del(key).await;
            done
        })
        .await
    }
}

/// A checked-out connection. Returns to the pool on drop unless discarded.
struct Pooled<'a> {
    pool: &'a Pool,
    conn: MultiplexedConnection,
    reusable: bool,
    _permit: SemaphorePermit<'a>,
}

impl<'a> Pooled<'a> {
    fn new(pool: &'a Pool, conn: MultiplexedConnection, permit: SemaphorePermit<'a>) -> Self {
        Self {
            pool,
            conn,
            reusable: true,
            _permit: permit,
        }
    }

    /// Handle to the underlying connection. Multiplexed connections are
    /// cheap to clone and share one socket.
    fn connection(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    fn discard(mut self) {
        self.reusable = false;
    }
}

impl Drop for Pooled<'_> {
    fn drop(&mut self) {
        if self.reusable {
            self.pool.give_back(self.conn.clone());
        }
    }
}
