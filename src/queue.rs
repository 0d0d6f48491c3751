use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::config::QueueConfig;

/// Queue payload handed from the scheduler to scrape workers.
///
/// Wire format: `{"page_id": 1, "url": "...", "type": "pricing"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapeJob {
    pub page_id: i64,
    pub url: String,
    #[serde(rename = "type")]
    pub page_type: String,
}

impl ScrapeJob {
    pub fn encode(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Malformed {
            payload: format!("{:?}", self),
            source: e,
        })
    }

    pub fn decode(payload: &str) -> Result<Self, QueueError> {
        serde_json::from_str(payload).map_err(|e| QueueError::Malformed {
            payload: payload.to_string(),
            source: e,
        })
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue operation timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("queue transport error: {0}")]
    Transport(#[from] redis::RedisError),

    #[error("malformed job payload {payload:?}: {source}")]
    Malformed {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
}

/// FIFO of scrape jobs shared by producers and consumers.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Appends a job at the tail.
    async fn push(&self, job: &ScrapeJob) -> Result<(), QueueError>;

    /// Takes the job at the head, waiting up to `wait`. `Ok(None)` means the
    /// wait elapsed with nothing to do.
    async fn pop(&self, wait: Duration) -> Result<Option<ScrapeJob>, QueueError>;

    /// Number of jobs currently waiting.
    async fn len(&self) -> Result<usize, QueueError>;
}

/// Redis list backed queue: `RPUSH` onto the tail, `BLPOP` from the head.
///
/// Producers share one multiplexed connection. Consumers block, so each
/// `pop` borrows a dedicated connection from an idle set and returns it
/// afterwards; a connection that failed or timed out is dropped and rebuilt
/// on the next pop.
pub struct RedisJobQueue {
    client: redis::Client,
    connection: MultiplexedConnection,
    consumers: Mutex<Vec<MultiplexedConnection>>,
    key: String,
    push_timeout: Duration,
}

/// Runs `call` under `limit`, mapping expiry to [`QueueError::Timeout`].
async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, QueueError>
where
    F: Future<Output = Result<T, QueueError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| QueueError::Timeout {
            secs: limit.as_secs(),
        })?
}

impl RedisJobQueue {
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url.as_str())?;
        let push_timeout = Duration::from_secs(config.push_timeout_secs);
        let connection = bounded(push_timeout, async {
            Ok::<_, QueueError>(client.get_multiplexed_tokio_connection().await?)
        })
        .await?;

        Ok(Self {
            client,
            connection,
            consumers: Mutex::new(Vec::new()),
            key: config.key.clone(),
            push_timeout,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn ping(&self) -> Result<(), QueueError> {
        bounded(self.push_timeout, async {
            let mut conn = self.connection.clone();
            let cmd = redis::cmd("PING");
            cmd.query_async::<_, String>(&mut conn).await?;
            Ok::<_, QueueError>(())
        })
        .await
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, job: &ScrapeJob) -> Result<(), QueueError> {
        let payload = job.encode()?;
        bounded(self.push_timeout, async {
            let mut conn = self.connection.clone();
            let mut cmd = redis::cmd("RPUSH");
            cmd.arg(&self.key).arg(&payload);
            cmd.query_async::<_, i64>(&mut conn).await?;
            Ok::<_, QueueError>(())
        })
        .await
    }

    async fn pop(&self, wait: Duration) -> Result<Option<ScrapeJob>, QueueError> {
        let wait_secs = wait.as_secs().max(1);
        // Connecting and the blocking pop share one budget.
        let limit = Duration::from_secs(wait_secs) + self.push_timeout;
        let idle = self.consumers.lock().await.pop();

        let (conn, reply) = bounded(limit, async {
            let mut conn = match idle {
                Some(conn) => conn,
                None => {
                    debug!("Opening consumer connection");
                    self.client.get_multiplexed_tokio_connection().await?
                }
            };
            let mut cmd = redis::cmd("BLPOP");
            cmd.arg(&self.key).arg(wait_secs);
            let reply = cmd
                .query_async::<_, Option<(String, String)>>(&mut conn)
                .await?;
            Ok::<_, QueueError>((conn, reply))
        })
        .await?;

        self.consumers.lock().await.push(conn);
        match reply {
            Some((_, payload)) => ScrapeJob::decode(&payload).map(Some),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        bounded(self.push_timeout, async {
            let mut conn = self.connection.clone();
            let mut cmd = redis::cmd("LLEN");
            cmd.arg(&self.key);
            Ok::<_, QueueError>(cmd.query_async::<_, usize>(&mut conn).await?)
        })
        .await
    }
}

/// In-process queue with the same wire encoding as [`RedisJobQueue`]. Used by
/// `all` mode without a queue store and by tests.
#[derive(Default)]
pub struct MemoryJobQueue {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes an already-encoded payload, bypassing serialization.
    pub async fn push_raw(&self, payload: impl Into<String>) {
        self.items.lock().await.push_back(payload.into());
        self.notify.notify_one();
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, job: &ScrapeJob) -> Result<(), QueueError> {
        let payload = job.encode()?;
        self.push_raw(payload).await;
        Ok(())
    }

    async fn pop(&self, wait: Duration) -> Result<Option<ScrapeJob>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(payload) = self.items.lock().await.pop_front() {
                debug!("Popped job payload from memory queue");
                return ScrapeJob::decode(&payload).map(Some);
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.items.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(page_id: i64) -> ScrapeJob {
        ScrapeJob {
            page_id,
            url: format!("https://competitor.test/pricing/{}", page_id),
            page_type: "pricing".to_string(),
        }
    }

    #[test]
    fn test_wire_format_uses_type_key() {
        let value = serde_json::to_value(job(7)).unwrap();
        assert_eq!(value["page_id"], 7);
        assert_eq!(value["url"], "https://competitor.test/pricing/7");
        assert_eq!(value["type"], "pricing");
        assert!(value.get("page_type").is_none());
    }

    #[test]
    fn test_decode_foreign_payload() {
        let decoded =
            ScrapeJob::decode(r#"{"page_id":3,"url":"https://a.test","type":"features"}"#).unwrap();
        assert_eq!(decoded.page_id, 3);
        assert_eq!(decoded.page_type, "features");
    }

    #[tokio::test]
    async fn test_memory_queue_round_trip() {
        let queue = MemoryJobQueue::new();
        let original = job(1);
        queue.push(&original).await.unwrap();

        let popped = queue.pop(Duration::from_millis(50)).await.unwrap();
        assert_eq!(popped, Some(original));
    }

    #[tokio::test]
    async fn test_memory_queue_is_fifo() {
        let queue = MemoryJobQueue::new();
        for id in 1..=3 {
            queue.push(&job(id)).await.unwrap();
        }
        assert_eq!(queue.len().await.unwrap(), 3);

        let mut order = Vec::new();
        while let Some(job) = queue.pop(Duration::from_millis(10)).await.unwrap() {
            order.push(job.page_id);
        }
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_memory_queue_pop_times_out_empty() {
        let queue = MemoryJobQueue::new();
        let popped = queue.pop(Duration::from_millis(20)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_memory_queue_wakes_blocked_consumer() {
        let queue = std::sync::Arc::new(MemoryJobQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop(Duration::from_secs(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(&job(9)).await.unwrap();

        let popped = consumer.await.unwrap().unwrap();
        assert_eq!(popped.map(|j| j.page_id), Some(9));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_reported_and_consumed() {
        let queue = MemoryJobQueue::new();
        queue.push_raw("not json").await;

        let err = queue.pop(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, QueueError::Malformed { ref payload, .. } if payload == "not json"));
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    mod redis_queue {
        use super::*;
        use std::net::SocketAddr;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::{Arc, Mutex as StdMutex};
        use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
        use tokio::net::{TcpListener, TcpStream};

        type List = Arc<StdMutex<VecDeque<String>>>;

        /// Minimal RESP server holding a single list. Connections past
        /// `answered` are accepted and never read from.
        struct FakeRedis {
            addr: SocketAddr,
            list: List,
            connections: Arc<AtomicUsize>,
        }

        impl FakeRedis {
            async fn start(answered: usize) -> Self {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let addr = listener.local_addr().unwrap();
                let list: List = Arc::default();
                let connections = Arc::new(AtomicUsize::new(0));

                let (accept_list, accept_count) = (list.clone(), connections.clone());
                tokio::spawn(async move {
                    while let Ok((stream, _)) = listener.accept().await {
                        let seen = accept_count.fetch_add(1, Ordering::SeqCst);
                        if seen < answered {
                            tokio::spawn(serve(stream, accept_list.clone()));
                        } else {
                            tokio::spawn(async move {
                                let _held = stream;
                                std::future::pending::<()>().await;
                            });
                        }
                    }
                });

                Self {
                    addr,
                    list,
                    connections,
                }
            }

            fn config(&self) -> QueueConfig {
                QueueConfig {
                    url: format!("redis://{}", self.addr),
                    key: "scrape_job".to_string(),
                    push_timeout_secs: 1,
                    pop_timeout_secs: 1,
                }
            }
        }

        async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Vec<String>> {
            let mut line = String::new();
            if reader.read_line(&mut line).await.ok()? == 0 {
                return None;
            }
            let count: usize = line.trim().strip_prefix('*')?.parse().ok()?;
            let mut args = Vec::with_capacity(count);
            for _ in 0..count {
                line.clear();
                reader.read_line(&mut line).await.ok()?;
                let len: usize = line.trim().strip_prefix('$')?.parse().ok()?;
                let mut buf = vec![0u8; len + 2];
                reader.read_exact(&mut buf).await.ok()?;
                args.push(String::from_utf8_lossy(&buf[..len]).into_owned());
            }
            Some(args)
        }

        fn respond(args: &[String], list: &List) -> String {
            let mut list = list.lock().unwrap();
            let name = args.first().map(|a| a.to_ascii_uppercase()).unwrap_or_default();
            match name.as_str() {
                "PING" => "+PONG\r\n".to_string(),
                "RPUSH" => {
                    list.extend(args[2..].iter().cloned());
                    format!(":{}\r\n", list.len())
                }
                "LLEN" => format!(":{}\r\n", list.len()),
                // An empty list answers nil at once, as if the wait elapsed.
                "BLPOP" => match list.pop_front() {
                    Some(payload) => format!(
                        "*2\r\n${}\r\n{}\r\n${}\r\n{}\r\n",
                        args[1].len(),
                        args[1],
                        payload.len(),
                        payload
                    ),
                    None => "*-1\r\n".to_string(),
                },
                _ => "+OK\r\n".to_string(),
            }
        }

        async fn serve(stream: TcpStream, list: List) {
            let (read, mut write) = stream.into_split();
            let mut reader = BufReader::new(read);
            while let Some(args) = read_command(&mut reader).await {
                let reply = respond(&args, &list);
                if write.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        }

        #[tokio::test]
        async fn test_push_then_pop_returns_same_job() {
            let server = FakeRedis::start(usize::MAX).await;
            let queue = RedisJobQueue::connect(&server.config()).await.unwrap();
            queue.ping().await.unwrap();

            let original = job(1);
            queue.push(&original).await.unwrap();
            assert_eq!(queue.len().await.unwrap(), 1);

            let popped = queue.pop(Duration::from_secs(1)).await.unwrap();
            assert_eq!(popped, Some(original));
            assert_eq!(queue.len().await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_pops_in_order_on_one_consumer_connection() {
            let server = FakeRedis::start(usize::MAX).await;
            let queue = RedisJobQueue::connect(&server.config()).await.unwrap();
            for id in 1..=3 {
                queue.push(&job(id)).await.unwrap();
            }

            let mut order = Vec::new();
            while let Some(job) = queue.pop(Duration::from_secs(1)).await.unwrap() {
                order.push(job.page_id);
            }
            assert_eq!(order, vec![1, 2, 3]);
            // One producer connection plus one reused consumer connection.
            assert_eq!(server.connections.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_empty_wait_returns_none() {
            let server = FakeRedis::start(usize::MAX).await;
            let queue = RedisJobQueue::connect(&server.config()).await.unwrap();

            let popped = queue.pop(Duration::from_secs(1)).await.unwrap();
            assert!(popped.is_none());
        }

        #[tokio::test]
        async fn test_garbage_payload_is_malformed() {
            let server = FakeRedis::start(usize::MAX).await;
            server.list.lock().unwrap().push_back("not json".to_string());
            let queue = RedisJobQueue::connect(&server.config()).await.unwrap();

            let err = queue.pop(Duration::from_secs(1)).await.unwrap_err();
            assert!(matches!(err, QueueError::Malformed { ref payload, .. } if payload == "not json"));
            assert_eq!(queue.len().await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_stalled_consumer_connection_times_out() {
            // Only the producer connection is answered.
            let server = FakeRedis::start(1).await;
            let queue = RedisJobQueue::connect(&server.config()).await.unwrap();

            let result = tokio::time::timeout(
                Duration::from_secs(10),
                queue.pop(Duration::from_secs(1)),
            )
            .await
            .expect("pop must give up on its own");
            assert!(matches!(result, Err(QueueError::Timeout { secs: 2 })));
        }
    }
}
