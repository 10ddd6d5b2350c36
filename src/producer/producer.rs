use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{self, Receiver, Sender};

use errors::{ErrorKind, Result};
use client::{KafkaMetadataClient, MetadataClient};
use metrics::{MetricsRegistry, default_registry};
use producer::{ProducerBuilder, ProducerConfig};
use producer::buffer::{BufferPool, MessageSetBuffer};
use producer::metrics::{ProducerMetrics, SHARED_FREE_BUFFERS_GAUGE, free_buffers_gauge_name};
use producer::sender::{Sender as BatchSender, SenderContext};
use protocol::record_size;

const SUPERVISOR_INTERVAL: Duration = Duration::from_secs(60);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A latch the timer threads park on, so closing wakes them immediately
/// instead of waiting out their periods.
struct Shutdown {
    down: Mutex<bool>,
    cond: Condvar,
}

impl Shutdown {
    fn new() -> Self {
        Shutdown {
            down: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn signal(&self) {
        *lock(&self.down) = true;
        self.cond.notify_all();
    }

    /// Parks for `timeout` or until the latch trips; `true` means shut down.
    fn wait(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        let mut down = lock(&self.down);

        while !*down {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return false;
            }

            down = self.cond
                .wait_timeout(down, timeout - elapsed)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }

        true
    }
}

/// An asynchronous producer bound to one (topic, partitioning-key) pair.
///
/// `send` appends into a pooled message-set buffer under a per-instance
/// lock; a background sender drains full buffers, frames them into produce
/// requests and talks to the partition leader. Payloads are only dropped
/// when the pool stays empty past the enqueue timeout or a batch exhausts
/// its retries, and both cases are metered.
pub struct Producer {
    inner: Arc<Inner>,
    sender: Arc<Mutex<Option<JoinHandle<()>>>>,
    flush_thread: Option<JoinHandle<()>>,
    supervisor_thread: Option<JoinHandle<()>>,
}

struct Inner {
    config: ProducerConfig,
    client_id: String,
    topic_name: String,
    key: Vec<u8>,
    rotate_partitions: bool,
    quick_rotate: bool,
    quick_rotate_message_blocks: i64,
    registry: Arc<MetricsRegistry>,
    metrics: Arc<ProducerMetrics>,
    metadata_client: Arc<MetadataClient>,
    pool: BufferPool,
    ready_tx: Sender<MessageSetBuffer>,
    ready_rx: Receiver<MessageSetBuffer>,
    active: Mutex<Option<MessageSetBuffer>>,
    closed: Arc<AtomicBool>,
    shutdown: Shutdown,
}

impl Inner {
    /// The serialized ingest path. `None` is the flush hint.
    fn ingest(&self, payload: Option<&[u8]>) -> Result<()> {
        let mut active = lock(&self.active);

        // close() flips the flag while holding the ingest lock, so checking
        // it here means no record can slip in behind the final batch
        if self.closed.load(Ordering::SeqCst) {
            debug!("producer for topic {} is closed, ignoring send", self.topic_name);
            return Ok(());
        }

        match payload {
            None => {
                if let Some(buffer) = active.take() {
                    if buffer.is_empty() {
                        *active = Some(buffer);
                    } else {
                        self.enqueue(buffer);
                    }
                }
            }
            Some(value) => {
                let required = record_size(self.key.len(), value.len());
                if required > self.config.message_buffer_size {
                    bail!(ErrorKind::RecordTooLarge(required, self.config.message_buffer_size));
                }

                self.metrics.mark_received(1);

                if active.is_none() {
                    *active = match self.take_buffer() {
                        Some(buffer) => Some(buffer),
                        None => return Ok(()),
                    };
                }

                let full = active
                    .as_ref()
                    .map_or(false, |buffer| buffer.remaining() < required);

                if full {
                    if let Some(buffer) = active.take() {
                        self.enqueue(buffer);
                    }

                    *active = match self.take_buffer() {
                        Some(buffer) => Some(buffer),
                        None => return Ok(()),
                    };
                }

                if let Some(ref mut buffer) = *active {
                    buffer.append(&self.key, value)?;
                }
            }
        }

        Ok(())
    }

    fn take_buffer(&self) -> Option<MessageSetBuffer> {
        match self.pool.take(self.config.queue_enqueue_timeout_ms) {
            Some(buffer) => Some(buffer),
            None => {
                self.metrics.mark_dropped_queue_full(1);
                None
            }
        }
    }

    fn enqueue(&self, buffer: MessageSetBuffer) {
        let _ = self.ready_tx.send(buffer);
    }

    fn sender_context(&self) -> SenderContext {
        SenderContext {
            config: self.config.clone(),
            client_id: self.client_id.clone(),
            topic_name: self.topic_name.clone(),
            key: self.key.clone(),
            rotate_partitions: self.rotate_partitions,
            quick_rotate: self.quick_rotate,
            quick_rotate_message_blocks: self.quick_rotate_message_blocks,
            metadata_client: self.metadata_client.clone(),
            closed: self.closed.clone(),
            ready: self.ready_rx.clone(),
            pool: self.pool.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

fn spawn_sender(inner: &Arc<Inner>) -> Result<JoinHandle<()>> {
    let ctx = inner.sender_context();
    let topic_name = inner.topic_name.clone();

    let handle = thread::Builder::new()
        .name(format!("producer-sender-{}", topic_name))
        .spawn(move || match BatchSender::new(ctx) {
            Ok(mut sender) => sender.run(),
            Err(err) => error!("sender for topic {} failed to start: {}", topic_name, err),
        })?;

    Ok(handle)
}

pub fn build(config: ProducerConfig,
             client_id: String,
             topic_name: String,
             key: String,
             rotate_partitions: bool,
             quick_rotate: bool,
             quick_rotate_message_blocks: i64,
             registry: Option<Arc<MetricsRegistry>>,
             metadata_client: Option<Arc<MetadataClient>>)
             -> Result<Producer> {
    // surface a bad codec selection here rather than in the sender thread
    config
        .compression_codec
        .compressor(config.compression_level)?;

    let registry: Arc<MetricsRegistry> = match registry {
        Some(registry) => registry,
        None => default_registry(),
    };

    let metadata_client: Arc<MetadataClient> = match metadata_client {
        Some(client) => client,
        None => Arc::new(KafkaMetadataClient::new(config.read_timeout())),
    };

    let (pool, created_shared) = if config.use_shared_buffers {
        BufferPool::shared(config.num_buffers, config.message_buffer_size)
    } else {
        (BufferPool::new(config.num_buffers, config.message_buffer_size), false)
    };

    if created_shared {
        let gauge_pool = pool.clone();
        registry.gauge(SHARED_FREE_BUFFERS_GAUGE,
                       Box::new(move || gauge_pool.free() as i64));
    }

    let gauge_pool = pool.clone();
    registry.gauge(&free_buffers_gauge_name(&topic_name),
                   Box::new(move || gauge_pool.free() as i64));

    let metrics = Arc::new(ProducerMetrics::new(&*registry, &topic_name));

    let (ready_tx, ready_rx) = crossbeam_channel::bounded(config.num_buffers);

    let inner = Arc::new(Inner {
        config: config,
        client_id: client_id,
        topic_name: topic_name,
        key: key.into_bytes(),
        rotate_partitions: rotate_partitions,
        quick_rotate: quick_rotate,
        quick_rotate_message_blocks: quick_rotate_message_blocks,
        registry: registry,
        metrics: metrics,
        metadata_client: metadata_client,
        pool: pool,
        ready_tx: ready_tx,
        ready_rx: ready_rx,
        active: Mutex::new(None),
        closed: Arc::new(AtomicBool::new(false)),
        shutdown: Shutdown::new(),
    });

    let sender = Arc::new(Mutex::new(Some(spawn_sender(&inner)?)));

    let flush_inner = inner.clone();
    let flush_thread = thread::Builder::new()
        .name(format!("producer-flush-{}", flush_inner.topic_name))
        .spawn(move || {
            let interval = flush_inner.config.flush_interval();

            while !flush_inner.shutdown.wait(interval) {
                if let Err(err) = flush_inner.ingest(None) {
                    warn!("flush tick failed: {}", err);
                }
            }
        })?;

    let supervisor_inner = inner.clone();
    let supervisor_sender = sender.clone();
    let supervisor_thread = thread::Builder::new()
        .name(format!("producer-supervisor-{}", supervisor_inner.topic_name))
        .spawn(move || {
            while !supervisor_inner.shutdown.wait(SUPERVISOR_INTERVAL) {
                if supervisor_inner.closed.load(Ordering::SeqCst) {
                    break;
                }

                let mut slot = lock(&supervisor_sender);
                let dead = slot.as_ref().map_or(true, |handle| handle.is_finished());

                if dead {
                    warn!("sender thread for topic {} is not running, respawning",
                          supervisor_inner.topic_name);

                    match spawn_sender(&supervisor_inner) {
                        Ok(handle) => *slot = Some(handle),
                        Err(err) => error!("failed to respawn sender: {}", err),
                    }
                }
            }
        })?;

    Ok(Producer {
        inner: inner,
        sender: sender,
        flush_thread: Some(flush_thread),
        supervisor_thread: Some(supervisor_thread),
    })
}

impl Producer {
    /// A producer with default rotation, metrics and metadata resolution.
    pub fn new(config: ProducerConfig,
               client_id: &str,
               topic_name: &str,
               key: &str)
               -> Result<Producer> {
        Producer::builder(config, client_id, topic_name, key).build()
    }

    pub fn builder(config: ProducerConfig,
                   client_id: &str,
                   topic_name: &str,
                   key: &str)
                   -> ProducerBuilder {
        ProducerBuilder::new(config, client_id, topic_name, key)
    }

    /// Appends one payload to the active batch.
    ///
    /// Blocks at most the configured enqueue timeout; a payload that finds
    /// no free buffer within it is dropped and metered, not reported as an
    /// error. Payloads that cannot fit any buffer are rejected.
    pub fn send(&self, value: &[u8]) -> Result<()> {
        self.inner.ingest(Some(value))
    }

    /// Hands the active batch to the sender even if it is not full yet.
    pub fn flush(&self) -> Result<()> {
        self.inner.ingest(None)
    }

    pub fn topic_name(&self) -> &str {
        &self.inner.topic_name
    }

    /// Drains and stops the producer.
    ///
    /// The active buffer is handed to the sender (even when empty, as a
    /// wake-up token), the timer threads are woken, and all three threads
    /// are joined. Only the first call does anything.
    pub fn close(&mut self) {
        {
            let mut active = lock(&self.inner.active);

            if self.inner.closed.load(Ordering::SeqCst) {
                return;
            }

            if let Some(buffer) = active.take() {
                self.inner.enqueue(buffer);
            }

            // only flip the flag once the last buffer is in the queue, so
            // the sender cannot observe closed-and-empty too early
            self.inner.closed.store(true, Ordering::SeqCst);
        }

        self.inner.shutdown.signal();

        if let Some(handle) = lock(&self.sender).take() {
            let _ = handle.join();
        }

        if let Some(handle) = self.flush_thread.take() {
            let _ = handle.join();
        }

        if let Some(handle) = self.supervisor_thread.take() {
            let _ = handle.join();
        }

        self.inner
            .registry
            .unregister(&free_buffers_gauge_name(&self.inner.topic_name));

        info!("producer for topic {} closed", self.inner.topic_name);
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.close();
    }
}
