use std::hash::Hasher;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{BigEndian, ByteOrder, BytesMut};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use nom::IResult;

use twox_hash::XxHash;

use errors::{Error, ErrorKind, Result};
use client::{Metadata, MetadataClient};
use network::Connection;
use producer::ProducerConfig;
use producer::buffer::{BufferPool, MessageSetBuffer};
use producer::metrics::ProducerMetrics;
use protocol::{CorrelationId, KafkaCode, PartitionId, ProduceRequestEncoder,
               parse_produce_response};

const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Refreshes driven by the quick-rotate request counter never happen more
/// often than this.
const QUICK_ROTATE_FLOOR: Duration = Duration::from_secs(30);

/// Everything a sender needs, bundled so the supervisor can spawn a fresh
/// one after a crash. Connection state is deliberately not part of it;
/// a replacement sender starts disconnected and recovers through the
/// usual metadata path.
#[derive(Clone)]
pub struct SenderContext {
    pub config: ProducerConfig,
    pub client_id: String,
    pub topic_name: String,
    pub key: Vec<u8>,
    pub rotate_partitions: bool,
    pub quick_rotate: bool,
    pub quick_rotate_message_blocks: i64,
    pub metadata_client: Arc<MetadataClient>,
    pub closed: Arc<AtomicBool>,
    pub ready: Receiver<MessageSetBuffer>,
    pub pool: BufferPool,
    pub metrics: Arc<ProducerMetrics>,
}

/// The long-running transmit loop.
///
/// Drains ready buffers, frames produce requests into the send buffer,
/// writes them to the current partition leader and retries through
/// metadata refresh on any failure.
pub struct Sender {
    ctx: SenderContext,
    key_hash: i32,
    encoder: ProduceRequestEncoder,
    send_buf: BytesMut,
    response_buf: Vec<u8>,
    conn: Option<Connection>,
    metadata: Option<Metadata>,
    partition: PartitionId,
    partition_modifier: i32,
    correlation_id: CorrelationId,
    last_correlation_id: CorrelationId,
    last_refresh: Option<Instant>,
}

impl Sender {
    pub fn new(ctx: SenderContext) -> Result<Sender> {
        let encoder = ProduceRequestEncoder::new(0,
                                                 &ctx.client_id,
                                                 &ctx.topic_name,
                                                 &ctx.key,
                                                 ctx.config.request_required_acks,
                                                 ctx.config.request_timeout_ms,
                                                 ctx.config.compression_codec,
                                                 ctx.config.compression_level)?;

        let key_hash = hash_key(&ctx.key);
        let send_buf = BytesMut::with_capacity(ctx.config.send_buffer_size);

        Ok(Sender {
            ctx: ctx,
            key_hash: key_hash,
            encoder: encoder,
            send_buf: send_buf,
            response_buf: vec![0; 4],
            conn: None,
            metadata: None,
            partition: 0,
            partition_modifier: 0,
            correlation_id: 0,
            last_correlation_id: 0,
            last_refresh: None,
        })
    }

    pub fn run(&mut self) {
        debug!("sender for topic {} started", self.ctx.topic_name);

        loop {
            if self.ctx.closed.load(Ordering::SeqCst) && self.ctx.ready.is_empty() {
                break;
            }

            let buffer = match self.ctx.ready.recv_timeout(POLL_TIMEOUT) {
                Ok(buffer) => buffer,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            self.send_batch(&buffer);
            self.ctx.pool.release(buffer);
        }

        debug!("sender for topic {} stopped", self.ctx.topic_name);
    }

    fn send_batch(&mut self, buffer: &MessageSetBuffer) {
        // close hands over an empty buffer as a wake-up token
        if buffer.is_empty() {
            return;
        }

        let batch_size = buffer.records();
        self.correlation_id = self.correlation_id.wrapping_add(1);

        let mut encoded = false;
        let mut delivered = false;

        for attempt in 0..self.ctx.config.message_send_max_retries + 1 {
            match self.attempt(buffer, &mut encoded) {
                Ok(()) => {
                    delivered = true;
                    break;
                }
                Err(Error(ErrorKind::CompressionOverflow, _)) => {
                    error!("batch of {} records for topic {} does not fit the send buffer \
                            compressed, dropping it",
                           batch_size,
                           self.ctx.topic_name);
                    break;
                }
                Err(err) => {
                    warn!("produce request {} to topic {} failed (attempt {}): {}",
                          self.correlation_id,
                          self.ctx.topic_name,
                          attempt,
                          err);

                    self.metadata = None;

                    thread::sleep(self.ctx.config.retry_backoff());
                }
            }
        }

        self.send_buf.clear();

        if delivered {
            self.ctx.metrics.mark_sent(batch_size);
            self.maybe_refresh_metadata();
        } else {
            self.ctx.metrics.mark_dropped_send_fail(batch_size);
        }
    }

    /// One transmission attempt: make sure metadata and a connection
    /// exist, frame the request if it has not been framed yet, write it
    /// and, unless acks are off, validate the response.
    fn attempt(&mut self, buffer: &MessageSetBuffer, encoded: &mut bool) -> Result<()> {
        if self.metadata.is_none() || self.conn.is_none() {
            self.update_metadata_and_connection(true)?;
        }

        if !*encoded {
            self.send_buf.clear();
            self.encoder.encode::<BigEndian>(self.correlation_id,
                                             self.partition,
                                             buffer.as_bytes(),
                                             &mut self.send_buf)?;
            *encoded = true;
        }

        let read_acks = self.ctx.config.request_required_acks != 0;
        let expected = self.correlation_id;

        let conn = match self.conn {
            Some(ref mut conn) => conn,
            None => bail!(ErrorKind::NoBrokerAvailable),
        };

        conn.send(&self.send_buf)?;

        if read_acks {
            conn.read_exact(&mut self.response_buf[..4])?;

            let size = BigEndian::read_i32(&self.response_buf[..4]);
            if size <= 0 {
                bail!(ErrorKind::CodecError("produce response has no body"))
            }

            let size = size as usize;
            if self.response_buf.len() < size {
                self.response_buf.resize(size, 0);
            }

            conn.read_exact(&mut self.response_buf[..size])?;

            let response = match parse_produce_response(&self.response_buf[..size]) {
                IResult::Done(_, response) => response,
                _ => bail!(ErrorKind::CodecError("invalid produce response")),
            };

            if response.header.correlation_id != expected {
                bail!(ErrorKind::CorrelationMismatch(expected, response.header.correlation_id));
            }

            if let Some(code) = response.error_code() {
                if code != 0 {
                    bail!(ErrorKind::BrokerFailure(KafkaCode::from(code)));
                }
            }

            conn.drain()?;
        }

        Ok(())
    }

    /// Re-resolves partition and leader, reconnecting when the leader
    /// endpoint changed or `force` is set. A non-forced call also advances
    /// the rotation modifier when rotation is on.
    fn update_metadata_and_connection(&mut self, force: bool) -> Result<()> {
        let metadata = self.ctx
            .metadata_client
            .fetch(&self.ctx.config.metadata_broker_list,
                   &self.ctx.topic_name,
                   &self.ctx.client_id)?;

        let partition_count = match metadata.partition_count(&self.ctx.topic_name) {
            Some(count) if count > 0 => count as i32,
            _ => bail!(ErrorKind::UnknownTopic(self.ctx.topic_name.clone())),
        };

        if self.ctx.rotate_partitions && !force {
            self.partition_modifier = (self.partition_modifier + 1) % partition_count;
        }

        self.partition = ((self.key_hash as i64 + self.partition_modifier as i64) %
                          partition_count as i64) as PartitionId;

        let addr = match metadata.leader(&self.ctx.topic_name, self.partition) {
            Some(leader) => leader.addr(),
            None => {
                bail!(ErrorKind::NoLeaderForPartition(self.ctx.topic_name.clone(),
                                                      self.partition))
            }
        };

        let reconnect = force || self.conn.as_ref().map_or(true, |conn| conn.addr() != addr);

        if reconnect {
            debug!("connecting to leader {} for partition {} of topic {}",
                   addr,
                   self.partition,
                   self.ctx.topic_name);

            self.conn = None;
            self.conn = Some(Connection::open(&addr,
                                              self.ctx.config.send_buffer_size,
                                              self.ctx.config.read_timeout())?);
        }

        self.metadata = Some(metadata);
        self.last_refresh = Some(Instant::now());
        self.last_correlation_id = self.correlation_id;

        Ok(())
    }

    /// The post-send refresh triggers: the configured time interval, or
    /// the quick-rotate request counter with its thirty-second floor.
    fn maybe_refresh_metadata(&mut self) {
        let elapsed = match self.last_refresh {
            Some(at) => at.elapsed(),
            None => return,
        };

        let interval_ms = self.ctx.config.topic_metadata_refresh_interval_ms;
        let time_based = interval_ms >= 0 && elapsed >= Duration::from_millis(interval_ms as u64);

        let quick = self.ctx.quick_rotate &&
                    self.correlation_id.wrapping_sub(self.last_correlation_id) as i64 >
                    self.ctx.quick_rotate_message_blocks &&
                    elapsed >= QUICK_ROTATE_FLOOR;

        if time_based || quick {
            if let Err(err) = self.update_metadata_and_connection(false) {
                warn!("metadata refresh for topic {} failed: {}",
                      self.ctx.topic_name,
                      err);

                self.metadata = None;
            }
        }
    }
}

/// A stable non-negative hash of the partitioning key.
fn hash_key(key: &[u8]) -> i32 {
    let mut hasher = XxHash::with_seed(0);
    hasher.write(key);

    (hasher.finish() & 0x7fff_ffff) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key_is_stable_and_non_negative() {
        let first = hash_key(b"key");
        let second = hash_key(b"key");

        assert_eq!(first, second);
        assert!(first >= 0);
        assert!(hash_key(b"") >= 0);
        assert!(hash_key(b"another key") >= 0);
    }
}
