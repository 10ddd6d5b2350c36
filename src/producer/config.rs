use std::time::Duration;

use compression::Compression;

pub const DEFAULT_MESSAGE_BUFFER_SIZE: usize = 1024 * 1024;
pub const DEFAULT_SEND_BUFFER_SIZE: usize = DEFAULT_MESSAGE_BUFFER_SIZE + 1024;
pub const DEFAULT_NUM_BUFFERS: usize = 2;

/// Everything a producer instance is bound to at construction.
///
/// The struct is plain data with serde derives so a host can load it from
/// whatever format it keeps its configuration in.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Written to the wire request; `0` also skips the response read,
    /// `-1` demands acknowledgement by every in-sync replica.
    pub request_required_acks: i16,

    /// Per-request broker timeout, also the base of the socket read timeout.
    pub request_timeout_ms: i32,

    /// How many times one batch is retransmitted before it is dropped.
    pub message_send_max_retries: usize,

    pub retry_backoff_ms: u64,

    /// Capacity of the request assembly buffer and the socket send-buffer hint.
    pub send_buffer_size: usize,

    /// Cadence of time-based metadata refresh; `< 0` disables it.
    pub topic_metadata_refresh_interval_ms: i64,

    /// Flush-tick period bounding how long a partial batch may linger.
    pub queue_buffering_max_ms: u64,

    /// Pool-take timeout: `-1` blocks forever, `0` never blocks,
    /// `> 0` waits that many milliseconds.
    pub queue_enqueue_timeout_ms: i64,

    /// Capacity of each message-set buffer.
    pub message_buffer_size: usize,

    /// How many message-set buffers the pool holds.
    pub num_buffers: usize,

    /// Draw buffers from the process-wide pool instead of a private one.
    pub use_shared_buffers: bool,

    pub compression_codec: Compression,

    pub compression_level: u32,

    /// Seed endpoints (`host:port`) tried for metadata fetches.
    pub metadata_broker_list: Vec<String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            request_required_acks: 1,
            request_timeout_ms: 10_000,
            message_send_max_retries: 3,
            retry_backoff_ms: 100,
            send_buffer_size: DEFAULT_SEND_BUFFER_SIZE,
            topic_metadata_refresh_interval_ms: 600_000,
            queue_buffering_max_ms: 5_000,
            queue_enqueue_timeout_ms: -1,
            message_buffer_size: DEFAULT_MESSAGE_BUFFER_SIZE,
            num_buffers: DEFAULT_NUM_BUFFERS,
            use_shared_buffers: false,
            compression_codec: Compression::None,
            compression_level: 6,
            metadata_broker_list: vec!["localhost:9092".to_owned()],
        }
    }
}

impl ProducerConfig {
    /// The socket read deadline: the broker timeout plus a grace second.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms as u64 + 1000)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.queue_buffering_max_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProducerConfig::default();

        assert_eq!(config.request_required_acks, 1);
        assert_eq!(config.queue_enqueue_timeout_ms, -1);
        assert_eq!(config.num_buffers, DEFAULT_NUM_BUFFERS);
        assert_eq!(config.compression_codec, Compression::None);
        assert_eq!(config.read_timeout(), Duration::from_millis(11_000));
    }
}
