use std::sync::Arc;

use errors::Result;
use client::MetadataClient;
use metrics::MetricsRegistry;
use producer::ProducerConfig;
use producer::producer::{Producer, build};

/// Assembles a producer bound to one (topic, partitioning-key) pair.
pub struct ProducerBuilder {
    config: ProducerConfig,
    client_id: String,
    topic_name: String,
    key: String,
    rotate_partitions: bool,
    quick_rotate: bool,
    quick_rotate_message_blocks: i64,
    registry: Option<Arc<MetricsRegistry>>,
    metadata_client: Option<Arc<MetadataClient>>,
}

impl ProducerBuilder {
    pub fn new(config: ProducerConfig, client_id: &str, topic_name: &str, key: &str) -> Self {
        ProducerBuilder {
            config: config,
            client_id: client_id.to_owned(),
            topic_name: topic_name.to_owned(),
            key: key.to_owned(),
            rotate_partitions: false,
            quick_rotate: false,
            quick_rotate_message_blocks: 0,
            registry: None,
            metadata_client: None,
        }
    }

    /// Walk the topic's partitions round-robin, advancing on every
    /// non-forced metadata refresh.
    pub fn rotate_partitions(mut self, enabled: bool) -> Self {
        self.rotate_partitions = enabled;
        self
    }

    /// Additionally drive refreshes from the request counter.
    pub fn quick_rotate(mut self, enabled: bool) -> Self {
        self.quick_rotate = enabled;
        self
    }

    /// How many requests have to go out before a quick-rotate refresh fires.
    pub fn quick_rotate_message_blocks(mut self, blocks: i64) -> Self {
        self.quick_rotate_message_blocks = blocks;
        self
    }

    /// Report into this registry instead of the process default.
    pub fn metrics(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Resolve metadata through this client instead of the wire fetcher.
    pub fn metadata_client(mut self, client: Arc<MetadataClient>) -> Self {
        self.metadata_client = Some(client);
        self
    }

    pub fn build(self) -> Result<Producer> {
        build(self.config,
              self.client_id,
              self.topic_name,
              self.key,
              self.rotate_partitions,
              self.quick_rotate,
              self.quick_rotate_message_blocks,
              self.registry,
              self.metadata_client)
    }
}
