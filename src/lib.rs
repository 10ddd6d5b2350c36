#![recursion_limit = "128"]

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
extern crate bytes;
#[macro_use]
extern crate nom;
extern crate crc;
extern crate crossbeam_channel;
extern crate hexplay;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate socket2;
extern crate twox_hash;

#[cfg(feature = "gzip")]
extern crate flate2;
#[cfg(feature = "snappy")]
extern crate snap;

#[cfg(test)]
extern crate pretty_env_logger;

#[macro_use]
pub mod errors;
mod compression;
#[macro_use]
mod protocol;
mod network;
mod client;
mod metrics;
mod producer;

pub mod consts {
    pub use producer::{DEFAULT_MESSAGE_BUFFER_SIZE, DEFAULT_NUM_BUFFERS, DEFAULT_SEND_BUFFER_SIZE};
}

pub use errors::{Error, ErrorKind, Result};
pub use compression::Compression;
pub use protocol::{ApiKeys, ApiVersion, CorrelationId, ErrorCode, KafkaCode, Offset,
                   PartitionId, RequiredAcks};
pub use client::{Broker, BrokerRef, KafkaMetadataClient, Metadata, MetadataClient, PartitionInfo};
pub use metrics::{InMemoryRegistry, Meter, MetricsRegistry, default_registry};
pub use producer::{BufferPool, MessageSetBuffer, Producer, ProducerBuilder, ProducerConfig};
