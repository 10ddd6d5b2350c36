mod cluster;
mod metadata;

pub use self::cluster::{Broker, BrokerRef, PartitionInfo};
pub use self::metadata::{KafkaMetadataClient, Metadata, MetadataClient};
