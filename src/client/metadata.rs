use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{BigEndian, BufMut, ByteOrder, BytesMut};

use nom::IResult;

use rand::{self, Rng};

use errors::{ErrorKind, Result};
use client::{Broker, BrokerRef, PartitionInfo};
use network::Connection;
use protocol::{ApiKey, ApiKeys, CorrelationId, Encodable, MetadataRequest, MetadataResponse,
               PartitionId, RequestHeader, parse_metadata_response};

const METADATA_SOCKET_BUFFER_SIZE: usize = 64 * 1024;

/// A point-in-time snapshot of topic layout and broker endpoints.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    brokers: HashMap<BrokerRef, Broker>,
    topics: HashMap<String, Vec<PartitionInfo>>,
}

impl Metadata {
    /// Builds a snapshot for a single topic whose partitions all have a
    /// known leader. Mostly useful for hosts that resolve metadata through
    /// other channels.
    pub fn with_topic(topic_name: &str, partitions: Vec<(PartitionId, Broker)>) -> Self {
        let mut brokers = HashMap::new();
        let mut infos = Vec::with_capacity(partitions.len());

        for (partition, broker) in partitions {
            infos.push(PartitionInfo {
                partition: partition,
                leader: Some(broker.id()),
            });
            brokers.insert(broker.id(), broker);
        }

        let mut topics = HashMap::new();
        topics.insert(topic_name.to_owned(), infos);

        Metadata {
            brokers: brokers,
            topics: topics,
        }
    }

    pub fn topic(&self, topic_name: &str) -> Option<&[PartitionInfo]> {
        self.topics.get(topic_name).map(|partitions| &partitions[..])
    }

    pub fn partition_count(&self, topic_name: &str) -> Option<usize> {
        self.topic(topic_name).map(|partitions| partitions.len())
    }

    pub fn broker(&self, id: BrokerRef) -> Option<&Broker> {
        self.brokers.get(&id)
    }

    /// The broker currently leading the given partition, if any.
    pub fn leader(&self, topic_name: &str, partition: PartitionId) -> Option<&Broker> {
        self.topic(topic_name)
            .and_then(|partitions| {
                partitions
                    .iter()
                    .find(|info| info.partition == partition)
            })
            .and_then(|info| info.leader)
            .and_then(|id| self.broker(id))
    }
}

impl From<MetadataResponse> for Metadata {
    fn from(response: MetadataResponse) -> Self {
        let brokers = response
            .brokers
            .into_iter()
            .map(|broker| {
                (broker.node_id, Broker::new(broker.node_id, &broker.host, broker.port as u16))
            })
            .collect();

        let topics = response
            .topics
            .into_iter()
            .map(|topic| {
                let mut partitions: Vec<PartitionInfo> = topic
                    .partitions
                    .into_iter()
                    .map(|partition| {
                        PartitionInfo {
                            partition: partition.partition,
                            leader: if partition.leader < 0 {
                                None
                            } else {
                                Some(partition.leader)
                            },
                        }
                    })
                    .collect();

                partitions.sort_by_key(|info| info.partition);

                (topic.topic_name, partitions)
            })
            .collect();

        Metadata {
            brokers: brokers,
            topics: topics,
        }
    }
}

/// Fetches topic metadata from the cluster.
///
/// The producer only depends on this trait; hosts and tests can substitute
/// their own resolution.
pub trait MetadataClient: Send + Sync {
    fn fetch(&self, brokers: &[String], topic_name: &str, client_id: &str) -> Result<Metadata>;
}

/// Speaks the Kafka 0.8 metadata API against the seed brokers over
/// short-lived connections.
pub struct KafkaMetadataClient {
    timeout: Duration,
    correlation_id: AtomicUsize,
}

impl KafkaMetadataClient {
    pub fn new(timeout: Duration) -> Self {
        KafkaMetadataClient {
            timeout: timeout,
            correlation_id: AtomicUsize::new(0),
        }
    }

    fn fetch_from(&self, addr: &str, topic_name: &str, client_id: &str) -> Result<Metadata> {
        let mut conn = Connection::open(addr, METADATA_SOCKET_BUFFER_SIZE, self.timeout)?;

        let correlation_id = self.correlation_id.fetch_add(1, Ordering::SeqCst) as CorrelationId;

        let request = MetadataRequest {
            header: RequestHeader {
                api_key: ApiKeys::Metadata as ApiKey,
                api_version: 0,
                correlation_id: correlation_id,
                client_id: Some(client_id.into()),
            },
            topic_names: vec![topic_name.to_owned()],
        };

        let mut buf = BytesMut::with_capacity(256);
        buf.put_i32::<BigEndian>(0);
        request.encode::<BigEndian>(&mut buf)?;
        let size = (buf.len() - 4) as i32;
        BigEndian::write_i32(&mut buf[..4], size);

        conn.send(&buf)?;

        let mut prefix = [0u8; 4];
        conn.read_exact(&mut prefix)?;

        let size = BigEndian::read_i32(&prefix);
        if size <= 0 {
            bail!(ErrorKind::CodecError("metadata response has no body"))
        }

        let mut body = vec![0u8; size as usize];
        conn.read_exact(&mut body)?;

        match parse_metadata_response(&body) {
            IResult::Done(_, response) => {
                if response.header.correlation_id != correlation_id {
                    bail!(ErrorKind::CorrelationMismatch(correlation_id,
                                                         response.header.correlation_id))
                }

                Ok(Metadata::from(response))
            }
            _ => bail!(ErrorKind::CodecError("invalid metadata response")),
        }
    }
}

impl MetadataClient for KafkaMetadataClient {
    fn fetch(&self, brokers: &[String], topic_name: &str, client_id: &str) -> Result<Metadata> {
        let mut seeds = brokers.to_vec();
        rand::thread_rng().shuffle(&mut seeds);

        for addr in &seeds {
            match self.fetch_from(addr, topic_name, client_id) {
                Ok(metadata) => {
                    debug!("fetched metadata for topic {} from {}", topic_name, addr);

                    return Ok(metadata);
                }
                Err(err) => warn!("metadata fetch from {} failed: {}", addr, err),
            }
        }

        bail!(ErrorKind::NoBrokerAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{BrokerMetadata, PartitionMetadata, ResponseHeader, TopicMetadata};

    fn response() -> MetadataResponse {
        MetadataResponse {
            header: ResponseHeader { correlation_id: 1 },
            brokers: vec![BrokerMetadata {
                              node_id: 1,
                              host: "a".to_owned(),
                              port: 9092,
                          },
                          BrokerMetadata {
                              node_id: 2,
                              host: "b".to_owned(),
                              port: 9092,
                          }],
            topics: vec![TopicMetadata {
                             error_code: 0,
                             topic_name: "topic".to_owned(),
                             partitions: vec![PartitionMetadata {
                                                  error_code: 0,
                                                  partition: 1,
                                                  leader: 2,
                                                  replicas: vec![1, 2],
                                                  isr: vec![1, 2],
                                              },
                                              PartitionMetadata {
                                                  error_code: 0,
                                                  partition: 0,
                                                  leader: -1,
                                                  replicas: vec![1],
                                                  isr: vec![],
                                              }],
                         }],
        }
    }

    #[test]
    fn test_snapshot_accessors() {
        let metadata = Metadata::from(response());

        assert_eq!(metadata.partition_count("topic"), Some(2));
        assert_eq!(metadata.partition_count("other"), None);
        assert_eq!(metadata.broker(2).map(|broker| broker.addr()),
                   Some("b:9092".to_owned()));

        // partitions come back sorted by id
        let partitions = metadata.topic("topic").unwrap();
        assert_eq!(partitions[0].partition, 0);
        assert_eq!(partitions[1].partition, 1);

        // partition 0 is mid-election
        assert!(metadata.leader("topic", 0).is_none());
        assert_eq!(metadata.leader("topic", 1).map(|broker| broker.id()), Some(2));
    }
}
