use bytes::{ByteOrder, BytesMut};

use nom::{be_i16, be_i32};

use errors::Result;
use protocol::{Encodable, ErrorCode, ParseTag, PartitionId, RequestHeader, ResponseHeader,
               WriteExt, parse_response_header, parse_string};

/// TopicMetadataRequest => [TopicName]
///
/// Asking for no topics returns metadata for every topic in the cluster;
/// the producer always names its one topic.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataRequest<'a> {
    pub header: RequestHeader<'a>,
    pub topic_names: Vec<String>,
}

impl<'a> Encodable for MetadataRequest<'a> {
    fn encode<T: ByteOrder>(self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_array::<T, _, _>(self.topic_names, |buf, topic_name| {
            buf.put_str::<T, _>(Some(topic_name))
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetadataResponse {
    pub header: ResponseHeader,
    pub brokers: Vec<BrokerMetadata>,
    pub topics: Vec<TopicMetadata>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BrokerMetadata {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicMetadata {
    pub error_code: ErrorCode,
    pub topic_name: String,
    pub partitions: Vec<PartitionMetadata>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionMetadata {
    pub error_code: ErrorCode,
    pub partition: PartitionId,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

named!(pub parse_metadata_response<MetadataResponse>,
    do_parse!(
        header: parse_response_header
     >> brokers: parse_tag!(ParseTag::MetadataBrokers,
            length_count!(be_i32, parse_broker_metadata))
     >> topics: parse_tag!(ParseTag::MetadataTopics,
            length_count!(be_i32, parse_topic_metadata))
     >> (MetadataResponse {
            header: header,
            brokers: brokers,
            topics: topics,
        })
    )
);

named!(parse_broker_metadata<BrokerMetadata>,
    do_parse!(
        node_id: be_i32
     >> host: parse_string
     >> port: be_i32
     >> (BrokerMetadata {
            node_id: node_id,
            host: host,
            port: port,
        })
    )
);

named!(parse_topic_metadata<TopicMetadata>,
    do_parse!(
        error_code: be_i16
     >> topic_name: parse_string
     >> partitions: parse_tag!(ParseTag::MetadataPartitions,
            length_count!(be_i32, parse_partition_metadata))
     >> (TopicMetadata {
            error_code: error_code,
            topic_name: topic_name,
            partitions: partitions,
        })
    )
);

named!(parse_partition_metadata<PartitionMetadata>,
    do_parse!(
        error_code: be_i16
     >> partition: be_i32
     >> leader: be_i32
     >> replicas: length_count!(be_i32, be_i32)
     >> isr: length_count!(be_i32, be_i32)
     >> (PartitionMetadata {
            error_code: error_code,
            partition: partition,
            leader: leader,
            replicas: replicas,
            isr: isr,
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::{BigEndian, BytesMut};

    use nom::IResult;

    use super::*;
    use protocol::{ApiKey, ApiKeys};

    #[test]
    fn test_encode_metadata_request() {
        let request = MetadataRequest {
            header: RequestHeader {
                api_key: ApiKeys::Metadata as ApiKey,
                api_version: 0,
                correlation_id: 1,
                client_id: Some("client".into()),
            },
            topic_names: vec!["topic".to_owned()],
        };

        let mut buf = BytesMut::with_capacity(64);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..],
                   &[0, 3,                              // api_key
                     0, 0,                              // api_version
                     0, 0, 0, 1,                        // correlation_id
                     0, 6, 99, 108, 105, 101, 110, 116, // client_id
                     0, 0, 0, 1,                        // topics
                     0, 5, b't', b'o', b'p', b'i', b'c'][..]);
    }

    #[test]
    fn test_parse_metadata_response() {
        let data = vec![
            0, 0, 0, 1,                                 // correlation_id
            0, 0, 0, 1,                                 // brokers
                0, 0, 0, 3,                             // node_id
                0, 9, b'l', b'o', b'c', b'a', b'l', b'h', b'o', b's', b't',
                0, 0, 35, 132,                          // port = 9092
            0, 0, 0, 1,                                 // topics
                0, 0,                                   // error_code
                0, 5, b't', b'o', b'p', b'i', b'c',
                0, 0, 0, 1,                             // partitions
                    0, 0,                               // error_code
                    0, 0, 0, 0,                         // partition
                    0, 0, 0, 3,                         // leader
                    0, 0, 0, 1, 0, 0, 0, 3,             // replicas
                    0, 0, 0, 1, 0, 0, 0, 3,             // isr
        ];

        match parse_metadata_response(&data[..]) {
            IResult::Done(remaining, response) => {
                assert_eq!(remaining.len(), 0);
                assert_eq!(response.header.correlation_id, 1);
                assert_eq!(response.brokers,
                           vec![BrokerMetadata {
                                    node_id: 3,
                                    host: "localhost".to_owned(),
                                    port: 9092,
                                }]);
                assert_eq!(response.topics.len(), 1);
                assert_eq!(response.topics[0].partitions[0].leader, 3);
            }
            res => panic!("unexpected parse result: {:?}", res),
        }
    }
}
