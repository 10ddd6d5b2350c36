use bytes::{BufMut, ByteOrder, BytesMut};

use nom::{be_i16, be_i32, be_i64};

use crc::crc32;

use errors::Result;
use compression::{Compression, Compressor};
use protocol::{ApiKey, ApiKeys, ApiVersion, CorrelationId, ErrorCode, MAGIC_BYTE, Offset,
               ParseTag, PartitionId, RequestHeader, ResponseHeader, WriteExt,
               parse_response_header, parse_string};

/// Builds produce requests for one (topic, partition) pair into a reusable
/// send buffer.
///
/// ProduceRequest => RequiredAcks Timeout [TopicName [Partition MessageSetSize MessageSet]]
///   RequiredAcks => int16
///   Timeout => int32
///   Partition => int32
///   MessageSetSize => int32
///
/// The request carries exactly one topic and one partition. Fields whose
/// value depends on bytes written later (total size, message-set size,
/// wrapper message size and CRC) are back-patched through saved offsets.
pub struct ProduceRequestEncoder {
    api_version: ApiVersion,
    client_id: String,
    topic_name: String,
    key: Vec<u8>,
    required_acks: i16,
    ack_timeout: i32,
    compressor: Option<Box<Compressor>>,
}

impl ProduceRequestEncoder {
    pub fn new(api_version: ApiVersion,
               client_id: &str,
               topic_name: &str,
               key: &[u8],
               required_acks: i16,
               ack_timeout: i32,
               compression: Compression,
               compression_level: u32)
               -> Result<Self> {
        Ok(ProduceRequestEncoder {
            api_version: api_version,
            client_id: client_id.to_owned(),
            topic_name: topic_name.to_owned(),
            key: key.to_owned(),
            required_acks: required_acks,
            ack_timeout: ack_timeout,
            compressor: compression.compressor(compression_level)?,
        })
    }

    pub fn encode<T: ByteOrder>(&mut self,
                                correlation_id: CorrelationId,
                                partition: PartitionId,
                                message_set: &[u8],
                                dst: &mut BytesMut)
                                -> Result<()> {
        let size_off = dst.len();
        dst.put_i32::<T>(0);

        let header = RequestHeader {
            api_key: ApiKeys::Produce as ApiKey,
            api_version: self.api_version,
            correlation_id: correlation_id,
            client_id: Some(self.client_id.as_str().into()),
        };
        header.encode::<T>(dst)?;

        dst.put_i16::<T>(self.required_acks);
        dst.put_i32::<T>(self.ack_timeout);
        dst.put_i32::<T>(1);
        dst.put_str::<T, _>(Some(self.topic_name.as_str()))?;
        dst.put_i32::<T>(1);
        dst.put_i32::<T>(partition);

        match self.compressor {
            None => {
                dst.put_i32::<T>(message_set.len() as i32);
                dst.put_slice(message_set);
            }
            Some(ref mut compressor) => {
                let set_size_off = dst.len();
                dst.put_i32::<T>(0);
                let set_off = dst.len();

                // the single wrapper message carrying the compressed set
                dst.put_i64::<T>(0);
                let msg_size_off = dst.len();
                dst.put_i32::<T>(0);
                let crc_off = dst.len();
                dst.put_i32::<T>(0);
                let data_off = dst.len();
                dst.put_i8(MAGIC_BYTE);
                dst.put_i8(compressor.attribute());
                dst.put_bytes::<T, _>(Some(&self.key))?;
                let value_len_off = dst.len();
                dst.put_i32::<T>(0);
                let value_off = dst.len();

                let capacity = dst.capacity();
                dst.resize(capacity, 0);
                let value_len = compressor.compress(message_set, &mut dst[value_off..])?;
                dst.truncate(value_off + value_len);

                T::write_i32(&mut dst[value_len_off..], value_len as i32);
                let msg_size = dst.len() - crc_off;
                T::write_i32(&mut dst[msg_size_off..], msg_size as i32);
                let crc = crc32::checksum_ieee(&dst[data_off..]);
                T::write_i32(&mut dst[crc_off..], crc as i32);
                let set_size = dst.len() - set_off;
                T::write_i32(&mut dst[set_size_off..], set_size as i32);
            }
        }

        let total_size = dst.len() - size_off - 4;
        T::write_i32(&mut dst[size_off..], total_size as i32);

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProduceResponse {
    pub header: ResponseHeader,
    pub topics: Vec<ProduceTopicData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProduceTopicData {
    pub topic_name: String,
    pub partitions: Vec<ProducePartitionData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProducePartitionData {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub offset: Offset,
}

impl ProduceResponse {
    /// The error code of the one partition a single-partition request targeted.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.topics
            .first()
            .and_then(|topic| topic.partitions.first())
            .map(|partition| partition.error_code)
    }
}

named!(pub parse_produce_response<ProduceResponse>,
    do_parse!(
        header: parse_response_header
     >> topics: parse_tag!(ParseTag::ProduceTopics,
            length_count!(be_i32, parse_produce_topic_data))
     >> (ProduceResponse {
            header: header,
            topics: topics,
        })
    )
);

named!(parse_produce_topic_data<ProduceTopicData>,
    do_parse!(
        topic_name: parse_string
     >> partitions: parse_tag!(ParseTag::ProducePartitions,
            length_count!(be_i32, parse_produce_partition_data))
     >> (ProduceTopicData {
            topic_name: topic_name,
            partitions: partitions,
        })
    )
);

named!(parse_produce_partition_data<ProducePartitionData>,
    do_parse!(
        partition: be_i32
     >> error_code: be_i16
     >> offset: be_i64
     >> (ProducePartitionData {
            partition: partition,
            error_code: error_code,
            offset: offset,
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use nom::IResult;

    use super::*;
    use protocol::{parse_message_set, write_record};

    fn encoder(compression: Compression) -> ProduceRequestEncoder {
        ProduceRequestEncoder::new(0, "client", "topic", b"key", 1, 10_000, compression, 6)
            .unwrap()
    }

    fn message_set() -> BytesMut {
        let mut buf = BytesMut::with_capacity(256);
        write_record::<BigEndian>(&mut buf, b"key", b"hello").unwrap();
        write_record::<BigEndian>(&mut buf, b"key", b"world").unwrap();
        buf
    }

    // offset of the message-set size field for the fixed test header:
    // size(4) header(4+2+2+4+2+6) acks(2) timeout(4) topics(4) topic(2+5)
    // partitions(4) partition(4)
    const SET_SIZE_OFF: usize = 39;

    #[test]
    fn test_encode_uncompressed() {
        let set = message_set();
        let mut buf = BytesMut::with_capacity(1024);

        encoder(Compression::None)
            .encode::<BigEndian>(123, 7, &set[..], &mut buf)
            .unwrap();

        assert_eq!(BigEndian::read_i32(&buf[..4]) as usize, buf.len() - 4);
        assert_eq!(BigEndian::read_i16(&buf[4..6]), 0); // api_key = produce
        assert_eq!(BigEndian::read_i32(&buf[8..12]), 123); // correlation_id
        assert_eq!(BigEndian::read_i32(&buf[SET_SIZE_OFF - 4..SET_SIZE_OFF]), 7);
        assert_eq!(BigEndian::read_i32(&buf[SET_SIZE_OFF..SET_SIZE_OFF + 4]) as usize,
                   set.len());
        assert_eq!(&buf[SET_SIZE_OFF + 4..], &set[..]);
    }

    #[test]
    fn test_encode_clears_between_requests() {
        let set = message_set();
        let mut buf = BytesMut::with_capacity(1024);
        let mut encoder = encoder(Compression::None);

        encoder.encode::<BigEndian>(1, 0, &set[..], &mut buf).unwrap();
        let first = buf.len();

        buf.clear();
        encoder.encode::<BigEndian>(2, 0, &set[..], &mut buf).unwrap();

        assert_eq!(buf.len(), first);
        assert_eq!(BigEndian::read_i32(&buf[8..12]), 2);
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn test_encode_gzip() {
        use std::io::Read;

        let set = message_set();
        let mut buf = BytesMut::with_capacity(4096);

        encoder(Compression::Gzip)
            .encode::<BigEndian>(123, 0, &set[..], &mut buf)
            .unwrap();

        assert_eq!(BigEndian::read_i32(&buf[..4]) as usize, buf.len() - 4);

        let set_size = BigEndian::read_i32(&buf[SET_SIZE_OFF..SET_SIZE_OFF + 4]) as usize;
        let wrapper = &buf[SET_SIZE_OFF + 4..];
        assert_eq!(set_size, wrapper.len());

        // wrapper record: offset, size, crc, magic, attrs, key, value_len, value
        assert_eq!(BigEndian::read_i64(&wrapper[..8]), 0);
        assert_eq!(BigEndian::read_i32(&wrapper[8..12]) as usize, wrapper.len() - 12);

        let crc = BigEndian::read_i32(&wrapper[12..16]) as u32;
        assert_eq!(crc, ::crc::crc32::checksum_ieee(&wrapper[16..]));

        assert_eq!(wrapper[16] as i8, MAGIC_BYTE);
        assert_eq!(wrapper[17] as i8, Compression::Gzip.attribute());
        assert_eq!(BigEndian::read_i32(&wrapper[18..22]), 3);
        assert_eq!(&wrapper[22..25], b"key");

        let value_len = BigEndian::read_i32(&wrapper[25..29]) as usize;
        let value = &wrapper[29..];
        assert_eq!(value_len, value.len());

        let mut inner = Vec::new();
        ::flate2::read::GzDecoder::new(value).read_to_end(&mut inner).unwrap();
        assert_eq!(&inner[..], &set[..]);
    }

    #[cfg(feature = "snappy")]
    #[test]
    fn test_encode_snappy() {
        let set = message_set();
        let mut buf = BytesMut::with_capacity(4096);

        encoder(Compression::Snappy)
            .encode::<BigEndian>(123, 0, &set[..], &mut buf)
            .unwrap();

        let wrapper = &buf[SET_SIZE_OFF + 4..];
        assert_eq!(wrapper[17] as i8, Compression::Snappy.attribute());

        let value_len = BigEndian::read_i32(&wrapper[25..29]) as usize;
        let inner = ::snap::Decoder::new()
            .decompress_vec(&wrapper[29..29 + value_len])
            .unwrap();
        assert_eq!(&inner[..], &set[..]);

        match parse_message_set(&inner[..]) {
            IResult::Done(remaining, message_set) => {
                assert_eq!(remaining.len(), 0);
                assert_eq!(message_set.messages.len(), 2);
            }
            res => panic!("unexpected parse result: {:?}", res),
        }
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn test_encode_compression_overflow() {
        use errors::{Error, ErrorKind};

        let set = message_set();
        // room for the headers but not for the compressed value
        let mut buf = BytesMut::with_capacity(SET_SIZE_OFF + 4 + 29 + 4);

        match encoder(Compression::Gzip).encode::<BigEndian>(123, 0, &set[..], &mut buf) {
            Err(Error(ErrorKind::CompressionOverflow, _)) => {}
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn test_parse_produce_response() {
        let data = vec![
            0, 0, 0, 123,               // correlation_id
            0, 0, 0, 1,                 // topics
                0, 5, b't', b'o', b'p', b'i', b'c',
                0, 0, 0, 1,             // partitions
                    0, 0, 0, 7,         // partition
                    0, 6,               // error_code
                    0, 0, 0, 0, 0, 0, 0, 42, // offset
        ];

        match parse_produce_response(&data[..]) {
            IResult::Done(remaining, response) => {
                assert_eq!(remaining.len(), 0);
                assert_eq!(response.header.correlation_id, 123);
                assert_eq!(response.topics.len(), 1);
                assert_eq!(response.topics[0].topic_name, "topic");
                assert_eq!(response.topics[0].partitions,
                           vec![ProducePartitionData {
                                    partition: 7,
                                    error_code: 6,
                                    offset: 42,
                                }]);
                assert_eq!(response.error_code(), Some(6));
            }
            res => panic!("unexpected parse result: {:?}", res),
        }
    }
}
