use std::str;
use std::mem;
use std::borrow::{Cow, ToOwned};

use bytes::{BufMut, ByteOrder, BytesMut};

use nom::{be_i16, be_i32};

use errors::Result;

/// Tags the position a parser failed at, for error reporting.
#[derive(Debug, Copy, Clone)]
#[repr(u32)]
pub enum ParseTag {
    ResponseHeader,
    MessageSet,
    Message,
    MessageCrc,
    ProduceTopics,
    ProducePartitions,
    MetadataBrokers,
    MetadataTopics,
    MetadataPartitions,
}

macro_rules! parse_tag {
    ($i:expr, $tag:expr, $submac:ident!( $($args:tt)* )) => (
        add_return_error!($i, ::nom::ErrorKind::Custom($tag as u32), $submac!($($args)*))
    );
    ($i:expr, $tag:expr, $f:expr) => (
        add_return_error!($i, ::nom::ErrorKind::Custom($tag as u32), call!($f))
    );
}

mod header;
mod message;
mod produce;
mod metadata;

pub use self::header::{RequestHeader, ResponseHeader, parse_response_header};
pub use self::message::{MAGIC_BYTE, MESSAGE_OVERHEAD, Message, MessageSet, RECORD_OVERHEAD,
                        parse_message_set, record_size, write_record};
pub use self::produce::{ProducePartitionData, ProduceRequestEncoder, ProduceResponse,
                        ProduceTopicData, parse_produce_response};
pub use self::metadata::{BrokerMetadata, MetadataRequest, MetadataResponse, PartitionMetadata,
                         TopicMetadata, parse_metadata_response};

pub type ApiKey = i16;
pub type ApiVersion = i16;
pub type CorrelationId = i32;
pub type ErrorCode = i16;
pub type Offset = i64;
pub type PartitionId = i32;

/// The numeric codes that the ApiKey in the request can take for each request type.
#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(i16)]
pub enum ApiKeys {
    Produce = 0,
    Fetch = 1,
    Offsets = 2,
    Metadata = 3,
}

/// Possible choices on acknowledgement requirements when producing messages.
#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(i16)]
pub enum RequiredAcks {
    /// Indicates to the receiving broker not to acknowledge messages at all,
    /// a fire-and-forget scenario which is fast but not reliable.
    None = 0,
    /// Requires the receiving broker to wait until the messages are written
    /// to its local log.
    One = 1,
    /// Requires the messages to be acknowledged by all in-sync replicas of
    /// the targeted partition.
    All = -1,
}

impl From<RequiredAcks> for i16 {
    fn from(v: RequiredAcks) -> Self {
        v as i16
    }
}

/// Errors reported by a remote Kafka 0.8 broker in a response.
///
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i16)]
pub enum KafkaCode {
    /// The server experienced an unexpected error when processing the request
    Unknown = -1,
    None = 0,
    /// The requested offset is outside the range of offsets maintained by the server
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist on this broker
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// No leader exists for this partition, it is unavailable for writes
    LeaderNotAvailable = 5,
    /// The receiving replica is not the leader for the partition; the client
    /// metadata is out of date
    NotLeaderForPartition = 6,
    /// The request exceeded the user-specified time limit
    RequestTimedOut = 7,
    /// Used mostly by tools when a broker is not alive
    BrokerNotAvailable = 8,
    /// A replica is expected on a broker, but is not (can be safely ignored)
    ReplicaNotAvailable = 9,
    /// The client attempted to produce a message larger than the configured
    /// broker maximum
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication
    StaleControllerEpoch = 11,
    /// The offset metadata string exceeds the configured maximum
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received
    NetworkException = 13,
    /// The broker is still loading offsets after a leader change for that
    /// offsets topic partition
    GroupLoadInProgress = 14,
    /// The offsets topic has not yet been created, or the group coordinator
    /// is not active
    GroupCoordinatorNotAvailable = 15,
    /// The broker is not the coordinator for this group
    NotCoordinatorForGroup = 16,
    /// The request attempts to access an invalid or internal topic
    InvalidTopic = 17,
    /// A message batch in a produce request exceeds the maximum configured
    /// segment size
    RecordListTooLarge = 18,
    /// The number of in-sync replicas is lower than the configured minimum
    /// and requiredAcks is -1
    NotEnoughReplicas = 19,
    /// The message was written to the log, but with fewer in-sync replicas
    /// than required
    NotEnoughReplicasAfterAppend = 20,
    /// The requested requiredAcks is invalid (must be -1, 0 or 1)
    InvalidRequiredAcks = 21,
}

impl From<i16> for KafkaCode {
    fn from(v: i16) -> Self {
        if v >= -1 && v <= 21 {
            unsafe { mem::transmute(v) }
        } else {
            KafkaCode::Unknown
        }
    }
}

/// A trait for encoding a request to the wire format.
pub trait Encodable {
    fn encode<T: ByteOrder>(self, dst: &mut BytesMut) -> Result<()>;
}

pub trait WriteExt: BufMut + Sized {
    fn put_str<T: ByteOrder, S: AsRef<str>>(&mut self, s: Option<S>) -> Result<()> {
        match s {
            Some(s) => {
                let bytes = s.as_ref().as_bytes();

                if bytes.len() > i16::max_value() as usize {
                    bail!(::errors::ErrorKind::CodecError("string exceeds the maximum size"))
                }

                self.put_i16::<T>(bytes.len() as i16);
                self.put_slice(bytes);
            }
            None => self.put_i16::<T>(-1),
        }

        Ok(())
    }

    fn put_bytes<T: ByteOrder, D: AsRef<[u8]>>(&mut self, d: Option<D>) -> Result<()> {
        match d {
            Some(d) => {
                let bytes = d.as_ref();

                if bytes.len() > i32::max_value() as usize {
                    bail!(::errors::ErrorKind::CodecError("bytes exceed the maximum size"))
                }

                self.put_i32::<T>(bytes.len() as i32);
                self.put_slice(bytes);
            }
            None => self.put_i32::<T>(-1),
        }

        Ok(())
    }

    fn put_array<T, E, F>(&mut self, items: Vec<E>, mut callback: F) -> Result<()>
    where
        T: ByteOrder,
        F: FnMut(&mut Self, E) -> Result<()>,
    {
        if items.len() > i32::max_value() as usize {
            bail!(::errors::ErrorKind::CodecError("array exceeds the maximum size"))
        }

        self.put_i32::<T>(items.len() as i32);

        for item in items {
            callback(self, item)?;
        }

        Ok(())
    }
}

impl<B: BufMut> WriteExt for B {}

named!(pub parse_str<Option<Cow<str>>>,
    do_parse!(
        len: be_i16
     >> s: cond!(len > 0, map!(map_res!(take!(len), str::from_utf8), Cow::from))
     >> (s)
    )
);

named!(pub parse_string<String>,
    do_parse!(
        len: be_i16
     >> s: cond_reduce!(len > 0, map!(map_res!(take!(len), str::from_utf8), ToOwned::to_owned))
     >> (s)
    )
);

named!(pub parse_bytes<Option<Cow<[u8]>>>,
    do_parse!(
        len: be_i32
     >> s: cond!(len > 0, map!(take!(len), Cow::from))
     >> (s)
    )
);
