use std::mem;

use bytes::{BufMut, ByteOrder, BytesMut};

use nom::{be_i32, be_i64, be_i8};

use crc::crc32;

use errors::Result;
use compression::Compression;
use protocol::{Offset, ParseTag, WriteExt, parse_bytes};

/// Kafka 0.8 on-disk / on-wire message format.
pub const MAGIC_BYTE: i8 = 0;

pub const COMPRESSION_CODEC_MASK: i8 = 0x07;

/// Framing bytes around one record: offset, size, crc, magic, attributes,
/// key length and value length.
pub const RECORD_OVERHEAD: usize = 26;

/// Bytes of a message after the size field, excluding key and value.
pub const MESSAGE_OVERHEAD: usize = 14;

/// The wire size of one record carrying the given key and value.
pub fn record_size(key_len: usize, value_len: usize) -> usize {
    key_len + value_len + RECORD_OVERHEAD
}

/// Appends one uncompressed v0 record to a message set.
///
/// MessageSet => [Offset MessageSize Message]
///   Offset => int64
///   MessageSize => int32
///
/// Message => Crc MagicByte Attributes Key Value
///   Crc => int32
///   MagicByte => int8
///   Attributes => int8
///   Key => bytes
///   Value => bytes
///
/// The offset is always written as zero; the broker assigns real offsets.
/// The CRC field is back-patched once the bytes it covers are in place.
pub fn write_record<T: ByteOrder>(buf: &mut BytesMut, key: &[u8], value: &[u8]) -> Result<()> {
    buf.put_i64::<T>(0);
    buf.put_i32::<T>((key.len() + value.len() + MESSAGE_OVERHEAD) as i32);

    let crc_off = buf.len();
    buf.put_i32::<T>(0);
    let data_off = buf.len();

    buf.put_i8(MAGIC_BYTE);
    buf.put_i8(Compression::None.attribute());
    buf.put_bytes::<T, _>(Some(key))?;
    buf.put_bytes::<T, _>(Some(value))?;

    let crc = crc32::checksum_ieee(&buf[data_off..]);
    T::write_i32(&mut buf[crc_off..], crc as i32);

    Ok(())
}

/// A sequence of messages decoded from a message set region.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageSet {
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub offset: Offset,
    pub compression: Compression,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

named!(parse_messages<Vec<Message>>, many0!(complete!(parse_message)));

named!(pub parse_message_set<MessageSet>,
    parse_tag!(ParseTag::MessageSet,
        do_parse!(
            messages: call!(parse_messages)
         >> (MessageSet {
                messages: messages,
            })
        )
    )
);

named!(parse_message<Message>,
    parse_tag!(ParseTag::Message,
        do_parse!(
            offset: be_i64
         >> size: be_i32
         >> data: peek!(take!(size))
         >> _crc: parse_tag!(ParseTag::MessageCrc,
            verify!(be_i32, |checksum: i32| {
                let crc = crc32::checksum_ieee(&data[mem::size_of::<i32>()..]);

                if crc != checksum as u32 {
                    trace!("message checksum mismatched, expected={}, current={}", crc, checksum as u32);
                }

                crc == checksum as u32
            }))
         >> _magic: verify!(be_i8, |v: i8| v == MAGIC_BYTE)
         >> attrs: be_i8
         >> key: parse_bytes
         >> value: parse_bytes
         >> (Message {
                offset: offset,
                compression: Compression::from(attrs & COMPRESSION_CODEC_MASK),
                key: key.map(|b| b.into_owned()),
                value: value.map(|b| b.into_owned()),
            })
        )
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use nom::IResult;

    use super::*;

    lazy_static!{
        // crc bytes are zeroed in the fixture; tests recompute them instead.
        static ref TEST_RECORD: Vec<u8> = vec![
            0, 0, 0, 0, 0, 0, 0, 0,     // offset
            0, 0, 0, 22,                // size = 3 + 5 + 14
            0, 0, 0, 0,                 // crc
            0,                          // magic
            0,                          // attributes
            0, 0, 0, 3, b'k', b'e', b'y',
            0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o',
        ];
    }

    #[test]
    fn test_write_record() {
        let mut buf = BytesMut::with_capacity(64);

        write_record::<BigEndian>(&mut buf, b"key", b"hello").unwrap();

        assert_eq!(buf.len(), record_size(3, 5));
        assert_eq!(&buf[..12], &TEST_RECORD[..12]);
        assert_eq!(&buf[16..], &TEST_RECORD[16..]);

        let stored = BigEndian::read_i32(&buf[12..16]) as u32;
        assert_eq!(stored, ::crc::crc32::checksum_ieee(&buf[16..]));
    }

    #[test]
    fn test_parse_message_set_round_trip() {
        let mut buf = BytesMut::with_capacity(256);

        write_record::<BigEndian>(&mut buf, b"key", b"hello").unwrap();
        write_record::<BigEndian>(&mut buf, b"key", b"world").unwrap();

        let parsed = parse_message_set(&buf[..]);

        match parsed {
            IResult::Done(remaining, message_set) => {
                assert_eq!(remaining.len(), 0);
                assert_eq!(message_set.messages.len(), 2);
                assert_eq!(message_set.messages[0].key, Some(b"key".to_vec()));
                assert_eq!(message_set.messages[0].value, Some(b"hello".to_vec()));
                assert_eq!(message_set.messages[1].value, Some(b"world".to_vec()));
                assert_eq!(message_set.messages[0].compression, Compression::None);
            }
            res => panic!("unexpected parse result: {:?}", res),
        }
    }

    #[test]
    fn test_parse_message_rejects_bad_crc() {
        let mut buf = BytesMut::with_capacity(64);

        write_record::<BigEndian>(&mut buf, b"key", b"hello").unwrap();

        let mut corrupted = buf[..].to_vec();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;

        match parse_message_set(&corrupted[..]) {
            IResult::Done(_, message_set) => assert_eq!(message_set.messages.len(), 0),
            res => panic!("unexpected parse result: {:?}", res),
        }
    }
}
