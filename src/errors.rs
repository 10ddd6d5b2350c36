error_chain!{
    foreign_links {
        IoError(::std::io::Error);
        ParseError(::nom::ErrorKind);
    }

    errors {
        CodecError(reason: &'static str) {
            description("codec error")
            display("codec error: {}", reason)
        }
        CompressionOverflow {
            description("compressed payload does not fit the send buffer")
        }
        UnsupportedCompression(codec: String) {
            description("unsupported compression codec")
            display("unsupported compression codec: {}", codec)
        }
        CorrelationMismatch(expected: i32, actual: i32) {
            description("response correlation id does not match the request")
            display("expected correlation id {}, broker answered with {}", expected, actual)
        }
        BrokerFailure(code: ::protocol::KafkaCode) {
            description("broker reported an error")
            display("broker reported an error: {:?}", code)
        }
        RecordTooLarge(size: usize, capacity: usize) {
            description("record does not fit a message-set buffer")
            display("record of {} bytes does not fit a message-set buffer of {}", size, capacity)
        }
        UnknownTopic(topic: String) {
            description("metadata has no partitions for the topic")
            display("metadata has no partitions for topic {}", topic)
        }
        NoLeaderForPartition(topic: String, partition: i32) {
            description("partition has no leader")
            display("no leader for partition {} of topic {}", partition, topic)
        }
        NoBrokerAvailable {
            description("no broker answered a metadata request")
        }
        InvalidBrokerAddr(addr: String) {
            description("broker address does not resolve")
            display("broker address {} does not resolve", addr)
        }
    }
}
