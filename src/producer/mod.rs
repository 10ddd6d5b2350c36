mod config;
mod buffer;
mod metrics;
mod sender;
mod builder;
mod producer;

pub use self::buffer::{BufferPool, MessageSetBuffer};
pub use self::builder::ProducerBuilder;
pub use self::config::{DEFAULT_MESSAGE_BUFFER_SIZE, DEFAULT_NUM_BUFFERS,
                       DEFAULT_SEND_BUFFER_SIZE, ProducerConfig};
pub use self::producer::Producer;
