use std::sync::Mutex;
use std::time::Duration;

use bytes::{BigEndian, BytesMut};

use crossbeam_channel::{self, Receiver, Sender};

use errors::Result;
use protocol::{record_size, write_record};

/// One reusable accumulation region for a message set.
///
/// A buffer belongs to exactly one of: the free pool, the ingest path
/// (active), the ready queue, or the sender. It travels between them by
/// value and is reset when the pool takes it back.
pub struct MessageSetBuffer {
    buf: BytesMut,
    capacity: usize,
    records: usize,
}

impl MessageSetBuffer {
    pub fn new(capacity: usize) -> Self {
        MessageSetBuffer {
            buf: BytesMut::with_capacity(capacity),
            capacity: capacity,
            records: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Whether one more record with this key and value still fits.
    pub fn has_room_for(&self, key_len: usize, value_len: usize) -> bool {
        record_size(key_len, value_len) <= self.remaining()
    }

    /// Appends one framed record and bumps the batch counter.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        write_record::<BigEndian>(&mut self.buf, key, value)?;
        self.records += 1;

        Ok(())
    }

    /// The number of records accumulated so far.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.records = 0;
    }
}

/// A bounded pool of free message-set buffers.
///
/// All buffers are allocated up front; the hot path only moves them
/// between owners.
#[derive(Clone)]
pub struct BufferPool {
    tx: Sender<MessageSetBuffer>,
    rx: Receiver<MessageSetBuffer>,
}

impl BufferPool {
    pub fn new(num_buffers: usize, buffer_size: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(num_buffers);

        for _ in 0..num_buffers {
            let _ = tx.send(MessageSetBuffer::new(buffer_size));
        }

        BufferPool { tx: tx, rx: rx }
    }

    /// The process-wide pool shared by every producer that asks for it.
    ///
    /// The first caller sizes the pool; later callers get the same pool
    /// whatever sizes they pass. The flag tells the caller whether this
    /// call created it, so the shared gauge is registered exactly once.
    pub fn shared(num_buffers: usize, buffer_size: usize) -> (BufferPool, bool) {
        let mut shared = SHARED_BUFFERS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match *shared {
            Some(ref pool) => (pool.clone(), false),
            None => {
                info!("creating shared buffer pool of {} x {} bytes",
                      num_buffers,
                      buffer_size);

                let pool = BufferPool::new(num_buffers, buffer_size);
                *shared = Some(pool.clone());

                (pool, true)
            }
        }
    }

    /// Takes a free buffer.
    ///
    /// `timeout_ms < 0` blocks until one is free, `0` never blocks and
    /// `> 0` waits that many milliseconds. `None` means the pool stayed
    /// empty for the whole wait.
    pub fn take(&self, timeout_ms: i64) -> Option<MessageSetBuffer> {
        if timeout_ms < 0 {
            self.rx.recv().ok()
        } else if timeout_ms == 0 {
            self.rx.try_recv().ok()
        } else {
            self.rx
                .recv_timeout(Duration::from_millis(timeout_ms as u64))
                .ok()
        }
    }

    /// Resets the buffer and hands it back.
    pub fn release(&self, mut buffer: MessageSetBuffer) {
        buffer.reset();

        let _ = self.tx.send(buffer);
    }

    /// How many buffers are currently free.
    pub fn free(&self) -> usize {
        self.rx.len()
    }
}

lazy_static! {
    static ref SHARED_BUFFERS: Mutex<Option<BufferPool>> = Mutex::new(None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::RECORD_OVERHEAD;

    #[test]
    fn test_append_and_reset() {
        let mut buffer = MessageSetBuffer::new(4096);

        buffer.append(b"key", b"hello").unwrap();
        buffer.append(b"key", b"world").unwrap();

        assert_eq!(buffer.records(), 2);
        assert_eq!(buffer.len(), 2 * record_size(3, 5));
        assert!(!buffer.is_empty());

        buffer.reset();

        assert_eq!(buffer.records(), 0);
        assert_eq!(buffer.remaining(), 4096);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_exact_fit_boundary() {
        // room for exactly two "hello" records with a 3-byte key
        let mut buffer = MessageSetBuffer::new(2 * (RECORD_OVERHEAD + 3 + 5));

        assert!(buffer.has_room_for(3, 5));
        buffer.append(b"key", b"hello").unwrap();

        assert!(buffer.has_room_for(3, 5));
        buffer.append(b"key", b"world").unwrap();

        assert_eq!(buffer.remaining(), 0);
        assert!(!buffer.has_room_for(3, 0));
        assert!(!buffer.has_room_for(0, 0));
    }

    #[test]
    fn test_pool_take_and_release() {
        let pool = BufferPool::new(2, 64);

        assert_eq!(pool.free(), 2);

        let first = pool.take(0).unwrap();
        let second = pool.take(0).unwrap();
        assert_eq!(pool.free(), 0);

        // empty pool, non-blocking take
        assert!(pool.take(0).is_none());
        // and a bounded wait
        assert!(pool.take(10).is_none());

        pool.release(first);
        assert_eq!(pool.free(), 1);

        pool.release(second);
        assert_eq!(pool.free(), 2);
    }

    #[test]
    fn test_pool_release_resets() {
        let pool = BufferPool::new(1, 4096);

        let mut buffer = pool.take(0).unwrap();
        buffer.append(b"key", b"hello").unwrap();
        pool.release(buffer);

        let buffer = pool.take(0).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.remaining(), 4096);
    }

    #[test]
    fn test_shared_pool_is_created_once() {
        let (first, created) = BufferPool::shared(3, 64);
        let (second, created_again) = BufferPool::shared(7, 1024);

        assert!(created || !created_again);

        // both handles drain the same buffers
        let taken = first.take(0).unwrap();
        let before = second.free();
        first.release(taken);
        assert_eq!(second.free(), before + 1);
    }
}
