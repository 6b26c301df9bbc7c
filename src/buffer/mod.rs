//! Bounded pool of reusable packet buffers.
//!
//! Producers encode packets into buffers taken from the pool and commit
//! them; a single consumer drains committed buffers in FIFO order and
//! returns them. A buffer is owned by exactly one party at a time: the pool
//! (free or readable-queued), a producer between [`reserve`] and
//! [`commit`]/[`release`], or the consumer between a dequeue and
//! [`mark_read`]. Moving [`PacketBuffer`] by value makes that discipline a
//! compile-time property rather than a convention.
//!
//! [`reserve`]: BufferManager::reserve
//! [`commit`]: BufferManager::commit
//! [`release`]: BufferManager::release
//! [`mark_read`]: BufferManager::mark_read


use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::{Error, Result};

/// Default number of buffers in the pool.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default capacity of each buffer, in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// A fixed-capacity byte slab with a committed length.
#[derive(Debug)]
pub struct PacketBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl PacketBuffer {
    fn new(capacity: usize) -> PacketBuffer {
        PacketBuffer {
            data: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes committed into this buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The committed bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The whole writable slab, regardless of the committed length.
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

struct Pool {
    free: Vec<PacketBuffer>,
    readable: VecDeque<PacketBuffer>,
    stopped: bool,
}

/// Bounded pool supporting concurrent producers and a single consumer.
pub struct BufferManager {
    pool: Mutex<Pool>,
    readable_posted: Condvar,
    pool_size: usize,
    buffer_capacity: usize,
}

impl BufferManager {
    pub fn new(pool_size: usize, buffer_capacity: usize) -> BufferManager {
        BufferManager {
            pool: Mutex::new(Pool {
                free: (0..pool_size).map(|_| PacketBuffer::new(buffer_capacity)).collect(),
                readable: VecDeque::with_capacity(pool_size),
                stopped: false,
            }),
            readable_posted: Condvar::new(),
            pool_size,
            buffer_capacity,
        }
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Takes a free buffer for writing.
    ///
    /// The granted capacity is always the full buffer capacity. With no free
    /// buffer, the oldest committed-but-unflushed buffer is reclaimed and
    /// its content dropped (delivery is lossy under backpressure); the call
    /// fails with [`Error::BufferExhaustion`] only when every buffer is held
    /// by a writer, or when `min_bytes` exceeds what a buffer can ever hold.
    pub fn reserve(&self, min_bytes: usize) -> Result<PacketBuffer> {
        if min_bytes > self.buffer_capacity {
            return Err(Error::BufferExhaustion {
                requested: min_bytes,
            });
        }
        let mut pool = self.pool.lock().unwrap();
        if let Some(buffer) = pool.free.pop() {
            return Ok(buffer);
        }
        if let Some(mut buffer) = pool.readable.pop_front() {
            log::warn!("buffer pool saturated, dropping the oldest unflushed buffer");
            buffer.len = 0;
            return Ok(buffer);
        }
        Err(Error::BufferExhaustion {
            requested: min_bytes,
        })
    }

    /// Publishes `bytes_written` bytes of `buffer` to the consumer.
    pub fn commit(&self, mut buffer: PacketBuffer, bytes_written: usize) -> Result<()> {
        if bytes_written > buffer.capacity() {
            return Err(Error::InvalidArgument(format!(
                "committed {bytes_written} bytes into a buffer of {}",
                buffer.capacity()
            )));
        }
        buffer.len = bytes_written;
        let mut pool = self.pool.lock().unwrap();
        pool.readable.push_back(buffer);
        drop(pool);
        self.readable_posted.notify_one();
        Ok(())
    }

    /// Returns a writing buffer to the free list without publishing it.
    pub fn release(&self, mut buffer: PacketBuffer) {
        buffer.len = 0;
        self.pool.lock().unwrap().free.push(buffer);
    }

    /// Dequeues the oldest committed buffer, if any.
    pub fn get_readable_buffer(&self) -> Option<PacketBuffer> {
        self.pool.lock().unwrap().readable.pop_front()
    }

    /// Blocks until a committed buffer is available or the manager is
    /// stopped; `None` means stopped.
    pub fn wait_for_readable_buffer(&self) -> Option<PacketBuffer> {
        let mut pool = self.pool.lock().unwrap();
        loop {
            if let Some(buffer) = pool.readable.pop_front() {
                return Some(buffer);
            }
            if pool.stopped {
                return None;
            }
            pool = self.readable_posted.wait(pool).unwrap();
        }
    }

    /// Returns a drained buffer to the free list.
    pub fn mark_read(&self, mut buffer: PacketBuffer) {
        buffer.len = 0;
        self.pool.lock().unwrap().free.push(buffer);
    }

    /// Wakes the consumer out of [`wait_for_readable_buffer`].
    ///
    /// [`wait_for_readable_buffer`]: BufferManager::wait_for_readable_buffer
    pub fn stop(&self) {
        self.pool.lock().unwrap().stopped = true;
        self.readable_posted.notify_all();
    }

    /// Re-arms the pool after a [`stop`], so a restarted consumer can block
    /// again.
    ///
    /// [`stop`]: BufferManager::stop
    pub fn resume(&self) {
        self.pool.lock().unwrap().stopped = false;
    }

    /// Rebuilds every buffer as free.
    ///
    /// Only valid with no producer or consumer active; buffers still held by
    /// an owner are replaced, and returning them afterwards would grow the
    /// pool past its bound.
    pub fn reset(&self) {
        let mut pool = self.pool.lock().unwrap();
        pool.readable.clear();
        pool.free = (0..self.pool_size)
            .map(|_| PacketBuffer::new(self.buffer_capacity))
            .collect();
        pool.stopped = false;
    }
}

impl Default for BufferManager {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE, DEFAULT_BUFFER_CAPACITY)
    }
}
