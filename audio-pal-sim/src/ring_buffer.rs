/// Circular byte buffer backing a simulated audio graph.
///
/// Not synchronized; the owning session serializes access.
///
/// Overflow behavior: drops the oldest bytes.
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Vec<u8>,
    write_index: usize,
    read_index: usize,
    available: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity.max(1)],
            write_index: 0,
            read_index: 0,
            available: 0,
        }
    }

    /// Appends `data`, dropping the oldest bytes on overflow. Returns how
    /// many bytes were dropped.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        let capacity = self.capacity();

        // Only the tail of an oversized write survives.
        let (data, mut dropped) = if data.len() > capacity {
            (&data[data.len() - capacity..], data.len() - capacity)
        } else {
            (data, 0)
        };

        let overflow = (self.available + data.len()).saturating_sub(capacity);
        if overflow > 0 {
            self.read_index = (self.read_index + overflow) % capacity;
            self.available -= overflow;
            dropped += overflow;
        }

        for &byte in data {
            self.buffer[self.write_index] = byte;
            self.write_index = (self.write_index + 1) % capacity;
        }
        self.available += data.len();
        dropped
    }

    /// Moves up to `out.len()` bytes into `out` and returns the count.
    pub fn read_into(&mut self, out: &mut [u8]) -> usize {
        let to_read = out.len().min(self.available);
        let capacity = self.capacity();
        for (i, slot) in out.iter_mut().take(to_read).enumerate() {
            *slot = self.buffer[(self.read_index + i) % capacity];
        }
        self.read_index = (self.read_index + to_read) % capacity;
        self.available -= to_read;
        to_read
    }

    /// Discards up to `count` bytes and returns how many were discarded.
    pub fn discard(&mut self, count: usize) -> usize {
        let count = count.min(self.available);
        self.read_index = (self.read_index + count) % self.capacity();
        self.available -= count;
        count
    }

    pub fn count(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}
