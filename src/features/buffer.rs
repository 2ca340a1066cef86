//! Fixed-capacity ring buffer backing the rolling indicators.

/// Circular buffer of `f64` with a fixed capacity.
///
/// Once full, every push overwrites the oldest value and hands it back so
/// the caller can keep running aggregates in O(1).
#[derive(Debug, Clone)]
pub struct RingBuffer {
    slots: Vec<f64>,
    head: usize,
    len: usize,
}

impl RingBuffer {
    /// Create an empty buffer holding at most `capacity` values.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            slots: vec![0.0; capacity],
            head: 0,
            len: 0,
        }
    }

    /// Append a value, returning the evicted oldest value when full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let capacity = self.slots.len();
        if self.len < capacity {
            let idx = (self.head + self.len) % capacity;
            self.slots[idx] = value;
            self.len += 1;
            None
        } else {
            let evicted = std::mem::replace(&mut self.slots[self.head], value);
            self.head = (self.head + 1) % capacity;
            Some(evicted)
        }
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_then_evict() {
        let mut buffer = RingBuffer::new(3);
        assert!(!buffer.is_full());

        assert_eq!(buffer.push(1.0), None);
        assert_eq!(buffer.push(2.0), None);
        assert_eq!(buffer.push(3.0), None);
        assert!(buffer.is_full());

        assert_eq!(buffer.push(4.0), Some(1.0));
        assert_eq!(buffer.push(5.0), Some(2.0));
        assert_eq!(buffer.push(6.0), Some(3.0));
        assert_eq!(buffer.capacity(), 3);
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_panics() {
        RingBuffer::new(0);
    }
}
