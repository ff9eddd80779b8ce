use crate::error::BufferError;

/// Fixed-capacity ring buffer. The oldest value is overwritten once full.
///
/// Occupancy is tracked with an explicit fill counter, so a stored value that
/// happens to equal the backing default is still counted as data.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    head: usize,
    len: usize,
    dropped: u64,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![T::default(); capacity],
            head: 0,
            len: 0,
            dropped: 0,
        }
    }
}

impl<T: Copy> RingBuffer<T> {
    pub fn put(&mut self, value: T) {
        let cap = self.data.len();
        self.data[self.head] = value;
        self.head = (self.head + 1) % cap;
        if self.len < cap {
            self.len += 1;
        } else {
            self.dropped += 1;
        }
    }

    /// Value at logical `index` (0 = oldest retained), or the newest value
    /// when `index` is `None`.
    pub fn get(&self, index: Option<usize>) -> Result<T, BufferError> {
        if self.len == 0 {
            return Err(BufferError::Empty);
        }
        let index = index.unwrap_or(self.len - 1);
        if index >= self.len {
            return Err(BufferError::OutOfRange {
                index,
                len: self.len,
            });
        }
        Ok(self.data[self.physical(index)])
    }

    /// Retained values, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.data[self.physical(i)])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of values overwritten since the buffer first filled up.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.dropped = 0;
    }

    fn physical(&self, logical: usize) -> usize {
        let cap = self.data.len();
        (self.head + cap - self.len + logical) % cap
    }
}

impl<T: Copy + PartialOrd> RingBuffer<T> {
    /// O(C) scan; recompute periodically, not per sample.
    pub fn min(&self) -> Option<T> {
        self.iter()
            .fold(None, |acc, v| match acc {
                Some(m) if m <= v => Some(m),
                _ => Some(v),
            })
    }

    pub fn max(&self) -> Option<T> {
        self.iter()
            .fold(None, |acc, v| match acc {
                Some(m) if m >= v => Some(m),
                _ => Some(v),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_last_capacity_values_in_order() {
        let cap = 5;
        for extra in [0usize, 1, 3, 5, 12] {
            let mut rb = RingBuffer::<u16>::new(cap);
            let total = cap + extra;
            for v in 0..total {
                rb.put(v as u16);
            }
            let kept: Vec<u16> = rb.iter().collect();
            let expected: Vec<u16> = (extra..total).map(|v| v as u16).collect();
            assert_eq!(kept, expected, "extra={extra}");
            assert_eq!(rb.dropped(), extra as u64);
        }
    }

    #[test]
    fn get_defaults_to_newest() {
        let mut rb = RingBuffer::<u16>::new(3);
        assert_eq!(rb.get(None), Err(BufferError::Empty));
        rb.put(7);
        rb.put(8);
        assert_eq!(rb.get(None), Ok(8));
        assert_eq!(rb.get(Some(0)), Ok(7));
        rb.put(9);
        rb.put(10);
        assert_eq!(rb.get(Some(0)), Ok(8));
        assert_eq!(rb.get(None), Ok(10));
        assert_eq!(
            rb.get(Some(3)),
            Err(BufferError::OutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn zero_valued_samples_count_as_data() {
        let mut rb = RingBuffer::<u16>::new(4);
        rb.put(0);
        assert!(!rb.is_empty());
        assert_eq!(rb.get(None), Ok(0));
        assert_eq!(rb.min(), Some(0));
    }

    #[test]
    fn min_max_track_current_window() {
        let mut rb = RingBuffer::<u16>::new(3);
        assert_eq!(rb.min(), None);
        for v in [50, 10, 40, 30, 20] {
            rb.put(v);
        }
        assert_eq!(rb.min(), Some(20));
        assert_eq!(rb.max(), Some(40));
    }
}
