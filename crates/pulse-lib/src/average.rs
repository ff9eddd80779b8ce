/// Windowed mean with O(1) updates.
#[derive(Debug, Clone)]
pub struct RollingAverage {
    buffer: Vec<f64>,
    cursor: usize,
    sum: f64,
    count: usize,
}

impl RollingAverage {
    pub fn new(window: usize) -> Self {
        Self {
            buffer: vec![0.0; window.max(1)],
            cursor: 0,
            sum: 0.0,
            count: 0,
        }
    }

    /// Push `value`, evicting the oldest once the window is full, and return
    /// the new average.
    pub fn update(&mut self, value: f64) -> f64 {
        let old = self.buffer[self.cursor];
        self.sum += value - old;
        self.buffer[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.buffer.len();
        self.count = (self.count + 1).min(self.buffer.len());
        self.sum / self.count as f64
    }

    /// Current average, `None` until the first update.
    pub fn get(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn window(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|v| *v = 0.0);
        self.cursor = 0;
        self.sum = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_window_uses_all_values() {
        let mut avg = RollingAverage::new(10);
        assert_eq!(avg.get(), None);
        assert_eq!(avg.update(2.0), 2.0);
        assert_eq!(avg.update(4.0), 3.0);
        assert_eq!(avg.update(9.0), 5.0);
        assert_eq!(avg.count(), 3);
    }

    #[test]
    fn full_window_uses_last_values() {
        let mut avg = RollingAverage::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            avg.update(v);
        }
        assert_eq!(avg.get(), Some(4.0));
        assert_eq!(avg.count(), 3);
    }

    #[test]
    fn running_sum_does_not_drift() {
        let window = 40;
        let mut avg = RollingAverage::new(window);
        let mut history = Vec::new();
        let mut x: u64 = 12345;
        for _ in 0..10_000 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let value = (x >> 33) as f64 / (1u64 << 31) as f64;
            history.push(value);
            avg.update(value);
        }
        let tail = &history[history.len() - window..];
        let expected = tail.iter().sum::<f64>() / window as f64;
        let actual = avg.get().unwrap();
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }
}
