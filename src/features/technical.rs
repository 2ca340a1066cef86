//! Streaming technical indicators
//!
//! Each indicator consumes one close at a time and yields `Some(value)`
//! only once its trailing window is complete.

use super::buffer::RingBuffer;

/// Simple Moving Average over the trailing `period` values
#[derive(Debug, Clone)]
pub struct Sma {
    window: RingBuffer,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            window: RingBuffer::new(period),
            sum: 0.0,
        }
    }

    /// Feed the next value
    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.sum += value;
        if let Some(evicted) = self.window.push(value) {
            self.sum -= evicted;
        }

        if self.window.is_full() {
            Some(self.sum / self.window.capacity() as f64)
        } else {
            None
        }
    }
}

/// Close-to-close simple return
#[derive(Debug, Clone, Default)]
pub struct Returns {
    previous: Option<f64>,
}

impl Returns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let result = self.previous.map(|prev| (close - prev) / prev);
        self.previous = Some(close);
        result
    }
}

/// Relative Strength Index using simple means of gains and losses
///
/// `rsi = 100 - 100 / (1 + up / (down + epsilon))` where `up` and `down`
/// are the means of the clipped positive and negative close deltas over
/// the trailing `period` deltas. A full window needs `period + 1` closes.
#[derive(Debug, Clone)]
pub struct Rsi {
    gains: RingBuffer,
    losses: RingBuffer,
    gain_sum: f64,
    loss_sum: f64,
    previous: Option<f64>,
    epsilon: f64,
}

impl Rsi {
    pub fn new(period: usize, epsilon: f64) -> Self {
        Self {
            gains: RingBuffer::new(period),
            losses: RingBuffer::new(period),
            gain_sum: 0.0,
            loss_sum: 0.0,
            previous: None,
            epsilon,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let previous = self.previous.replace(close)?;
        let delta = close - previous;
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);

        self.gain_sum += gain;
        self.loss_sum += loss;
        if let Some(evicted) = self.gains.push(gain) {
            self.gain_sum -= evicted;
        }
        if let Some(evicted) = self.losses.push(loss) {
            self.loss_sum -= evicted;
        }
        // Sums of non-negative terms; cancellation must not push them below zero
        self.gain_sum = self.gain_sum.max(0.0);
        self.loss_sum = self.loss_sum.max(0.0);

        if !self.gains.is_full() {
            return None;
        }

        let period = self.gains.capacity() as f64;
        let up = self.gain_sum / period;
        let down = self.loss_sum / period;
        Some(100.0 - 100.0 / (1.0 + up / (down + self.epsilon)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let mut sma = Sma::new(3);
        let result: Vec<Option<f64>> = [1.0, 2.0, 3.0, 4.0, 5.0]
            .iter()
            .map(|p| sma.update(*p))
            .collect();

        assert!(result[0].is_none());
        assert!(result[1].is_none());
        assert!((result[2].unwrap() - 2.0).abs() < 1e-10);
        assert!((result[3].unwrap() - 3.0).abs() < 1e-10);
        assert!((result[4].unwrap() - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_returns() {
        let mut returns = Returns::new();
        assert_eq!(returns.update(100.0), None);
        assert!((returns.update(110.0).unwrap() - 0.1).abs() < 1e-12);
        assert!((returns.update(99.0).unwrap() + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_window() {
        let prices = [
            44.0, 44.25, 44.5, 43.75, 44.5, 44.25, 44.0, 43.5, 43.75, 44.0, 44.5, 44.25, 44.75,
            45.0, 45.5,
        ];
        let mut rsi = Rsi::new(14, 1e-9);
        let result: Vec<Option<f64>> = prices.iter().map(|p| rsi.update(*p)).collect();

        assert!(result[..14].iter().all(Option::is_none));
        let value = result[14].unwrap();

        // 14 deltas: gains sum 3.5, losses sum 2.0
        let expected = 100.0 - 100.0 / (1.0 + (3.5 / 14.0) / (2.0 / 14.0 + 1e-9));
        assert!((value - expected).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn test_rsi_monotonic_rise_saturates() {
        let mut rsi = Rsi::new(14, 1e-9);
        let last = (0..20).map(|i| rsi.update(100.0 + i as f64)).last().flatten();
        let value = last.unwrap();
        assert!(value > 99.99 && value <= 100.0);
    }

    #[test]
    fn test_rsi_flat_series_is_zero() {
        let mut rsi = Rsi::new(14, 1e-9);
        let last = (0..15).map(|_| rsi.update(50.0)).last().flatten();
        assert_eq!(last, Some(0.0));
    }
}
