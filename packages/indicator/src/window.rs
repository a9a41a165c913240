//! Trailing moving average of raw cost values.

use std::collections::VecDeque;

/// Maximum number of dates averaged by the cost estimate.
pub const COST_WINDOW_SIZE: usize = 9;

/// FIFO window of the most recent raw cost values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostWindow {
    values: VecDeque<f64>,
}

impl CostWindow {
    /// Appends `value`, evicting the oldest once the window is full, and
    /// returns the new mean.
    pub fn push(&mut self, value: f64) -> f64 {
        self.values.push_back(value);
        if self.values.len() > COST_WINDOW_SIZE {
            self.values.pop_front();
        }
        self.mean().unwrap_or_default()
    }

    /// Arithmetic mean of the window. `None` when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Number of values currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_stabilizes_at_nine_and_evicts_oldest() {
        let mut window = CostWindow::default();
        let mut last = 0.0;
        for value in 1..=10 {
            last = window.push(f64::from(value));
        }
        assert_eq!(window.len(), COST_WINDOW_SIZE);
        // Mean of 2..=10.
        assert!((last - 6.0).abs() < 1e-12);
    }

    #[test]
    fn partial_window_averages_what_it_has() {
        let mut window = CostWindow::default();
        assert!(window.mean().is_none());
        window.push(1.0);
        let mean = window.push(3.0);
        assert!((mean - 2.0).abs() < 1e-12);
    }
}
