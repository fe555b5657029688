use serde::{Deserialize, Serialize};

use super::mismatch::Mismatch;

/// Default iteration cap.
pub const DEFAULT_MAX_IT: usize = 100;
/// Default mismatch tolerance in per-unit.
pub const DEFAULT_TOL: f64 = 1e-8;

/// Tracks the mismatch statistic and iteration count of one solve.
///
/// A solve has converged once `max(|ΔP|, |ΔQ|)` drops below `tolerance`,
/// and is exhausted once `iterations` reaches `max_iterations`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceMonitor {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub iterations: usize,
    pub max_active: f64,
    pub max_reactive: f64,
}

impl Default for ConvergenceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_TOL, DEFAULT_MAX_IT)
    }
}

impl ConvergenceMonitor {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
            iterations: 0,
            max_active: f64::INFINITY,
            max_reactive: f64::INFINITY,
        }
    }

    /// Stores the statistic of `mis` without counting an iteration.
    pub fn observe(&mut self, mis: &Mismatch) {
        self.max_active = mis.max_active();
        self.max_reactive = mis.max_reactive();
    }

    /// Counts one iteration that ended with the mismatch `mis`.
    pub fn record(&mut self, mis: &Mismatch) {
        self.iterations += 1;
        self.observe(mis);
    }

    /// Starts counting from zero again, keeping the last statistic.
    pub fn restart(&mut self) {
        self.iterations = 0;
    }

    #[inline(always)]
    pub fn statistic(&self) -> f64 {
        self.max_active.max(self.max_reactive)
    }

    #[inline(always)]
    pub fn converged(&self) -> bool {
        self.statistic() < self.tolerance
    }

    #[inline(always)]
    pub fn exhausted(&self) -> bool {
        self.iterations >= self.max_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_tracks_statistic() {
        let mut m = ConvergenceMonitor::new(1e-3, 2);
        assert!(!m.converged());
        m.observe(&Mismatch {
            active: vec![0.5, -0.2],
            reactive: vec![0.1],
        });
        assert_eq!(m.iterations, 0);
        assert_eq!(m.statistic(), 0.5);

        m.record(&Mismatch {
            active: vec![1e-4],
            reactive: vec![-2e-4],
        });
        assert_eq!(m.iterations, 1);
        assert_eq!(m.max_reactive, 2e-4);
        assert!(m.converged());
        assert!(!m.exhausted());

        m.record(&Mismatch::default());
        assert!(m.exhausted());
        m.restart();
        assert!(!m.exhausted());
        assert!(m.converged());
    }

    #[test]
    fn test_empty_mismatch_is_converged() {
        let mut m = ConvergenceMonitor::default();
        m.observe(&Mismatch::default());
        assert!(m.converged());
    }
}
