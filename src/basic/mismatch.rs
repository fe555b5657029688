#[cfg(feature = "parallel")]
use rayon::prelude::*;

use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{classify::StateIndex, network::Injection, system::admittance::NodalMatrix};

/// Bus voltages in polar form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarVoltage {
    pub magnitude: Vec<f64>,
    pub angle: Vec<f64>,
}

impl PolarVoltage {
    pub fn to_complex(&self) -> Vec<Complex64> {
        self.magnitude
            .iter()
            .zip(&self.angle)
            .map(|(&vm, &va)| Complex64::from_polar(vm, va))
            .collect()
    }

    pub fn from_complex(v: &[Complex64]) -> Self {
        let (magnitude, angle) = v.iter().map(|v| v.to_polar()).unzip();
        Self { magnitude, angle }
    }

    pub fn to_dvector(&self) -> DVector<Complex64> {
        DVector::from_vec(self.to_complex())
    }
}

/// Power mismatch (computed minus specified) in state numbering.
///
/// `active` holds one entry per angle unknown, `reactive` one per magnitude unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mismatch {
    pub active: Vec<f64>,
    pub reactive: Vec<f64>,
}

impl Mismatch {
    #[inline(always)]
    pub fn max_active(&self) -> f64 {
        self.active.iter().fold(0.0, |m, x| m.max(x.abs()))
    }

    #[inline(always)]
    pub fn max_reactive(&self) -> f64 {
        self.reactive.iter().fold(0.0, |m, x| m.max(x.abs()))
    }

    #[inline(always)]
    pub fn max(&self) -> f64 {
        self.max_active().max(self.max_reactive())
    }

    /// Stacks `[ΔP; ΔQ]` into one vector.
    pub fn to_state(&self) -> Vec<f64> {
        let mut f = Vec::with_capacity(self.active.len() + self.reactive.len());
        f.extend_from_slice(&self.active);
        f.extend_from_slice(&self.reactive);
        f
    }
}

/// Computed active and reactive injection at `bus`.
#[inline(always)]
pub(crate) fn bus_power(y: &NodalMatrix, v: &PolarVoltage, bus: usize) -> (f64, f64) {
    let (vm, va) = (&v.magnitude, &v.angle);
    let range = y.row_range(bus);
    let (g, b) = (&y.g()[range.clone()], &y.b()[range]);
    let (mut p, mut q) = (0.0, 0.0);
    for (k, &j) in y.row_neighbors(bus).iter().enumerate() {
        let (s, c) = (va[bus] - va[j]).sin_cos();
        p += vm[j] * (g[k] * c + b[k] * s);
        q += vm[j] * (g[k] * s - b[k] * c);
    }
    (vm[bus] * p, vm[bus] * q)
}

/// Evaluates `ΔP` at every non-slack bus and `ΔQ` at every demand bus.
#[cfg(feature = "parallel")]
pub(crate) fn power_mismatch(
    y: &NodalMatrix,
    v: &PolarVoltage,
    index: &StateIndex,
    spec: &Injection,
) -> Mismatch {
    let active = index
        .angle_buses
        .par_iter()
        .map(|&i| bus_power(y, v, i).0 - spec.active[i])
        .collect();
    let reactive = index
        .magnitude_buses
        .par_iter()
        .map(|&i| bus_power(y, v, i).1 - spec.reactive[i])
        .collect();
    Mismatch { active, reactive }
}

/// Evaluates `ΔP` at every non-slack bus and `ΔQ` at every demand bus.
#[cfg(not(feature = "parallel"))]
pub(crate) fn power_mismatch(
    y: &NodalMatrix,
    v: &PolarVoltage,
    index: &StateIndex,
    spec: &Injection,
) -> Mismatch {
    let active = index
        .angle_buses
        .iter()
        .map(|&i| bus_power(y, v, i).0 - spec.active[i])
        .collect();
    let reactive = index
        .magnitude_buses
        .iter()
        .map(|&i| bus_power(y, v, i).1 - spec.reactive[i])
        .collect();
    Mismatch { active, reactive }
}
