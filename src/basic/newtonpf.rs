#[cfg(feature = "parallel")]
use rayon::prelude::*;

use nalgebra_sparse::{CooMatrix, CscMatrix};
use tracing::trace;

use super::{
    classify::StateIndex,
    error::{PowerFlowError, Result},
    mismatch::{Mismatch, PolarVoltage, power_mismatch},
    network::Injection,
    solver::{DirectSolver, Factorization, Solve},
    sparse::slice::{entry_position, split_by_offsets},
    system::admittance::NodalMatrix,
};

/// Number of Jacobian entries one admittance entry contributes to.
const PARTIALS: usize = 4;

/// Newton-Raphson state: a Jacobian with a fixed pattern and its factorization.
///
/// The unknowns are the angles of all non-slack buses followed by the
/// magnitudes of all demand buses. Each stored entry `Y_ij` maps to at most
/// four Jacobian entries `∂P_i/∂θ_j`, `∂P_i/∂V_j`, `∂Q_i/∂θ_j` and
/// `∂Q_i/∂V_j`; `slots` remembers where they live in the Jacobian values.
pub struct NewtonRaphson {
    jacobian: CscMatrix<f64>,
    slots: Vec<[Option<usize>; PARTIALS]>,
    partials: Vec<f64>,
    solver: DirectSolver,
}

impl NewtonRaphson {
    /// Builds the Jacobian pattern for the admittance pattern of `y` and the
    /// numbering in `index`.
    pub fn new(y: &NodalMatrix, index: &StateIndex, factorization: Factorization) -> Self {
        let n = index.len();
        let targets = |i: usize, j: usize| -> [Option<(usize, usize)>; PARTIALS] {
            let (pi, qi) = (index.angle[i], index.magnitude_row(i));
            let (tj, vj) = (index.angle[j], index.magnitude_row(j));
            [
                pi.zip(tj),
                pi.zip(vj),
                qi.zip(tj),
                qi.zip(vj),
            ]
        };

        let mut coo = CooMatrix::new(n, n);
        for i in 0..y.nbus() {
            for &j in y.row_neighbors(i) {
                for (r, c) in targets(i, j).into_iter().flatten() {
                    coo.push(r, c, 0.0);
                }
            }
        }
        let jacobian = CscMatrix::from(&coo);

        let mut slots = Vec::with_capacity(y.y_bus_t().nnz());
        for i in 0..y.nbus() {
            for &j in y.row_neighbors(i) {
                slots.push(targets(i, j).map(|t| t.and_then(|(r, c)| entry_position(&jacobian, r, c))));
            }
        }

        Self {
            partials: vec![0.0; PARTIALS * slots.len()],
            jacobian,
            slots,
            solver: DirectSolver::new(factorization),
        }
    }

    #[inline(always)]
    pub fn jacobian(&self) -> &CscMatrix<f64> {
        &self.jacobian
    }

    /// Refreshes the Jacobian values at the voltage `v`.
    pub fn update_jacobian(&mut self, y: &NodalMatrix, v: &PolarVoltage) {
        fill_partials(&mut self.partials, y, v);
        let values = self.jacobian.values_mut();
        for (slot, partial) in self.slots.iter().zip(self.partials.chunks_exact(PARTIALS)) {
            for (pos, d) in slot.iter().zip(partial) {
                if let Some(pos) = pos {
                    values[*pos] = *d;
                }
            }
        }
    }

    /// Performs one Newton step from the mismatch `mis` and returns the new mismatch.
    pub fn step(
        &mut self,
        y: &NodalMatrix,
        index: &StateIndex,
        spec: &Injection,
        v: &mut PolarVoltage,
        mis: &Mismatch,
    ) -> Result<Mismatch> {
        self.update_jacobian(y, v);
        let mut dx = mis.to_state();
        self.solver
            .solve(&self.jacobian, &mut dx)
            .map_err(PowerFlowError::singular)?;
        let (dva, dvm) = dx.split_at(index.n_angle());
        for (&bus, d) in index.angle_buses.iter().zip(dva) {
            v.angle[bus] -= d;
        }
        for (&bus, d) in index.magnitude_buses.iter().zip(dvm) {
            v.magnitude[bus] -= d;
        }
        trace!(norm = dx.iter().fold(0.0f64, |m, x| m.max(x.abs())), "newton increment");
        Ok(power_mismatch(y, v, index, spec))
    }
}

/// Writes the four partials of every admittance entry of row `bus` into `out`.
#[inline(always)]
fn bus_partials(out: &mut [f64], y: &NodalMatrix, v: &PolarVoltage, bus: usize) {
    let (vm, va) = (&v.magnitude, &v.angle);
    let range = y.row_range(bus);
    let (g, b) = (&y.g()[range.clone()], &y.b()[range]);
    let vi = vm[bus];
    let (mut p_sum, mut q_sum) = (0.0, 0.0);
    let mut diag = None;
    for (k, &j) in y.row_neighbors(bus).iter().enumerate() {
        if j == bus {
            diag = Some(k);
            continue;
        }
        let (s, c) = (va[bus] - va[j]).sin_cos();
        let re = g[k] * c + b[k] * s;
        let im = g[k] * s - b[k] * c;
        p_sum += vm[j] * re;
        q_sum += vm[j] * im;
        let d = &mut out[PARTIALS * k..PARTIALS * (k + 1)];
        d[0] = vi * vm[j] * im;
        d[1] = vi * re;
        d[2] = -vi * vm[j] * re;
        d[3] = vi * im;
    }
    if let Some(k) = diag {
        let d = &mut out[PARTIALS * k..PARTIALS * (k + 1)];
        d[0] = -vi * q_sum;
        d[1] = p_sum + 2.0 * vi * g[k];
        d[2] = vi * p_sum;
        d[3] = q_sum - 2.0 * vi * b[k];
    }
}

#[cfg(feature = "parallel")]
fn fill_partials(partials: &mut [f64], y: &NodalMatrix, v: &PolarVoltage) {
    split_by_offsets(partials, y.y_bus_t().col_offsets(), PARTIALS)
        .into_par_iter()
        .enumerate()
        .for_each(|(bus, out)| bus_partials(out, y, v, bus));
}

#[cfg(not(feature = "parallel"))]
fn fill_partials(partials: &mut [f64], y: &NodalMatrix, v: &PolarVoltage) {
    split_by_offsets(partials, y.y_bus_t().col_offsets(), PARTIALS)
        .into_iter()
        .enumerate()
        .for_each(|(bus, out)| bus_partials(out, y, v, bus));
}
