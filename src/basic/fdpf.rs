use tracing::trace;

use super::{
    classify::{BusClassification, StateIndex},
    error::{PowerFlowError, Result},
    mismatch::{Mismatch, PolarVoltage, power_mismatch},
    network::{Injection, NetworkModel},
    solver::{DirectSolver, Factorization, Solve},
    system::{
        admittance::NodalMatrix,
        decoupled::{DecoupledMatrices, DecoupledVariant},
    },
};

/// Fast-decoupled state: `B'` and `B''` factorized once at construction.
pub struct FastDecoupled {
    variant: DecoupledVariant,
    matrices: DecoupledMatrices,
    p_solver: DirectSolver,
    q_solver: DirectSolver,
}

impl FastDecoupled {
    pub fn new(
        net: &NetworkModel,
        class: &BusClassification,
        index: &StateIndex,
        variant: DecoupledVariant,
        factorization: Factorization,
    ) -> Result<Self> {
        let matrices = DecoupledMatrices::build(net, class, index, variant);
        let mut p_solver = DirectSolver::new(factorization);
        let mut q_solver = DirectSolver::new(factorization);
        p_solver
            .factorize(&matrices.b_p)
            .map_err(|e| PowerFlowError::singular(format!("B': {e}")))?;
        q_solver
            .factorize(&matrices.b_pp)
            .map_err(|e| PowerFlowError::singular(format!("B'': {e}")))?;
        Ok(Self {
            variant,
            matrices,
            p_solver,
            q_solver,
        })
    }

    #[inline(always)]
    pub fn variant(&self) -> DecoupledVariant {
        self.variant
    }

    #[inline(always)]
    pub fn matrices(&self) -> &DecoupledMatrices {
        &self.matrices
    }

    /// One iteration: an angle half-step on `B'`, then, unless the system has
    /// already converged, a magnitude half-step on `B''`.
    pub fn step(
        &mut self,
        y: &NodalMatrix,
        index: &StateIndex,
        spec: &Injection,
        tol: f64,
        v: &mut PolarVoltage,
        mis: &Mismatch,
    ) -> Result<Mismatch> {
        let mut dva: Vec<f64> = index
            .angle_buses
            .iter()
            .zip(&mis.active)
            .map(|(&bus, dp)| dp / v.magnitude[bus])
            .collect();
        self.p_solver
            .solve_in_place(&mut dva)
            .map_err(PowerFlowError::singular)?;
        for (&bus, d) in index.angle_buses.iter().zip(&dva) {
            v.angle[bus] -= d;
        }

        let mis = power_mismatch(y, v, index, spec);
        if mis.max() < tol || index.n_magnitude() == 0 {
            trace!("fast-decoupled angle half-step converged");
            return Ok(mis);
        }

        let mut dvm: Vec<f64> = index
            .magnitude_buses
            .iter()
            .zip(&mis.reactive)
            .map(|(&bus, dq)| dq / v.magnitude[bus])
            .collect();
        self.q_solver
            .solve_in_place(&mut dvm)
            .map_err(PowerFlowError::singular)?;
        for (&bus, d) in index.magnitude_buses.iter().zip(&dvm) {
            v.magnitude[bus] -= d;
        }
        Ok(power_mismatch(y, v, index, spec))
    }
}
