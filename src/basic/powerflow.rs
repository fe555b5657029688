use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    classify::{BusClassification, StateIndex, classify_buses},
    convergence::{ConvergenceMonitor, DEFAULT_MAX_IT, DEFAULT_TOL},
    error::{PowerFlowError, Result},
    fdpf::FastDecoupled,
    gausspf::GaussSeidel,
    mismatch::{Mismatch, PolarVoltage, power_mismatch},
    network::{BusType, Injection, NetworkModel},
    newtonpf::NewtonRaphson,
    post_processing::{CurrentReport, PowerReport, current_report, power_report},
    solver::Factorization,
    system::{admittance::NodalMatrix, decoupled::DecoupledVariant},
};

/// Iterative method driving a [`PowerFlow`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    #[default]
    NewtonRaphson,
    FastDecoupledBX,
    FastDecoupledXB,
    GaussSeidel,
}

/// Power flow configuration options: iteration cap, tolerance and the
/// factorization used for the linear systems.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerFlowConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_it: Option<usize>, // Maximum number of iterations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tol: Option<f64>, // Tolerance for convergence
    #[serde(default)]
    pub factorization: Factorization,
}

impl PowerFlowConfig {
    #[inline(always)]
    pub fn max_it(&self) -> usize {
        self.max_it.unwrap_or(DEFAULT_MAX_IT)
    }

    #[inline(always)]
    pub fn tol(&self) -> f64 {
        self.tol.unwrap_or(DEFAULT_TOL)
    }
}

/// Outcome of [`PowerFlow::solve`]: final voltages, iteration count and
/// convergence status.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerFlowResult {
    pub v: DVector<Complex64>, // Final voltage vector
    pub iterations: usize,     // Number of iterations taken
    pub converged: bool,       // Convergence status
    pub max_active: f64,
    pub max_reactive: f64,
}

/// Voltage of one bus in polar form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusVoltage {
    pub magnitude: f64,
    pub angle: f64,
}

pub(super) enum MethodState {
    Newton(NewtonRaphson),
    Decoupled(FastDecoupled),
    Seidel(GaussSeidel),
}

impl MethodState {
    pub(super) fn new(
        method: Method,
        net: &NetworkModel,
        class: &BusClassification,
        index: &StateIndex,
        y: &NodalMatrix,
        v: &PolarVoltage,
        factorization: Factorization,
    ) -> Result<Self> {
        let fd = |variant| FastDecoupled::new(net, class, index, variant, factorization);
        Ok(match method {
            Method::NewtonRaphson => Self::Newton(NewtonRaphson::new(y, index, factorization)),
            Method::FastDecoupledBX => Self::Decoupled(fd(DecoupledVariant::BX)?),
            Method::FastDecoupledXB => Self::Decoupled(fd(DecoupledVariant::XB)?),
            Method::GaussSeidel => Self::Seidel(GaussSeidel::new(class, v)),
        })
    }
}

/// Starting voltages: generator and slack buses take the setpoint of their
/// first in-service generator, every other bus its last known value.
pub(super) fn initial_voltage(net: &NetworkModel, class: &BusClassification) -> PolarVoltage {
    let mut v = PolarVoltage {
        magnitude: net.buses.iter().map(|b| b.magnitude).collect(),
        angle: net.buses.iter().map(|b| b.angle).collect(),
    };
    apply_setpoints(net, class, &mut v);
    v
}

/// Holds generator and slack magnitudes at their setpoints.
pub(super) fn apply_setpoints(net: &NetworkModel, class: &BusClassification, v: &mut PolarVoltage) {
    for bus in 0..net.bus_count() {
        if class.bus_type(bus) == BusType::Demand {
            continue;
        }
        if let Some(g) = net.first_generator(bus) {
            v.magnitude[bus] = net.generators[g].magnitude;
        }
    }
}

/// A live power flow: the network, its admittance model and the state of
/// one iterative method.
///
/// The handle owns a private copy of the network which only
/// [`PowerFlow::apply_edit`] changes.
pub struct PowerFlow {
    pub(super) method: Method,
    pub(super) config: PowerFlowConfig,
    pub(super) network: NetworkModel,
    pub(super) class: BusClassification,
    pub(super) index: StateIndex,
    pub(super) y: NodalMatrix,
    pub(super) spec: Injection,
    pub(super) v: PolarVoltage,
    pub(super) state: MethodState,
    pub(super) mismatch: Mismatch,
    pub(super) monitor: ConvergenceMonitor,
}

impl PowerFlow {
    /// Validates and classifies `network`, assembles the admittance model and
    /// prepares `method`. No iteration is performed.
    pub fn build(network: &NetworkModel, method: Method, config: PowerFlowConfig) -> Result<Self> {
        let class = classify_buses(network)?;
        let v = initial_voltage(network, &class);
        let pf = Self::assemble(network.clone(), class, method, config, v)?;
        info!(
            buses = pf.network.bus_count(),
            branches = pf.network.branches.len(),
            unknowns = pf.index.len(),
            ?method,
            "power flow built"
        );
        Ok(pf)
    }

    pub(super) fn assemble(
        network: NetworkModel,
        class: BusClassification,
        method: Method,
        config: PowerFlowConfig,
        v: PolarVoltage,
    ) -> Result<Self> {
        let y = NodalMatrix::build(&network)?;
        let index = class.state_index();
        let spec = network.injection();
        let state = MethodState::new(method, &network, &class, &index, &y, &v, config.factorization)?;
        let mismatch = power_mismatch(&y, &v, &index, &spec);
        let mut monitor = ConvergenceMonitor::new(config.tol(), config.max_it());
        monitor.observe(&mismatch);
        Ok(Self {
            method,
            config,
            network,
            class,
            index,
            y,
            spec,
            v,
            state,
            mismatch,
            monitor,
        })
    }

    /// Largest absolute active and reactive mismatch at the current voltages.
    ///
    /// Calling this repeatedly without [`PowerFlow::step`] in between returns
    /// the same values.
    pub fn mismatch(&self) -> (f64, f64) {
        (self.monitor.max_active, self.monitor.max_reactive)
    }

    /// Performs exactly one iteration of the selected method.
    pub fn step(&mut self) -> Result<()> {
        let mis = match &mut self.state {
            MethodState::Newton(nr) => {
                nr.step(&self.y, &self.index, &self.spec, &mut self.v, &self.mismatch)?
            }
            MethodState::Decoupled(fd) => fd.step(
                &self.y,
                &self.index,
                &self.spec,
                self.monitor.tolerance,
                &mut self.v,
                &self.mismatch,
            )?,
            MethodState::Seidel(gs) => gs.step(&self.y, &self.index, &self.spec, &mut self.v)?,
        };
        self.monitor.record(&mis);
        self.mismatch = mis;
        debug!(
            iteration = self.monitor.iterations,
            max_active = self.monitor.max_active,
            max_reactive = self.monitor.max_reactive,
            "power flow step"
        );
        Ok(())
    }

    /// Steps until the mismatch is below tolerance or the iteration cap is hit.
    ///
    /// Running out of iterations is reported through
    /// [`PowerFlowResult::converged`], not as an error.
    pub fn solve(&mut self) -> Result<PowerFlowResult> {
        while !self.monitor.converged() && !self.monitor.exhausted() {
            self.step()?;
        }
        let res = self.result();
        if res.converged {
            info!(iterations = res.iterations, method = ?self.method, "power flow converged");
        } else {
            warn!(
                iterations = res.iterations,
                max_active = res.max_active,
                max_reactive = res.max_reactive,
                "power flow did not converge"
            );
        }
        Ok(res)
    }

    pub fn result(&self) -> PowerFlowResult {
        PowerFlowResult {
            v: self.complex_voltage(),
            iterations: self.monitor.iterations,
            converged: self.monitor.converged(),
            max_active: self.monitor.max_active,
            max_reactive: self.monitor.max_reactive,
        }
    }

    pub fn voltage(&self) -> Vec<BusVoltage> {
        self.v
            .magnitude
            .iter()
            .zip(&self.v.angle)
            .map(|(&magnitude, &angle)| BusVoltage { magnitude, angle })
            .collect()
    }

    pub fn complex_voltage(&self) -> DVector<Complex64> {
        self.v.to_dvector()
    }

    fn ensure_converged(&self) -> Result<()> {
        if self.monitor.converged() {
            Ok(())
        } else {
            Err(PowerFlowError::NotConverged {
                iterations: self.monitor.iterations,
            })
        }
    }

    /// Bus, generator and branch powers at the converged solution.
    pub fn power(&self) -> Result<PowerReport> {
        self.ensure_converged()?;
        Ok(self.power_partial())
    }

    /// Same as [`PowerFlow::power`] at whatever voltages the handle holds.
    pub fn power_partial(&self) -> PowerReport {
        power_report(&self.network, &self.class, &self.y, &self.v.to_complex())
    }

    /// Bus and branch currents at the converged solution.
    pub fn current(&self) -> Result<CurrentReport> {
        self.ensure_converged()?;
        Ok(self.current_partial())
    }

    /// Same as [`PowerFlow::current`] at whatever voltages the handle holds.
    pub fn current_partial(&self) -> CurrentReport {
        current_report(&self.y, &self.v.to_complex())
    }

    #[inline(always)]
    pub fn method(&self) -> Method {
        self.method
    }

    #[inline(always)]
    pub fn config(&self) -> &PowerFlowConfig {
        &self.config
    }

    #[inline(always)]
    pub fn network(&self) -> &NetworkModel {
        &self.network
    }

    #[inline(always)]
    pub fn classification(&self) -> &BusClassification {
        &self.class
    }

    #[inline(always)]
    pub fn admittance(&self) -> &NodalMatrix {
        &self.y
    }

    #[inline(always)]
    pub fn convergence(&self) -> &ConvergenceMonitor {
        &self.monitor
    }
}
