use num_complex::Complex64;
use num_traits::Zero;

use super::{
    classify::{BusClassification, StateIndex},
    error::{PowerFlowError, Result},
    mismatch::{Mismatch, PolarVoltage, power_mismatch},
    network::Injection,
    system::admittance::NodalMatrix,
};

/// Gauss-Seidel state: complex bus voltages and the magnitude setpoints of
/// generator buses.
pub struct GaussSeidel {
    v: Vec<Complex64>,
    setpoint: Vec<f64>,
    pq: Vec<usize>,
    pv: Vec<usize>,
}

impl GaussSeidel {
    pub fn new(class: &BusClassification, v: &PolarVoltage) -> Self {
        let mut gs = Self {
            v: Vec::new(),
            setpoint: Vec::new(),
            pq: class.pq().collect(),
            pv: class.pv().collect(),
        };
        gs.sync(v);
        gs
    }

    /// Reloads voltages and setpoints after they were changed from outside.
    pub fn sync(&mut self, v: &PolarVoltage) {
        self.v = v.to_complex();
        self.setpoint = v.magnitude.clone();
    }

    #[inline(always)]
    fn update(&mut self, y: &NodalMatrix, bus: usize, p: f64, q: f64, current: Complex64) -> Result<()> {
        let yii = y.diagonal(bus);
        if yii.is_zero() {
            return Err(PowerFlowError::singular(format!("bus {bus} has no self admittance")));
        }
        let vi = self.v[bus];
        self.v[bus] = vi + (Complex64::new(p, -q) / vi.conj() - current) / yii;
        Ok(())
    }

    /// One sweep over demand buses followed by one over generator buses.
    pub fn step(
        &mut self,
        y: &NodalMatrix,
        index: &StateIndex,
        spec: &Injection,
        v: &mut PolarVoltage,
    ) -> Result<Mismatch> {
        for k in 0..self.pq.len() {
            let bus = self.pq[k];
            let current = y.bus_current(bus, &self.v);
            self.update(y, bus, spec.active[bus], spec.reactive[bus], current)?;
        }
        for k in 0..self.pv.len() {
            let bus = self.pv[k];
            let current = y.bus_current(bus, &self.v);
            let q = -(self.v[bus].conj() * current).im;
            self.update(y, bus, spec.active[bus], q, current)?;
            let vi = self.v[bus];
            self.v[bus] = vi * (self.setpoint[bus] / vi.norm());
        }
        if self.v.iter().any(|x| !x.is_finite()) {
            return Err(PowerFlowError::singular("Gauss-Seidel sweep diverged"));
        }
        *v = PolarVoltage::from_complex(&self.v);
        Ok(power_mismatch(y, v, index, spec))
    }
}
