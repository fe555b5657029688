use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::error::{ConfigurationError, Result};

/// Role a bus plays in the power flow formulation.
///
/// * `Demand` - PQ bus, active and reactive injection given.
/// * `Generator` - PV bus, active injection and voltage magnitude given.
/// * `Slack` - reference bus, voltage magnitude and angle given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusType {
    #[default]
    Demand,
    Generator,
    Slack,
}

/// A network node. All quantities are per-unit, angles in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub bus_type: BusType,
    /// Last known voltage magnitude, used as the starting point of a solve.
    pub magnitude: f64,
    /// Last known voltage angle.
    pub angle: f64,
    pub shunt_conductance: f64,
    pub shunt_susceptance: f64,
    pub active_demand: f64,
    pub reactive_demand: f64,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            bus_type: BusType::Demand,
            magnitude: 1.0,
            angle: 0.0,
            shunt_conductance: 0.0,
            shunt_susceptance: 0.0,
            active_demand: 0.0,
            reactive_demand: 0.0,
        }
    }
}

impl Bus {
    pub fn new(bus_type: BusType) -> Self {
        Self {
            bus_type,
            ..Default::default()
        }
    }

    pub fn with_demand(mut self, active: f64, reactive: f64) -> Self {
        self.active_demand = active;
        self.reactive_demand = reactive;
        self
    }

    pub fn with_shunt(mut self, conductance: f64, susceptance: f64) -> Self {
        self.shunt_conductance = conductance;
        self.shunt_susceptance = susceptance;
        self
    }

    #[inline(always)]
    pub fn shunt_admittance(&self) -> Complex64 {
        Complex64::new(self.shunt_conductance, self.shunt_susceptance)
    }
}

/// A π-modelled line or transformer between two buses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub from: usize,
    pub to: usize,
    pub resistance: f64,
    pub reactance: f64,
    /// Total line charging susceptance.
    pub susceptance: f64,
    /// Off-nominal turns ratio at the from side, 0 when the branch is a plain line.
    pub tap_ratio: f64,
    /// Phase shift in radians.
    pub shift_angle: f64,
    pub in_service: bool,
}

impl Branch {
    pub fn line(from: usize, to: usize, resistance: f64, reactance: f64, susceptance: f64) -> Self {
        Self {
            from,
            to,
            resistance,
            reactance,
            susceptance,
            tap_ratio: 0.0,
            shift_angle: 0.0,
            in_service: true,
        }
    }

    pub fn transformer(
        from: usize,
        to: usize,
        resistance: f64,
        reactance: f64,
        tap_ratio: f64,
        shift_angle: f64,
    ) -> Self {
        Self {
            tap_ratio,
            shift_angle,
            ..Self::line(from, to, resistance, reactance, 0.0)
        }
    }

    /// Tap magnitude with the "no transformer" value normalized to one.
    #[inline(always)]
    pub fn turns_ratio(&self) -> f64 {
        if self.tap_ratio == 0.0 {
            1.0
        } else {
            self.tap_ratio
        }
    }

    /// Complex ratio `|τ|·e^{jφ}`.
    #[inline(always)]
    pub fn transformer_ratio(&self) -> Complex64 {
        Complex64::from_polar(self.turns_ratio(), self.shift_angle)
    }

    #[inline(always)]
    pub fn series_admittance(&self) -> Complex64 {
        Complex64::new(self.resistance, self.reactance).inv()
    }
}

/// Generic lower and upper bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Limit<T> {
    pub min: T,
    pub max: T,
}

/// A generating unit attached to a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub bus: usize,
    pub active: f64,
    pub reactive: f64,
    /// Voltage magnitude setpoint, honoured at generator and slack buses.
    pub magnitude: f64,
    pub in_service: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q_limit: Option<Limit<f64>>,
}

impl Generator {
    pub fn new(bus: usize, active: f64, magnitude: f64) -> Self {
        Self {
            bus,
            active,
            reactive: 0.0,
            magnitude,
            in_service: true,
            q_limit: None,
        }
    }

    pub fn with_q_limit(mut self, min: f64, max: f64) -> Self {
        self.q_limit = Some(Limit { min, max });
        self
    }
}

/// Specified net injection per bus (generation minus demand).
#[derive(Debug, Clone, PartialEq)]
pub struct Injection {
    pub active: DVector<f64>,
    pub reactive: DVector<f64>,
}

/// Per-solve view of the network. Bus indices are positions in `buses`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkModel {
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    pub generators: Vec<Generator>,
}

impl NetworkModel {
    #[inline(always)]
    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    /// Checks every element reference and parameter the admittance assembly relies on.
    pub fn validate(&self) -> Result<()> {
        let n = self.bus_count();
        if n == 0 {
            return Err(ConfigurationError::EmptyNetwork.into());
        }
        for (branch, br) in self.branches.iter().enumerate() {
            for bus in [br.from, br.to] {
                if bus >= n {
                    return Err(ConfigurationError::UnknownBranchBus { branch, bus }.into());
                }
            }
            if br.in_service && br.resistance == 0.0 && br.reactance == 0.0 {
                return Err(ConfigurationError::ZeroImpedance { branch }.into());
            }
        }
        for (generator, g) in self.generators.iter().enumerate() {
            if g.bus >= n {
                return Err(ConfigurationError::UnknownGeneratorBus { generator, bus: g.bus }.into());
            }
        }
        Ok(())
    }

    /// Number of in-service generators attached to each bus.
    pub fn generator_counts(&self) -> Vec<usize> {
        let n = self.bus_count();
        let mut counts = vec![0; n];
        self.generators
            .iter()
            .filter(|g| g.in_service && g.bus < n)
            .for_each(|g| counts[g.bus] += 1);
        counts
    }

    /// In-service generators at `bus`, with their indices.
    pub fn generators_at(&self, bus: usize) -> impl Iterator<Item = (usize, &Generator)> {
        self.generators
            .iter()
            .enumerate()
            .filter(move |(_, g)| g.in_service && g.bus == bus)
    }

    /// First in-service generator at `bus`, which owns the bus voltage setpoint.
    pub fn first_generator(&self, bus: usize) -> Option<usize> {
        self.generators_at(bus).map(|(idx, _)| idx).next()
    }

    /// Specified injections: in-service generation minus demand.
    ///
    /// Generators attached to unknown buses are skipped; [`Self::validate`]
    /// reports them.
    pub fn injection(&self) -> Injection {
        let n = self.bus_count();
        let mut active = DVector::from_iterator(n, self.buses.iter().map(|b| -b.active_demand));
        let mut reactive =
            DVector::from_iterator(n, self.buses.iter().map(|b| -b.reactive_demand));
        for g in self.generators.iter().filter(|g| g.in_service && g.bus < n) {
            active[g.bus] += g.active;
            reactive[g.bus] += g.reactive;
        }
        Injection { active, reactive }
    }
}
