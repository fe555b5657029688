//! Quantities derived from a solved voltage vector.
//!
//! Everything here is a pure function of the bus voltages, the network and
//! its admittance model; nothing iterates.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    classify::BusClassification,
    network::{BusType, NetworkModel},
    system::admittance::{BranchAdmittance, NodalMatrix},
};

/// Power balance of one bus. Injections are positive into the network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusPower {
    /// Net injection `V_i·conj(Σ_j Y_ij·V_j)`.
    pub injection: Complex64,
    /// Power drawn by the bus shunt, `|V_i|²·(g - jb)`.
    pub shunt: Complex64,
    /// Total generation at the bus.
    pub supply: Complex64,
    pub demand: Complex64,
}

/// Flows of one in-service branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BranchFlow {
    /// Power entering the branch at the from bus.
    pub from: Complex64,
    /// Power entering the branch at the to bus.
    pub to: Complex64,
    /// Reactive power generated by the line charging.
    pub charging: f64,
    pub loss_active: f64,
    pub loss_reactive: f64,
}

/// Current phasors of one in-service branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BranchCurrent {
    pub from: Complex64,
    pub to: Complex64,
    /// Current through the series impedance.
    pub series: Complex64,
}

/// Powers of every bus, generator and branch. Out-of-service generators and
/// branches are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerReport {
    pub buses: Vec<BusPower>,
    pub generators: Vec<Option<Complex64>>,
    pub branches: Vec<Option<BranchFlow>>,
}

/// Bus current injections and branch currents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentReport {
    pub buses: Vec<Complex64>,
    pub branches: Vec<Option<BranchCurrent>>,
}

pub fn bus_powers(
    net: &NetworkModel,
    class: &BusClassification,
    y: &NodalMatrix,
    v: &[Complex64],
) -> Vec<BusPower> {
    let mut given = vec![Complex64::new(0.0, 0.0); net.bus_count()];
    for g in net.generators.iter().filter(|g| g.in_service) {
        given[g.bus] += Complex64::new(g.active, g.reactive);
    }
    net.buses
        .iter()
        .enumerate()
        .map(|(bus, b)| {
            let injection = v[bus] * y.bus_current(bus, v).conj();
            let demand = Complex64::new(b.active_demand, b.reactive_demand);
            let computed = injection + demand;
            let supply = match class.bus_type(bus) {
                BusType::Demand => given[bus],
                BusType::Generator => Complex64::new(given[bus].re, computed.im),
                BusType::Slack => computed,
            };
            BusPower {
                injection,
                shunt: v[bus].norm_sqr() * b.shunt_admittance().conj(),
                supply,
                demand,
            }
        })
        .collect()
}

/// Splits each bus supply over its generators.
///
/// Generators keep their given output, except that whatever the solution
/// determines at a bus (active power at the slack, reactive power at
/// generator and slack buses) goes to the first in-service generator, less
/// the given output of the others.
pub fn generator_powers(
    net: &NetworkModel,
    class: &BusClassification,
    buses: &[BusPower],
) -> Vec<Option<Complex64>> {
    let mut out: Vec<Option<Complex64>> = net
        .generators
        .iter()
        .map(|g| g.in_service.then(|| Complex64::new(g.active, g.reactive)))
        .collect();
    for (bus, power) in buses.iter().enumerate() {
        let ty = class.bus_type(bus);
        if ty == BusType::Demand {
            continue;
        }
        let Some(first) = net.first_generator(bus) else {
            continue;
        };
        let others = net
            .generators_at(bus)
            .filter(|(idx, _)| *idx != first)
            .fold(Complex64::new(0.0, 0.0), |acc, (_, g)| {
                acc + Complex64::new(g.active, g.reactive)
            });
        if let Some(s) = out[first].as_mut() {
            if ty == BusType::Slack {
                s.re = power.supply.re - others.re;
            }
            s.im = power.supply.im - others.im;
        }
    }
    out
}

#[inline(always)]
fn series_current(br: &BranchAdmittance, vf: Complex64, vt: Complex64) -> Complex64 {
    br.series * (vf / br.ratio - vt)
}

pub fn branch_flows(y: &NodalMatrix, v: &[Complex64]) -> Vec<Option<BranchFlow>> {
    y.branches()
        .iter()
        .map(|br| {
            br.as_ref().map(|br| {
                let (vf, vt) = (v[br.from], v[br.to]);
                let i_s = series_current(br, vf, vt);
                let loss = i_s.norm_sqr() * br.series.inv();
                BranchFlow {
                    from: vf * (br.ff * vf + br.ft * vt).conj(),
                    to: vt * (br.tf * vf + br.tt * vt).conj(),
                    charging: br.charging / 2.0
                        * (vf.norm_sqr() / br.ratio.norm_sqr() + vt.norm_sqr()),
                    loss_active: loss.re,
                    loss_reactive: loss.im,
                }
            })
        })
        .collect()
}

pub fn branch_currents(y: &NodalMatrix, v: &[Complex64]) -> Vec<Option<BranchCurrent>> {
    y.branches()
        .iter()
        .map(|br| {
            br.as_ref().map(|br| {
                let (vf, vt) = (v[br.from], v[br.to]);
                BranchCurrent {
                    from: br.ff * vf + br.ft * vt,
                    to: br.tf * vf + br.tt * vt,
                    series: series_current(br, vf, vt),
                }
            })
        })
        .collect()
}

pub fn power_report(
    net: &NetworkModel,
    class: &BusClassification,
    y: &NodalMatrix,
    v: &[Complex64],
) -> PowerReport {
    let buses = bus_powers(net, class, y, v);
    PowerReport {
        generators: generator_powers(net, class, &buses),
        branches: branch_flows(y, v),
        buses,
    }
}

pub fn current_report(y: &NodalMatrix, v: &[Complex64]) -> CurrentReport {
    CurrentReport {
        buses: y.current(v),
        branches: branch_currents(y, v),
    }
}
