use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    error::Result,
    network::BusType,
    powerflow::PowerFlow,
    update::Edit,
};

/// A generator whose computed reactive output lies outside its limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReactiveLimitViolation {
    pub generator: usize,
    pub bus: usize,
    /// Reactive output at the converged solution.
    pub reactive: f64,
    /// The violated limit.
    pub limit: f64,
}

impl PowerFlow {
    /// Generators at generator buses whose reactive output violates `q_limit`.
    ///
    /// Only the first in-service generator of each bus is checked, since it
    /// carries the computed reactive power. Slack generators are never
    /// reported. Needs a converged solution.
    pub fn reactive_limit_violations(&self) -> Result<Vec<ReactiveLimitViolation>> {
        let report = self.power()?;
        let net = self.network();
        let class = self.classification();
        let violations = (0..net.bus_count())
            .filter(|&bus| class.bus_type(bus) == BusType::Generator)
            .filter_map(|bus| {
                let generator = net.first_generator(bus)?;
                let lim = net.generators[generator].q_limit?;
                let reactive = report.generators[generator]?.im;
                let limit = if reactive < lim.min {
                    lim.min
                } else if reactive > lim.max {
                    lim.max
                } else {
                    return None;
                };
                Some(ReactiveLimitViolation {
                    generator,
                    bus,
                    reactive,
                    limit,
                })
            })
            .collect();
        Ok(violations)
    }

    /// Pins every violating generator at its limit and turns its bus into a
    /// demand bus.
    ///
    /// The handle keeps its voltages, so [`PowerFlow::solve`] continues from
    /// the current point. Returns the violations that were enforced; an empty
    /// list means the solution already respects every limit.
    pub fn enforce_reactive_limits(&mut self) -> Result<Vec<ReactiveLimitViolation>> {
        let violations = self.reactive_limit_violations()?;
        for viol in &violations {
            self.pin_at_limit(viol)?;
            info!(
                bus = viol.bus,
                generator = viol.generator,
                reactive = viol.reactive,
                limit = viol.limit,
                "reactive limit enforced"
            );
        }
        Ok(violations)
    }

    /// Switches the bus to demand and then fixes the generator output.
    ///
    /// The bus-type edit goes first, so a rejection leaves the generator
    /// output as it was.
    fn pin_at_limit(&mut self, viol: &ReactiveLimitViolation) -> Result<()> {
        let active = self.network().generators[viol.generator].active;
        self.apply_edit(Edit::BusType {
            bus: viol.bus,
            bus_type: BusType::Demand,
        })?;
        self.apply_edit(Edit::GeneratorOutput {
            generator: viol.generator,
            active,
            reactive: viol.limit,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        basic::{
            error::{PowerFlowError, RebuildRequired},
            powerflow::{Method, PowerFlowConfig},
        },
        testcases::five_bus,
    };
    use approx::assert_relative_eq;

    fn with_limit(max: f64) -> PowerFlow {
        let mut net = five_bus();
        net.generators[1] = net.generators[1].clone().with_q_limit(-0.1, max);
        let mut pf = PowerFlow::build(&net, Method::NewtonRaphson, PowerFlowConfig::default())
            .unwrap();
        assert!(pf.solve().unwrap().converged);
        pf
    }

    #[test]
    fn test_limits_inside_range_are_kept() {
        let mut pf = with_limit(0.5);
        assert!(pf.reactive_limit_violations().unwrap().is_empty());
        assert!(pf.enforce_reactive_limits().unwrap().is_empty());
        assert!(pf.convergence().converged());
    }

    #[test]
    fn test_violation_pins_reactive_output() {
        // the generator at bus 1 supplies about 0.119 p.u. unconstrained
        let mut pf = with_limit(0.1);
        let violations = pf.enforce_reactive_limits().unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].bus, 1);
        assert_relative_eq!(violations[0].reactive, 0.11908379, epsilon = 1e-6);
        assert_eq!(pf.classification().bus_type(1), BusType::Demand);
        assert!(!pf.convergence().converged());

        assert!(pf.solve().unwrap().converged);
        let report = pf.power().unwrap();
        assert_relative_eq!(report.generators[1].unwrap().im, 0.1, epsilon = 1e-12);
        assert_relative_eq!(report.buses[1].injection.im, 0.1, epsilon = 1e-8);
        assert_relative_eq!(pf.voltage()[1].magnitude, 1.009015114, epsilon = 1e-7);
        assert!(pf.reactive_limit_violations().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_pin_keeps_generator_output() {
        let mut pf = with_limit(0.5);
        let viol = ReactiveLimitViolation {
            generator: 0,
            bus: 0,
            reactive: 0.3,
            limit: 0.2,
        };
        let before = pf.network().clone();
        assert!(matches!(
            pf.pin_at_limit(&viol),
            Err(PowerFlowError::IncompatibleEdit(RebuildRequired::SlackMoved { from: 0, to: 1 }))
        ));
        assert_eq!(pf.network(), &before);
        assert_eq!(pf.classification().bus_type(0), BusType::Slack);
    }

    #[test]
    fn test_needs_converged_solution() {
        let mut net = five_bus();
        net.generators[1] = net.generators[1].clone().with_q_limit(-0.1, 0.1);
        let pf = PowerFlow::build(&net, Method::NewtonRaphson, PowerFlowConfig::default())
            .unwrap();
        assert!(pf.reactive_limit_violations().is_err());
    }
}
