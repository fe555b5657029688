use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    error::{ConfigurationError, Result},
    network::{BusType, NetworkModel},
};

/// A bus type change performed by [`classify_buses`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repair {
    pub bus: usize,
    pub from: BusType,
    pub to: BusType,
}

/// Bus types as seen by the solvers, plus the repairs needed to get there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusClassification {
    pub types: Vec<BusType>,
    pub slack: usize,
    pub repairs: Vec<Repair>,
}

/// Maps buses to rows of the state vector.
///
/// Angle unknowns come first (every non-slack bus, ascending), followed by
/// magnitude unknowns (every demand bus, ascending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateIndex {
    pub angle: Vec<Option<usize>>,
    pub magnitude: Vec<Option<usize>>,
    pub angle_buses: Vec<usize>,
    pub magnitude_buses: Vec<usize>,
}

impl StateIndex {
    #[inline(always)]
    pub fn n_angle(&self) -> usize {
        self.angle_buses.len()
    }

    #[inline(always)]
    pub fn n_magnitude(&self) -> usize {
        self.magnitude_buses.len()
    }

    /// Total number of unknowns.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.n_angle() + self.n_magnitude()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row of the magnitude unknown of `bus` in the full state vector.
    #[inline(always)]
    pub fn magnitude_row(&self, bus: usize) -> Option<usize> {
        self.magnitude[bus].map(|k| k + self.n_angle())
    }
}

impl BusClassification {
    pub fn bus_type(&self, bus: usize) -> BusType {
        self.types[bus]
    }

    pub fn pv(&self) -> impl Iterator<Item = usize> + '_ {
        self.buses_of(BusType::Generator)
    }

    pub fn pq(&self) -> impl Iterator<Item = usize> + '_ {
        self.buses_of(BusType::Demand)
    }

    fn buses_of(&self, ty: BusType) -> impl Iterator<Item = usize> + '_ {
        self.types
            .iter()
            .enumerate()
            .filter(move |(_, t)| **t == ty)
            .map(|(i, _)| i)
    }

    /// True when both classifications split the buses the same way.
    pub fn same_partition(&self, other: &BusClassification) -> bool {
        self.types == other.types
    }

    pub fn state_index(&self) -> StateIndex {
        let n = self.types.len();
        let mut angle = vec![None; n];
        let mut magnitude = vec![None; n];
        let mut angle_buses = Vec::with_capacity(n);
        let mut magnitude_buses = Vec::with_capacity(n);
        for (bus, ty) in self.types.iter().enumerate() {
            if *ty != BusType::Slack {
                angle[bus] = Some(angle_buses.len());
                angle_buses.push(bus);
            }
            if *ty == BusType::Demand {
                magnitude[bus] = Some(magnitude_buses.len());
                magnitude_buses.push(bus);
            }
        }
        StateIndex {
            angle,
            magnitude,
            angle_buses,
            magnitude_buses,
        }
    }
}

/// Resolves the bus types a solver can work with.
///
/// Buses marked `Generator` without an in-service generator become `Demand`,
/// and so does a `Slack` bus without one. If that leaves no slack, the first
/// remaining `Generator` bus is promoted. Buses marked `Demand` are never
/// promoted, even when a generator is attached. Additional `Slack` markings
/// after the first are treated as `Generator`.
///
/// The network is not modified; every change is listed in
/// [`BusClassification::repairs`].
pub fn classify_buses(net: &NetworkModel) -> Result<BusClassification> {
    let counts = net.generator_counts();
    let mut types: Vec<BusType> = net.buses.iter().map(|b| b.bus_type).collect();
    let mut repairs = Vec::new();
    let mut change = |types: &mut [BusType], bus: usize, to: BusType| {
        repairs.push(Repair {
            bus,
            from: types[bus],
            to,
        });
        types[bus] = to;
    };

    let mut slack = types.iter().position(|t| *t == BusType::Slack);
    if let Some(first) = slack {
        for bus in first + 1..types.len() {
            if types[bus] == BusType::Slack {
                change(&mut types, bus, BusType::Generator);
            }
        }
    }

    for bus in 0..types.len() {
        if types[bus] == BusType::Generator && counts[bus] == 0 {
            change(&mut types, bus, BusType::Demand);
        }
    }

    if let Some(bus) = slack {
        if counts[bus] == 0 {
            change(&mut types, bus, BusType::Demand);
            slack = None;
        }
    }

    if slack.is_none() {
        slack = types.iter().position(|t| *t == BusType::Generator);
        if let Some(bus) = slack {
            change(&mut types, bus, BusType::Slack);
        }
    }

    let slack = slack.ok_or(ConfigurationError::NoSlackBus)?;
    for r in &repairs {
        warn!(bus = r.bus, from = ?r.from, to = ?r.to, "bus type repaired");
    }
    Ok(BusClassification {
        types,
        slack,
        repairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{
        error::PowerFlowError,
        network::{self, Branch, Bus},
    };

    fn net(types: &[BusType], gens: &[usize]) -> NetworkModel {
        NetworkModel {
            buses: types.iter().map(|t| Bus::new(*t)).collect(),
            branches: (1..types.len())
                .map(|i| Branch::line(i - 1, i, 0.0, 0.1, 0.0))
                .collect(),
            generators: gens.iter().map(|b| network::Generator::new(*b, 0.0, 1.0)).collect(),
        }
    }

    #[test]
    fn test_slack_without_generator_is_replaced() {
        use BusType::*;
        let n = net(&[Slack, Demand, Generator, Generator], &[3]);
        let c = classify_buses(&n).unwrap();
        assert_eq!(c.types, vec![Demand, Demand, Demand, Slack]);
        assert_eq!(c.slack, 3);
        assert_eq!(
            c.repairs,
            vec![
                Repair { bus: 2, from: Generator, to: Demand },
                Repair { bus: 0, from: Slack, to: Demand },
                Repair { bus: 3, from: Generator, to: Slack },
            ]
        );
        assert_eq!(n.buses[0].bus_type, Slack, "input must not be modified");
    }

    #[test]
    fn test_classification_is_order_independent() {
        use BusType::*;
        let mut n = net(&[Slack, Generator, Demand, Generator], &[1, 3, 3]);
        let a = classify_buses(&n).unwrap();
        n.generators.reverse();
        let b = classify_buses(&n).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.slack, 1);
        assert_eq!(a.types, vec![Demand, Slack, Demand, Generator]);
    }

    #[test]
    fn test_demand_bus_is_never_promoted() {
        use BusType::*;
        let n = net(&[Demand, Demand], &[0]);
        let err = classify_buses(&n).unwrap_err();
        assert!(matches!(
            err,
            PowerFlowError::Configuration(ConfigurationError::NoSlackBus)
        ));
    }

    #[test]
    fn test_extra_slack_becomes_generator() {
        use BusType::*;
        let n = net(&[Demand, Slack, Slack], &[1, 2]);
        let c = classify_buses(&n).unwrap();
        assert_eq!(c.types, vec![Demand, Slack, Generator]);
        assert_eq!(c.repairs.len(), 1);
    }

    #[test]
    fn test_state_index_numbering() {
        use BusType::*;
        let n = net(&[Demand, Slack, Generator, Demand], &[1, 2]);
        let c = classify_buses(&n).unwrap();
        let idx = c.state_index();
        assert_eq!(idx.angle_buses, vec![0, 2, 3]);
        assert_eq!(idx.magnitude_buses, vec![0, 3]);
        assert_eq!(idx.angle, vec![Some(0), None, Some(1), Some(2)]);
        assert_eq!(idx.magnitude_row(3), Some(4));
        assert_eq!(idx.magnitude_row(2), None);
        assert_eq!(idx.len(), 5);
    }
}
