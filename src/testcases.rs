//! Small reference networks used across the test suite.

use crate::basic::network::{Branch, Bus, BusType, Generator, NetworkModel};

/// Slack at bus 0 feeding two demand buses over purely reactive lines.
pub fn three_bus() -> NetworkModel {
    NetworkModel {
        buses: vec![
            Bus::new(BusType::Slack),
            Bus::default().with_demand(0.1, 0.01),
            Bus::default().with_demand(0.05, 0.0),
        ],
        branches: vec![
            Branch::line(0, 1, 0.0, 0.05, 0.0),
            Branch::line(0, 2, 0.0, 0.01, 0.0),
        ],
        generators: vec![Generator::new(0, 0.0, 1.0)],
    }
}

/// Meshed five-bus system with line charging, bus shunts, one generator bus
/// and a phase-shifting transformer between buses 3 and 4.
pub fn five_bus() -> NetworkModel {
    NetworkModel {
        buses: vec![
            Bus::new(BusType::Slack),
            Bus::new(BusType::Generator),
            Bus::default().with_demand(0.6, 0.2),
            Bus::default().with_demand(0.3, 0.1).with_shunt(0.0, 0.05),
            Bus::default().with_demand(0.25, 0.08).with_shunt(0.01, 0.0),
        ],
        branches: vec![
            Branch::line(0, 1, 0.02, 0.06, 0.06),
            Branch::line(0, 2, 0.08, 0.24, 0.05),
            Branch::line(1, 2, 0.06, 0.18, 0.04),
            Branch::line(1, 3, 0.06, 0.18, 0.04),
            Branch::line(2, 3, 0.01, 0.03, 0.02),
            Branch::transformer(3, 4, 0.005, 0.08, 0.98, 0.05),
            Branch::line(2, 4, 0.08, 0.24, 0.05),
        ],
        generators: vec![Generator::new(0, 0.0, 1.02), Generator::new(1, 0.4, 1.01)],
    }
}

/// Four buses in a ring with zero resistance everywhere.
pub fn lossless_ring() -> NetworkModel {
    NetworkModel {
        buses: vec![
            Bus::new(BusType::Slack),
            Bus::default().with_demand(0.2, 0.05),
            Bus::new(BusType::Generator),
            Bus::default().with_demand(0.3, 0.1),
        ],
        branches: vec![
            Branch::line(0, 1, 0.0, 0.1, 0.02),
            Branch::line(1, 2, 0.0, 0.08, 0.0),
            Branch::line(2, 3, 0.0, 0.12, 0.01),
            Branch::line(3, 0, 0.0, 0.1, 0.0),
        ],
        generators: vec![Generator::new(0, 0.0, 1.0), Generator::new(2, 0.25, 1.0)],
    }
}
