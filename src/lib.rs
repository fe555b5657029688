mod basic;
pub mod testcases;
pub mod prelude {
    use crate::basic;
    pub use basic::*;

    pub use basic::{
        classify::{BusClassification, Repair, StateIndex, classify_buses},
        convergence::ConvergenceMonitor,
        error::{ConfigurationError, PowerFlowError, RebuildRequired},
        network::{Branch, Bus, BusType, Generator, Limit, NetworkModel},
        post_processing::{BranchCurrent, BranchFlow, BusPower, CurrentReport, PowerReport},
        powerflow::{BusVoltage, Method, PowerFlow, PowerFlowConfig, PowerFlowResult},
        qlim::ReactiveLimitViolation,
        solver::Factorization,
        update::{Edit, EditImpact},
    };
}
