pub mod admittance;
pub mod decoupled;
