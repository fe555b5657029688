pub mod classify;
pub mod convergence;
pub mod error;
pub mod fdpf;
pub mod gausspf;
pub mod mismatch;
pub mod network;
pub mod newtonpf;
pub mod post_processing;
pub mod powerflow;
pub mod qlim;
pub mod solver;
pub(crate) mod sparse;
pub mod system;
pub mod update;
