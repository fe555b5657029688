use nalgebra_sparse::SparseFormatError;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, PowerFlowError>;

#[derive(Debug, Error)]
pub enum PowerFlowError {
    /// Input cannot be turned into a solvable model.
    #[error("invalid network: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A factorization or triangular solve failed, or produced non-finite values.
    #[error("singular system: {0}")]
    SingularSystem(String),

    /// The edit cannot be applied to the live solver; build a new one.
    #[error("edit needs a fresh solver: {0}")]
    IncompatibleEdit(#[from] RebuildRequired),

    /// Converged-only results were requested before convergence.
    #[error("power flow has not converged after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("sparse matrix assembly failed: {0}")]
    SparseFormat(#[from] SparseFormatError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("network has no buses")]
    EmptyNetwork,

    #[error("no bus can act as slack")]
    NoSlackBus,

    #[error("branch {branch} references unknown bus {bus}")]
    UnknownBranchBus { branch: usize, bus: usize },

    #[error("generator {generator} references unknown bus {bus}")]
    UnknownGeneratorBus { generator: usize, bus: usize },

    #[error("branch {branch} has zero series impedance")]
    ZeroImpedance { branch: usize },

    #[error("unknown {kind} {index}")]
    UnknownElement { kind: &'static str, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RebuildRequired {
    #[error("slack would move from bus {from} to bus {to}")]
    SlackMoved { from: usize, to: usize },

    #[error("slack bus {bus} would lose its last in-service generator")]
    SlackGeneratorRemoved { bus: usize },

    #[error("slack bus {bus} would be removed")]
    SlackRemoved { bus: usize },

    #[error("slack bus {bus} would no longer be a slack bus")]
    SlackDemoted { bus: usize },
}

impl PowerFlowError {
    pub(crate) fn singular(msg: impl Into<String>) -> Self {
        Self::SingularSystem(msg.into())
    }
}
