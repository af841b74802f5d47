//! Definitions of errors that can occur during deployment, reconciliation,
//! and multisig batch handling

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// Errors that can occur during the execution of the deploy scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The signing identity required for an operation is not available
    MissingAuthority(String),
    /// The new implementation's storage layout is incompatible with the
    /// currently deployed implementation
    StorageIncompatible(String),
    /// An on-chain call reverted
    ExecutionReverted(String),
    /// Proposing a batch to the co-signing service failed
    ProposalFailed(String),
    /// A privileged call lacks a destination or payload
    MalformedCallSpec(String),
    /// Error reading a deployment record
    ReadDeployments(String),
    /// Error writing a deployment record
    WriteDeployments(String),
    /// Error reading the pending multisig batch
    ReadBatch(String),
    /// Error writing the pending multisig batch
    WriteBatch(String),
    /// Error loading or parsing a compilation artifact
    ArtifactParsing(String),
    /// Error initializing the RPC client
    ClientInitialization(String),
    /// Error constructing calldata for a contract method
    CalldataConstruction(String),
    /// Error deploying a contract
    ContractDeployment(String),
    /// Error reading from a contract or the chain
    ContractInteraction(String),
    /// The network or chain has no configuration
    UnknownNetwork(String),
    /// No pool is defined under the requested alias
    UnknownPool(String),
    /// Error de/serializing data
    Serde(String),
}

impl ScriptError {
    /// Whether the error must abort the whole run.
    ///
    /// A failed proposal leaves the pending batch intact, so the process
    /// may report it and exit without losing work.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ScriptError::ProposalFailed(_))
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::MissingAuthority(s) => write!(f, "missing signing authority: {}", s),
            ScriptError::StorageIncompatible(s) => {
                write!(f, "incompatible storage layout: {}", s)
            }
            ScriptError::ExecutionReverted(s) => write!(f, "execution reverted: {}", s),
            ScriptError::ProposalFailed(s) => write!(f, "error proposing multisig batch: {}", s),
            ScriptError::MalformedCallSpec(s) => write!(f, "malformed call: {}", s),
            ScriptError::ReadDeployments(s) => write!(f, "error reading deployments: {}", s),
            ScriptError::WriteDeployments(s) => write!(f, "error writing deployments: {}", s),
            ScriptError::ReadBatch(s) => write!(f, "error reading multisig batch: {}", s),
            ScriptError::WriteBatch(s) => write!(f, "error writing multisig batch: {}", s),
            ScriptError::ArtifactParsing(s) => write!(f, "error parsing artifact: {}", s),
            ScriptError::ClientInitialization(s) => write!(f, "error initializing client: {}", s),
            ScriptError::CalldataConstruction(s) => write!(f, "error constructing calldata: {}", s),
            ScriptError::ContractDeployment(s) => write!(f, "error deploying contract: {}", s),
            ScriptError::ContractInteraction(s) => {
                write!(f, "error interacting with contract: {}", s)
            }
            ScriptError::UnknownNetwork(s) => write!(f, "unknown network: {}", s),
            ScriptError::UnknownPool(s) => write!(f, "unknown pool: {}", s),
            ScriptError::Serde(s) => write!(f, "error de/serializing data: {}", s),
        }
    }
}

impl Error for ScriptError {}
