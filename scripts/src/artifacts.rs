//! Loading compiled contract artifacts

use std::{collections::HashMap, path::PathBuf};

use alloy::json_abi::JsonAbi;
use alloy_primitives::{keccak256, Bytes, B256};
use serde::Deserialize;

use crate::{
    constants::JSON_EXTENSION, errors::ScriptError, types::StorageLayout, utils::read_json_file,
};

/// The compiled form of a contract type
#[derive(Clone, Debug, PartialEq)]
pub struct ContractArtifact {
    /// The contract's ABI
    pub abi: JsonAbi,
    /// The creation bytecode, without constructor arguments
    pub bytecode: Bytes,
    /// The storage layout, when the compiler emitted one
    pub storage_layout: Option<StorageLayout>,
}

impl ContractArtifact {
    /// The identity of the artifact's creation bytecode
    pub fn bytecode_hash(&self) -> B256 {
        keccak256(&self.bytecode)
    }
}

/// A source of compiled contract artifacts
pub trait ArtifactProvider {
    /// Get the artifact for `contract_type`
    fn artifact(&self, contract_type: &str) -> Result<ContractArtifact, ScriptError>;
}

/// The on-disk artifact format.
///
/// Hardhat writes `bytecode` as a hex string while Foundry nests it under
/// `object`; both are accepted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    /// The contract's ABI
    abi: JsonAbi,
    /// The creation bytecode
    bytecode: BytecodeField,
    /// The storage layout
    #[serde(default)]
    storage_layout: Option<StorageLayout>,
}

/// The two shapes a `bytecode` field takes
#[derive(Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    /// A bare hex string
    Hex(Bytes),
    /// A Foundry bytecode object
    Object {
        /// The hex bytecode
        object: Bytes,
    },
}

/// Artifacts read from `<dir>/<ContractType>.json`
pub struct FileArtifacts {
    /// The directory holding the artifacts
    dir: PathBuf,
}

impl FileArtifacts {
    /// Read artifacts from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtifactProvider for FileArtifacts {
    fn artifact(&self, contract_type: &str) -> Result<ContractArtifact, ScriptError> {
        let path = self.dir.join(format!("{contract_type}.{JSON_EXTENSION}"));
        let file: ArtifactFile = read_json_file(&path, ScriptError::ArtifactParsing)?
            .ok_or_else(|| {
                ScriptError::ArtifactParsing(format!("no artifact at {}", path.display()))
            })?;

        let bytecode = match file.bytecode {
            BytecodeField::Hex(bytes) | BytecodeField::Object { object: bytes } => bytes,
        };
        if bytecode.is_empty() {
            return Err(ScriptError::ArtifactParsing(format!(
                "`{contract_type}` has no bytecode; is it abstract?"
            )));
        }

        Ok(ContractArtifact {
            abi: file.abi,
            bytecode,
            storage_layout: file.storage_layout,
        })
    }
}

/// Artifacts registered in memory
#[derive(Default)]
pub struct MemoryArtifacts {
    /// The artifacts, keyed by contract type
    artifacts: HashMap<String, ContractArtifact>,
}

impl MemoryArtifacts {
    /// Register or replace the artifact for `contract_type`
    pub fn insert(&mut self, contract_type: &str, artifact: ContractArtifact) {
        self.artifacts.insert(contract_type.to_string(), artifact);
    }
}

impl ArtifactProvider for MemoryArtifacts {
    fn artifact(&self, contract_type: &str) -> Result<ContractArtifact, ScriptError> {
        self.artifacts.get(contract_type).cloned().ok_or_else(|| {
            ScriptError::ArtifactParsing(format!("no artifact for `{contract_type}`"))
        })
    }
}
