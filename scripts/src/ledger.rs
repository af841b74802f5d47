//! The deployment ledger: the local record of what was deployed where.
//!
//! The ledger is a cache of deployment state. Implementation pointers are
//! always re-read from the chain before acting on them.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    constants::{CHAIN_ID_FILE, JSON_EXTENSION},
    errors::ScriptError,
    types::DeploymentRecord,
    utils::{read_json_file, write_atomically, write_json_file},
};

/// A keyed store of deployment records
pub trait DeploymentStore {
    /// Get the record for `alias`, if one exists
    fn get(&self, alias: &str) -> Result<Option<DeploymentRecord>, ScriptError>;

    /// Create or replace the record for `alias`
    fn save(&mut self, alias: &str, record: &DeploymentRecord) -> Result<(), ScriptError>;
}

/// A ledger keeping one JSON document per alias in a per-network directory
pub struct FileLedger {
    /// The directory holding this network's records
    dir: PathBuf,
    /// The chain the records belong to
    chain_id: u64,
}

impl FileLedger {
    /// Open the ledger for `network` under `deployments_dir`.
    ///
    /// Fails if the directory already holds records for a different chain.
    pub fn open(deployments_dir: &Path, network: &str, chain_id: u64) -> Result<Self, ScriptError> {
        let dir = deployments_dir.join(network);
        let chain_id_path = dir.join(CHAIN_ID_FILE);
        if chain_id_path.exists() {
            let recorded = fs::read_to_string(&chain_id_path)
                .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?;
            let recorded: u64 = recorded
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| ScriptError::ReadDeployments(e.to_string()))?;

            if recorded != chain_id {
                return Err(ScriptError::ReadDeployments(format!(
                    "{} holds records for chain {recorded}, not {chain_id}",
                    dir.display()
                )));
            }
        }

        Ok(Self { dir, chain_id })
    }

    /// The path of the record for `alias`
    fn record_path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{alias}.{JSON_EXTENSION}"))
    }

    /// Write the chain ID marker the first time a record is saved
    fn ensure_chain_id(&self) -> Result<(), ScriptError> {
        let path = self.dir.join(CHAIN_ID_FILE);
        if path.exists() {
            return Ok(());
        }

        fs::create_dir_all(&self.dir).map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;
        write_atomically(&path, self.chain_id.to_string().as_bytes())
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))
    }
}

impl DeploymentStore for FileLedger {
    fn get(&self, alias: &str) -> Result<Option<DeploymentRecord>, ScriptError> {
        read_json_file(&self.record_path(alias), ScriptError::ReadDeployments)
    }

    fn save(&mut self, alias: &str, record: &DeploymentRecord) -> Result<(), ScriptError> {
        self.ensure_chain_id()?;
        write_json_file(
            &self.record_path(alias),
            record,
            ScriptError::WriteDeployments,
        )?;
        debug!("Saved `{alias}` at {:#x}", record.address);
        Ok(())
    }
}

/// A ledger held in memory, for dry runs and tests
#[derive(Default)]
pub struct MemoryLedger {
    /// The records, keyed by alias
    records: HashMap<String, DeploymentRecord>,
}

impl DeploymentStore for MemoryLedger {
    fn get(&self, alias: &str) -> Result<Option<DeploymentRecord>, ScriptError> {
        Ok(self.records.get(alias).cloned())
    }

    fn save(&mut self, alias: &str, record: &DeploymentRecord) -> Result<(), ScriptError> {
        self.records.insert(alias.to_string(), record.clone());
        Ok(())
    }
}
