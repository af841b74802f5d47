//! The configuration resolved once at startup and threaded through every command

use std::{path::PathBuf, str::FromStr};

use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::Address;

use crate::{
    cli::Cli,
    constants::{SAFE_SERVICE_BASE_URL, YIELD_VAULT},
    errors::ScriptError,
    executor::ExecutionMode,
    networks::{address_book, network, AddressBook, NetworkClass, NetworkProfile},
    safe::SafeApiClient,
    types::{InitCall, ProxyDeployment},
};

/// Everything a run needs to know about where and as whom it deploys
pub struct DeployConfig {
    /// The target network
    pub network: &'static NetworkProfile,
    /// The RPC endpoint
    pub rpc_url: String,
    /// The deployer's key, if one is configured
    pub signer: Option<PrivateKeySigner>,
    /// The root directory of the deployment records; each network keeps its
    /// records in a subdirectory named after it
    pub deployments_dir: PathBuf,
    /// The directory holding compilation artifacts
    pub artifacts_dir: PathBuf,
    /// The file holding calls deferred to the multisig
    pub batch_file: PathBuf,
    /// The Safe Transaction Service URL, overriding the hosted one
    pub safe_service_url: Option<String>,
    /// The Safe Transaction Service API key
    pub safe_api_key: Option<String>,
}

impl DeployConfig {
    /// Resolve the configuration from the command line
    pub fn from_cli(cli: &Cli) -> Result<Self, ScriptError> {
        let network = network(&cli.network)?;
        let signer = cli
            .priv_key
            .as_deref()
            .map(PrivateKeySigner::from_str)
            .transpose()
            .map_err(|e| ScriptError::ClientInitialization(format!("invalid deployer key: {e}")))?;

        Ok(Self {
            network,
            rpc_url: cli.rpc_url.clone(),
            signer,
            deployments_dir: cli.deployments_dir.clone(),
            artifacts_dir: cli.artifacts_dir.clone(),
            batch_file: cli.batch_file.clone(),
            safe_service_url: cli.safe_service_url.clone(),
            safe_api_key: cli.safe_api_key.clone(),
        })
    }

    /// The deployer's address
    pub fn deployer(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    /// The well-known addresses of the target chain
    pub fn addresses(&self) -> Result<AddressBook, ScriptError> {
        address_book(self.network.chain_id)
    }

    /// The Safe Transaction Service URL for the target chain
    pub fn safe_service_url(&self) -> Result<String, ScriptError> {
        if let Some(url) = &self.safe_service_url {
            return Ok(url.clone());
        }

        let prefix = self.network.safe_service_prefix.ok_or_else(|| {
            ScriptError::UnknownNetwork(format!(
                "no hosted Safe Transaction Service for `{}`, pass --safe-service-url",
                self.network.name
            ))
        })?;
        Ok(format!("{SAFE_SERVICE_BASE_URL}/{prefix}"))
    }

    /// Select how deferred calls are flushed on the target network
    pub fn execution_mode(&self) -> Result<ExecutionMode, ScriptError> {
        let safe = self.addresses()?.gnosis_safe;
        match self.network.class {
            NetworkClass::Local => Ok(ExecutionMode::LocalImpersonation { authority: safe }),
            NetworkClass::Public => {
                // The deployer proposes as a delegate of the Safe
                let signer = self.signer.clone().ok_or_else(|| {
                    ScriptError::MissingAuthority(
                        "a deployer key is required to propose to the Safe".to_string(),
                    )
                })?;
                let service =
                    SafeApiClient::new(&self.safe_service_url()?, self.safe_api_key.clone())?;

                Ok(ExecutionMode::ExternalProposal {
                    safe,
                    service: Box::new(service),
                    signer,
                })
            }
        }
    }
}

// ---------
// | Pools |
// ---------

/// A pool the scripts know how to deploy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolDefinition {
    /// The pool's alias, which is also its token symbol
    pub alias: &'static str,
    /// The pool's token name
    pub name: &'static str,
    /// The implementation contract type
    pub contract_type: &'static str,
}

/// Every pool the scripts know how to deploy
pub const POOLS: &[PoolDefinition] = &[PoolDefinition {
    alias: "vaETH",
    name: "Vesper ETH",
    contract_type: YIELD_VAULT,
}];

/// Look up a pool by alias
pub fn pool(alias: &str) -> Result<&'static PoolDefinition, ScriptError> {
    POOLS
        .iter()
        .find(|p| p.alias == alias)
        .ok_or_else(|| ScriptError::UnknownPool(alias.to_string()))
}

impl PoolDefinition {
    /// The proxy deployment of the pool, initialized with its name, symbol
    /// and collateral token
    pub fn deployment(&self, addresses: &AddressBook) -> ProxyDeployment {
        ProxyDeployment {
            alias: self.alias.to_string(),
            contract_type: self.contract_type.to_string(),
            init: InitCall::new(vec![
                self.name.to_string(),
                self.alias.to_string(),
                addresses.weth.to_string(),
            ]),
        }
    }
}
