//! The proxy reconciler: brings an upgradeable deployment in line with the
//! current compiled implementation.
//!
//! A pass ends in one of the [`ReconcileAction`]s:
//! - no record for the alias: deploy implementation and proxy
//! - proxy already points at the current implementation: no chain writes
//! - proxy points elsewhere: validate, then upgrade through the authority
//!   classifier, which may defer the upgrade to the multisig
//!
//! The proxy's implementation slot is read from the chain on every pass;
//! the ledger only caches it.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{SolCall, SolValue};
use tracing::{info, warn};

use crate::{
    artifacts::{ArtifactProvider, ContractArtifact},
    authority::AuthorityClassifier,
    chain::{read_call, ChainClient},
    constants::{IMPLEMENTATION_STORAGE_SLOT, PROXY_CONTRACT_TYPE},
    errors::ScriptError,
    ledger::DeploymentStore,
    solidity::IPool,
    types::{
        implementation_alias, proxy_alias, CallDisposition, DeploymentRecord, InitCall,
        PendingCall, ProxyDeployment, ReconcileAction, ReconcileOutcome,
    },
    utils::{address_from_slot, encode_constructor_args, encode_init_call},
    validator::UpgradeValidator,
};

/// Deploys and upgrades proxied contracts, keeping the ledger current
pub struct ProxyReconciler<C: ChainClient> {
    /// The chain deployments are made on
    chain: Arc<C>,
    /// The deployment records; this reconciler is their only writer
    ledger: Box<dyn DeploymentStore>,
    /// The source of compiled contracts
    artifacts: Box<dyn ArtifactProvider>,
    /// The storage-layout check run before every upgrade
    validator: Box<dyn UpgradeValidator>,
}

impl<C: ChainClient> ProxyReconciler<C> {
    /// Create a reconciler
    pub fn new(
        chain: Arc<C>,
        ledger: Box<dyn DeploymentStore>,
        artifacts: Box<dyn ArtifactProvider>,
        validator: Box<dyn UpgradeValidator>,
    ) -> Self {
        Self {
            chain,
            ledger,
            artifacts,
            validator,
        }
    }

    /// The deployment records
    pub fn ledger(&self) -> &dyn DeploymentStore {
        self.ledger.as_ref()
    }

    /// Ensure the alias is deployed behind a proxy running the current
    /// implementation of its contract type
    pub async fn reconcile(
        &mut self,
        request: &ProxyDeployment,
        classifier: &mut AuthorityClassifier<C>,
    ) -> Result<ReconcileOutcome, ScriptError> {
        self.require_signer()?;
        let ProxyDeployment {
            alias,
            contract_type,
            init,
        } = request;
        let artifact = self.artifacts.artifact(contract_type)?;

        // The record for the alias describes the implementation the proxy
        // was last moved to, so it is what the new code must be compatible with
        let previous = self.ledger.get(alias)?;
        if let Some(previous) = &previous {
            self.validator.validate(previous, contract_type, &artifact)?;
        }

        let (implementation, implementation_deployed) =
            self.ensure_implementation(contract_type, &artifact).await?;

        let proxy_alias = proxy_alias(alias);
        let Some(proxy) = self.ledger.get(&proxy_alias)? else {
            return self.deploy_proxy(alias, &implementation, init).await;
        };

        let on_chain = address_from_slot(
            self.chain
                .storage_at(proxy.address, IMPLEMENTATION_STORAGE_SLOT)
                .await?,
        );

        let Some(previous) = previous else {
            return self
                .recover_alias_record(alias, &proxy, &implementation, on_chain)
                .map(|action| ReconcileOutcome {
                    address: proxy.address,
                    implementation: implementation.address,
                    newly_deployed: false,
                    implementation_deployed,
                    action,
                });
        };

        let ledger_stale = proxy.implementation != Some(implementation.address)
            || previous.implementation != Some(implementation.address)
            || previous.address != proxy.address;
        if ledger_stale {
            self.save_proxied(alias, &proxy, &implementation)?;
        }

        let action = if on_chain == implementation.address {
            if ledger_stale {
                info!(
                    "`{alias}` proxy at {:#x} already points to {:#x}, ledger updated",
                    proxy.address, implementation.address
                );
                ReconcileAction::ImplementationOnly
            } else {
                info!(
                    "`{alias}` at {:#x} is up to date ({:#x})",
                    proxy.address, implementation.address
                );
                ReconcileAction::NoOp
            }
        } else {
            self.upgrade(alias, proxy.address, on_chain, implementation.address, classifier)
                .await?
        };

        Ok(ReconcileOutcome {
            address: proxy.address,
            implementation: implementation.address,
            newly_deployed: false,
            implementation_deployed,
            action,
        })
    }

    /// Fail before any ledger read or chain write when no deployer key is configured
    fn require_signer(&self) -> Result<Address, ScriptError> {
        self.chain.signer().ok_or_else(|| {
            ScriptError::MissingAuthority("deploying requires a deployer key".to_string())
        })
    }

    /// Deploy the shared implementation of `contract_type` on its own,
    /// reusing the recorded one when its bytecode is unchanged.
    ///
    /// Returns the implementation address and whether it was newly deployed.
    pub async fn deploy_implementation(
        &mut self,
        contract_type: &str,
    ) -> Result<(Address, bool), ScriptError> {
        self.require_signer()?;
        let artifact = self.artifacts.artifact(contract_type)?;
        let (record, deployed) = self.ensure_implementation(contract_type, &artifact).await?;
        Ok((record.address, deployed))
    }

    /// Deploy `artifact` as the implementation of `contract_type` unless an
    /// implementation with identical bytecode is recorded
    async fn ensure_implementation(
        &mut self,
        contract_type: &str,
        artifact: &ContractArtifact,
    ) -> Result<(DeploymentRecord, bool), ScriptError> {
        let alias = implementation_alias(contract_type);
        if let Some(existing) = self.ledger.get(&alias)? {
            if existing.bytecode_hash() == artifact.bytecode_hash() {
                info!(
                    "Reusing `{alias}` at {:#x}, bytecode unchanged",
                    existing.address
                );
                return Ok((existing, false));
            }
        }

        let deployed = self.chain.deploy(artifact.bytecode.clone()).await?;
        let record = DeploymentRecord {
            address: deployed.address,
            abi: artifact.abi.clone(),
            bytecode: artifact.bytecode.clone(),
            implementation: None,
            args: vec![],
            storage_layout: artifact.storage_layout.clone(),
            transaction_hash: Some(deployed.tx_hash),
        };
        self.ledger.save(&alias, &record)?;

        info!(
            "Deployed `{alias}` at {:#x} (tx {:#x})",
            deployed.address, deployed.tx_hash
        );
        Ok((record, true))
    }

    /// Deploy a plain, non-proxied contract under `alias`, skipping the
    /// deployment when the recorded one has the same bytecode and arguments.
    ///
    /// Returns the address and whether it was newly deployed.
    pub async fn deploy_contract(
        &mut self,
        alias: &str,
        contract_type: &str,
        args: Vec<String>,
    ) -> Result<(Address, bool), ScriptError> {
        self.require_signer()?;
        let artifact = self.artifacts.artifact(contract_type)?;
        let encoded_args = encode_constructor_args(&artifact.abi, &args)?;

        if let Some(existing) = self.ledger.get(alias)? {
            if existing.bytecode_hash() == artifact.bytecode_hash() && existing.args == args {
                info!("Reusing `{alias}` at {:#x}", existing.address);
                return Ok((existing.address, false));
            }
        }

        let init_code = [artifact.bytecode.as_ref(), encoded_args.as_ref()].concat();
        let deployed = self.chain.deploy(init_code.into()).await?;
        let record = DeploymentRecord {
            address: deployed.address,
            abi: artifact.abi,
            bytecode: artifact.bytecode,
            implementation: None,
            args,
            storage_layout: artifact.storage_layout,
            transaction_hash: Some(deployed.tx_hash),
        };
        self.ledger.save(alias, &record)?;

        info!("Deployed `{alias}` at {:#x}", deployed.address);
        Ok((deployed.address, true))
    }

    /// Deploy an `ERC1967Proxy` in front of `implementation`, initializing it
    /// in the same transaction
    async fn deploy_proxy(
        &mut self,
        alias: &str,
        implementation: &DeploymentRecord,
        init: &InitCall,
    ) -> Result<ReconcileOutcome, ScriptError> {
        let init_data = encode_init_call(&implementation.abi, init)?;
        let proxy_artifact = self.artifacts.artifact(PROXY_CONTRACT_TYPE)?;
        let constructor_args = (implementation.address, init_data.clone()).abi_encode_params();
        let init_code = [proxy_artifact.bytecode.as_ref(), constructor_args.as_slice()].concat();

        let deployed = self.chain.deploy(init_code.into()).await?;
        let proxy = DeploymentRecord {
            address: deployed.address,
            abi: proxy_artifact.abi,
            bytecode: proxy_artifact.bytecode,
            implementation: Some(implementation.address),
            args: vec![implementation.address.to_string(), init_data.to_string()],
            storage_layout: None,
            transaction_hash: Some(deployed.tx_hash),
        };
        self.save_proxied(alias, &proxy, implementation)?;

        info!(
            "Deployed `{alias}` proxy at {:#x} pointing to {:#x}, initialized with `{}`",
            deployed.address, implementation.address, init.method
        );
        Ok(ReconcileOutcome {
            address: deployed.address,
            implementation: implementation.address,
            newly_deployed: true,
            implementation_deployed: true,
            action: ReconcileAction::FreshDeploy,
        })
    }

    /// Point the proxy at the new implementation through its governor
    async fn upgrade(
        &mut self,
        alias: &str,
        proxy: Address,
        current: Address,
        implementation: Address,
        classifier: &mut AuthorityClassifier<C>,
    ) -> Result<ReconcileAction, ScriptError> {
        let governor = read_call(&*self.chain, proxy, IPool::governorCall {}).await?;
        let call = PendingCall::new(
            proxy,
            IPool::upgradeToAndCallCall {
                newImplementation: implementation,
                data: Bytes::new(),
            }
            .abi_encode(),
        )?;

        info!("Upgrading `{alias}` at {proxy:#x} from {current:#x} to {implementation:#x}");
        match classifier.execute_or_defer(governor, call).await? {
            CallDisposition::Executed { .. } => {
                info!("Upgraded `{alias}` to {implementation:#x}");
                Ok(ReconcileAction::Upgraded)
            }
            CallDisposition::Deferred { .. } => Ok(ReconcileAction::UpgradeDeferred),
        }
    }

    /// Rebuild the alias record of a proxy whose first deployment was
    /// interrupted after the proxy record was saved.
    ///
    /// The record can only be rebuilt when the proxy already runs the current
    /// implementation; otherwise there is nothing to validate an upgrade against.
    fn recover_alias_record(
        &mut self,
        alias: &str,
        proxy: &DeploymentRecord,
        implementation: &DeploymentRecord,
        on_chain: Address,
    ) -> Result<ReconcileAction, ScriptError> {
        if on_chain != implementation.address {
            return Err(ScriptError::ReadDeployments(format!(
                "`{}` exists without `{alias}` and points to {on_chain:#x}, not {:#x}; \
                 restore the `{alias}` record before upgrading",
                proxy_alias(alias),
                implementation.address
            )));
        }

        warn!("Restoring missing `{alias}` record for proxy {:#x}", proxy.address);
        self.save_proxied(alias, proxy, implementation)?;
        Ok(ReconcileAction::ImplementationOnly)
    }

    /// Write the proxy and alias records for a proxy running `implementation`
    fn save_proxied(
        &mut self,
        alias: &str,
        proxy: &DeploymentRecord,
        implementation: &DeploymentRecord,
    ) -> Result<(), ScriptError> {
        let proxy_record = DeploymentRecord {
            implementation: Some(implementation.address),
            ..proxy.clone()
        };
        self.ledger.save(&proxy_alias(alias), &proxy_record)?;

        // The alias carries the implementation's ABI at the proxy's address
        let alias_record = DeploymentRecord {
            address: proxy.address,
            implementation: Some(implementation.address),
            ..implementation.clone()
        };
        self.ledger.save(alias, &alias_record)
    }
}
