//! The deployer: the entry points commands call, tying the reconciler, the
//! authority classifier and the batch executor together

use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;
use tracing::info;

use crate::{
    artifacts::FileArtifacts,
    authority::AuthorityClassifier,
    chain::{read_call, ChainClient},
    config::DeployConfig,
    constants::{YIELD_VAULT, YIELD_VAULT_FACTORY},
    errors::ScriptError,
    executor::BatchExecutor,
    ledger::FileLedger,
    queue::{BatchQueue, FileBatchStore},
    reconciler::ProxyReconciler,
    solidity::IPool,
    types::{
        implementation_alias, CallDisposition, FlushOutcome, PendingCall, ProxyDeployment,
        ReconcileOutcome,
    },
    validator::StorageLayoutValidator,
};

/// What configuring a pool's roles did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolOutcome {
    /// The result of reconciling the pool's proxy
    pub deployment: ReconcileOutcome,
    /// How the `addKeeper` call was handled, `None` if already a keeper
    pub keeper: Option<CallDisposition>,
    /// How the `addMaintainer` call was handled, `None` if already a maintainer
    pub maintainer: Option<CallDisposition>,
}

/// The deployment session for one network
pub struct Deployer<C: ChainClient> {
    /// The chain being deployed to
    chain: Arc<C>,
    /// Keeps the proxies and the ledger current
    reconciler: ProxyReconciler<C>,
    /// Routes privileged calls to the signer or the multisig queue
    classifier: AuthorityClassifier<C>,
}

impl<C: ChainClient> Deployer<C> {
    /// A session over the given components
    pub fn new(
        chain: Arc<C>,
        reconciler: ProxyReconciler<C>,
        classifier: AuthorityClassifier<C>,
    ) -> Self {
        Self {
            chain,
            reconciler,
            classifier,
        }
    }

    /// A session over the file-backed ledger, artifacts and batch queue
    /// named in `config`
    pub async fn open(config: &DeployConfig, chain: Arc<C>) -> Result<Self, ScriptError> {
        let chain_id = chain.chain_id().await?;
        if chain_id != config.network.chain_id {
            return Err(ScriptError::ClientInitialization(format!(
                "the RPC endpoint serves chain {chain_id}, but `{}` is chain {}",
                config.network.name, config.network.chain_id
            )));
        }

        let ledger = FileLedger::open(&config.deployments_dir, config.network.name, chain_id)?;
        let reconciler = ProxyReconciler::new(
            chain.clone(),
            Box::new(ledger),
            Box::new(FileArtifacts::new(config.artifacts_dir.clone())),
            Box::new(StorageLayoutValidator),
        );

        let queue = BatchQueue::open(Box::new(FileBatchStore::new(config.batch_file.clone())))?;
        if !queue.is_empty() {
            info!(
                "{} multisig calls from a previous run are pending in {}",
                queue.len(),
                config.batch_file.display()
            );
        }
        let classifier = AuthorityClassifier::new(chain.clone(), queue);

        Ok(Self::new(chain, reconciler, classifier))
    }

    /// The queue of calls deferred to the multisig
    pub fn queue(&self) -> &BatchQueue {
        self.classifier.queue()
    }

    /// The proxy reconciler
    pub fn reconciler(&self) -> &ProxyReconciler<C> {
        &self.reconciler
    }

    /// Ensure the alias runs the current implementation behind its proxy
    pub async fn reconcile(
        &mut self,
        request: &ProxyDeployment,
    ) -> Result<ReconcileOutcome, ScriptError> {
        self.reconciler.reconcile(request, &mut self.classifier).await
    }

    /// Make a governor-only call on the contract deployed as `alias`,
    /// executing it directly or deferring it to the multisig
    pub async fn configure_privileged(
        &mut self,
        alias: &str,
        data: impl Into<Bytes>,
    ) -> Result<CallDisposition, ScriptError> {
        let target = self.deployed_address(alias)?;
        let call = PendingCall::new(target, data)?;
        let governor = read_call(&*self.chain, target, IPool::governorCall {}).await?;

        self.classifier.execute_or_defer(governor, call).await
    }

    /// Execute or propose every call deferred to the multisig
    pub async fn flush_pending_batch(
        &mut self,
        executor: &BatchExecutor<C>,
    ) -> Result<FlushOutcome, ScriptError> {
        executor.flush(self.classifier.queue_mut()).await
    }

    /// Reconcile a pool, then grant the keeper and maintainer roles unless
    /// they are already held
    pub async fn deploy_and_configure_pool(
        &mut self,
        request: &ProxyDeployment,
        keeper: Address,
        maintainer: Address,
    ) -> Result<PoolOutcome, ScriptError> {
        let deployment = self.reconcile(request).await?;
        let pool = deployment.address;

        let keepers = read_call(&*self.chain, pool, IPool::keepersCall {}).await?;
        let keeper = if keepers.contains(&keeper) {
            info!("{keeper:#x} is already a keeper of `{}`", request.alias);
            None
        } else {
            let data = IPool::addKeeperCall { keeper }.abi_encode();
            Some(self.configure_privileged(&request.alias, data).await?)
        };

        let maintainers = read_call(&*self.chain, pool, IPool::maintainersCall {}).await?;
        let maintainer = if maintainers.contains(&maintainer) {
            info!("{maintainer:#x} is already a maintainer of `{}`", request.alias);
            None
        } else {
            let data = IPool::addMaintainerCall { maintainer }.abi_encode();
            Some(self.configure_privileged(&request.alias, data).await?)
        };

        Ok(PoolOutcome {
            deployment,
            keeper,
            maintainer,
        })
    }

    /// Deploy the implementation of `contract_type` without a proxy
    pub async fn deploy_implementation(
        &mut self,
        contract_type: &str,
    ) -> Result<(Address, bool), ScriptError> {
        self.reconciler.deploy_implementation(contract_type).await
    }

    /// Deploy the vault factory over the recorded vault implementation,
    /// owned by the deployer
    pub async fn deploy_factory(&mut self) -> Result<(Address, bool), ScriptError> {
        let owner = self.chain.signer().ok_or_else(|| {
            ScriptError::MissingAuthority("the factory owner is the deployer".to_string())
        })?;
        let implementation = self.deployed_address(&implementation_alias(YIELD_VAULT))?;
        info!("Using {YIELD_VAULT} implementation at {implementation:#x}");

        self.reconciler
            .deploy_contract(
                YIELD_VAULT_FACTORY,
                YIELD_VAULT_FACTORY,
                vec![implementation.to_string(), owner.to_string()],
            )
            .await
    }

    /// The recorded address of `alias`
    fn deployed_address(&self, alias: &str) -> Result<Address, ScriptError> {
        self.reconciler
            .ledger()
            .get(alias)?
            .map(|record| record.address)
            .ok_or_else(|| ScriptError::ReadDeployments(format!("`{alias}` is not deployed")))
    }
}
