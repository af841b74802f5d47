//! The batch executor: flushes the multisig queue, either by replaying it as
//! the impersonated authority or by proposing it to the Safe

use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::Address;
use tracing::{info, warn};

use crate::{
    chain::ChainClient,
    errors::ScriptError,
    queue::BatchQueue,
    safe::{sign_safe_hash, CoSigningService, SafeProposal, SafeTransaction},
    types::{FlushOutcome, PendingCall},
};

/// How queued calls reach the chain, chosen once per network
pub enum ExecutionMode {
    /// Development networks: the node lets the scripts send as the authority
    LocalImpersonation {
        /// The multisig whose identity is assumed
        authority: Address,
    },
    /// Public networks: the batch is proposed for the Safe owners to sign
    ExternalProposal {
        /// The Safe the proposal is made to
        safe: Address,
        /// The service collecting signatures
        service: Box<dyn CoSigningService>,
        /// The Safe delegate signing the proposal
        signer: PrivateKeySigner,
    },
}

/// Executes or proposes the calls deferred to the multisig
pub struct BatchExecutor<C: ChainClient> {
    /// The chain the calls target
    chain: Arc<C>,
    /// The execution strategy
    mode: ExecutionMode,
}

impl<C: ChainClient> BatchExecutor<C> {
    /// An executor using `mode`
    pub fn new(chain: Arc<C>, mode: ExecutionMode) -> Self {
        Self { chain, mode }
    }

    /// The execution strategy
    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// Execute or propose every queued call, in queue order.
    ///
    /// The queue is emptied only once the calls were executed or the proposal
    /// accepted; on failure every call stays queued for the next flush.
    pub async fn flush(&self, queue: &mut BatchQueue) -> Result<FlushOutcome, ScriptError> {
        if queue.is_empty() {
            info!("No multisig calls pending");
            return Ok(FlushOutcome::Empty);
        }

        let calls = queue.drain_all();
        let res = match &self.mode {
            ExecutionMode::LocalImpersonation { authority } => {
                self.replay_as(*authority, &calls).await
            }
            ExecutionMode::ExternalProposal {
                safe,
                service,
                signer,
            } => self.propose(*safe, service.as_ref(), signer, &calls).await,
        };

        match res {
            Ok(outcome) => {
                queue.commit()?;
                Ok(outcome)
            }
            Err(e) => {
                warn!("Flushing {} multisig calls failed, keeping them queued", calls.len());
                if let Err(restore_err) = queue.restore() {
                    warn!("Could not persist the restored batch: {restore_err}");
                }
                Err(e)
            }
        }
    }

    /// Send each call as the impersonated authority, awaiting each receipt
    async fn replay_as(
        &self,
        authority: Address,
        calls: &[PendingCall],
    ) -> Result<FlushOutcome, ScriptError> {
        self.chain.impersonate(authority).await?;
        for call in calls {
            let tx_hash = self.chain.send_as(authority, call).await?;
            info!("Executed call to {:#x} as {authority:#x} in {tx_hash:#x}", call.to);
        }

        info!("Executed {} multisig calls as the impersonated multisig", calls.len());
        Ok(FlushOutcome::Executed { calls: calls.len() })
    }

    /// Propose the calls to the Safe as one signed transaction
    async fn propose(
        &self,
        safe: Address,
        service: &dyn CoSigningService,
        signer: &PrivateKeySigner,
        calls: &[PendingCall],
    ) -> Result<FlushOutcome, ScriptError> {
        info!("Proposing multisig batch of {} calls to {safe:#x}", calls.len());
        let chain_id = self.chain.chain_id().await?;
        let nonce = service.next_nonce(safe).await?;

        let transaction = SafeTransaction::batch(calls, nonce)?;
        let safe_tx_hash = transaction.signing_hash(chain_id, safe);
        let signature = sign_safe_hash(safe_tx_hash, signer)?;

        // Logged before submitting so a lost acknowledgement can be traced
        info!("Safe transaction {safe_tx_hash:#x} (nonce {nonce})");
        service
            .propose(&SafeProposal {
                safe,
                transaction,
                safe_tx_hash,
                signature,
                sender: signer.address(),
            })
            .await?;

        info!("Multisig tx {safe_tx_hash:#x} was proposed");
        info!("Wait for the tx to be confirmed (at least 2 confirmations are recommended)");
        info!("After confirmation, run the deployment again so the deployment records catch up");
        Ok(FlushOutcome::Proposed {
            safe_tx_hash,
            nonce,
            calls: calls.len(),
        })
    }
}
