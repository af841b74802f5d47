//! Routing of privileged calls: executed directly when the active signer is
//! the contract's authority, deferred to the multisig batch otherwise

use std::sync::Arc;

use alloy_primitives::Address;
use tracing::{info, warn};

use crate::{
    chain::ChainClient,
    errors::ScriptError,
    queue::BatchQueue,
    types::{CallDisposition, PendingCall},
};

/// Decides, per call, whether the active signer may execute it
pub struct AuthorityClassifier<C: ChainClient> {
    /// The chain the calls target
    chain: Arc<C>,
    /// The queue deferred calls are appended to
    queue: BatchQueue,
}

impl<C: ChainClient> AuthorityClassifier<C> {
    /// A classifier deferring to `queue`
    pub fn new(chain: Arc<C>, queue: BatchQueue) -> Self {
        Self { chain, queue }
    }

    /// The queue of deferred calls
    pub fn queue(&self) -> &BatchQueue {
        &self.queue
    }

    /// Mutable access to the queue of deferred calls, used when flushing
    pub fn queue_mut(&mut self) -> &mut BatchQueue {
        &mut self.queue
    }

    /// Execute `call` if the active signer is `authority`, otherwise queue it
    /// for the multisig.
    ///
    /// Reverts of directly executed calls are returned unchanged.
    pub async fn execute_or_defer(
        &mut self,
        authority: Address,
        call: PendingCall,
    ) -> Result<CallDisposition, ScriptError> {
        let signer = self.chain.signer().ok_or_else(|| {
            ScriptError::MissingAuthority("no deployer key is configured".to_string())
        })?;

        if signer == authority {
            let tx_hash = self.chain.send(&call).await?;
            info!("Executed call to {:#x} in {tx_hash:#x}", call.to);
            return Ok(CallDisposition::Executed { tx_hash });
        }

        warn!(
            "Signer {signer:#x} is not the authority {authority:#x}; the call to {:#x} will be executed by the multisig later in the flow",
            call.to
        );
        let queued = self.queue.push(call)?;
        Ok(CallDisposition::Deferred { queued })
    }
}
