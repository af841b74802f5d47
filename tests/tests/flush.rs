use alloy::signers::Signature;
use eyre::Result;
use scripts::{
    constants::{ETH_SIGN_V_OFFSET, MULTI_SEND_CALL_ONLY_ADDRESS},
    errors::ScriptError,
    networks::LOCAL_CHAIN_ID,
    queue::BatchQueue,
    safe::SafeOperation,
    types::{FlushOutcome, PendingCall, ReconcileAction},
};
use tests::{
    mocks::{FlakyBatchStore, MockCoSigner},
    utils::{TestEnv, VaultRevision},
};

/// Deploy the test pool with its roles deferred to the multisig
async fn setup_deferred_roles(env: &TestEnv) -> Result<()> {
    let request = env.pool_request()?;
    env.deployer()?
        .deploy_and_configure_pool(
            &request,
            env.addresses.pool_keeper,
            env.addresses.pool_maintainer,
        )
        .await?;
    assert_eq!(env.persisted_batch()?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_flush_empty_queue() -> Result<()> {
    let env = TestEnv::governed_by_multisig()?;

    let outcome = env
        .deployer()?
        .flush_pending_batch(&env.local_executor())
        .await?;
    assert_eq!(outcome, FlushOutcome::Empty);
    assert!(env.chain.impersonated().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_local_flush_replays_as_multisig() -> Result<()> {
    let env = TestEnv::governed_by_multisig()?;
    setup_deferred_roles(&env).await?;

    let mut deployer = env.deployer()?;
    let outcome = deployer.flush_pending_batch(&env.local_executor()).await?;
    assert_eq!(outcome, FlushOutcome::Executed { calls: 2 });
    assert!(deployer.queue().is_empty());
    assert!(!env.batch_file().exists());

    assert_eq!(env.chain.impersonated(), vec![env.addresses.gnosis_safe]);
    let sent = env.chain.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|s| s.from == env.addresses.gnosis_safe));

    // The roles took effect, so the next run has nothing to grant
    let request = env.pool_request()?;
    let rerun = env
        .deployer()?
        .deploy_and_configure_pool(
            &request,
            env.addresses.pool_keeper,
            env.addresses.pool_maintainer,
        )
        .await?;
    assert_eq!(rerun.keeper, None);
    assert_eq!(rerun.maintainer, None);
    assert!(env.persisted_batch()?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_deferred_upgrade_settles_after_flush() -> Result<()> {
    let mut env = TestEnv::governed_by_multisig()?;
    let request = env.pool_request()?;
    env.deployer()?.reconcile(&request).await?;

    env.compile_vault(VaultRevision::V2);
    let deferred = env.deployer()?.reconcile(&request).await?;
    assert_eq!(deferred.action, ReconcileAction::UpgradeDeferred);

    env.deployer()?
        .flush_pending_batch(&env.local_executor())
        .await?;
    assert_eq!(
        env.chain.implementation_of(deferred.address),
        deferred.implementation
    );

    let rerun = env.deployer()?.reconcile(&request).await?;
    assert_eq!(rerun.action, ReconcileAction::NoOp);

    Ok(())
}

#[tokio::test]
async fn test_failed_local_replay_keeps_queue() -> Result<()> {
    let env = TestEnv::governed_by_multisig()?;
    setup_deferred_roles(&env).await?;
    let before = env.persisted_batch()?;

    env.chain.set_reverting(true);
    let mut deployer = env.deployer()?;
    let res = deployer.flush_pending_batch(&env.local_executor()).await;
    assert!(matches!(res, Err(ScriptError::ExecutionReverted(_))));
    assert_eq!(deployer.queue().pending(), before.as_slice());
    assert_eq!(env.persisted_batch()?, before);

    Ok(())
}

#[tokio::test]
async fn test_batch_proposed_as_multi_send() -> Result<()> {
    let env = TestEnv::governed_by_multisig()?;
    setup_deferred_roles(&env).await?;
    let cosigner = MockCoSigner::with_nonce(7);

    let mut deployer = env.deployer()?;
    let outcome = deployer
        .flush_pending_batch(&env.proposal_executor(&cosigner))
        .await?;
    let FlushOutcome::Proposed {
        safe_tx_hash,
        nonce,
        calls,
    } = outcome
    else {
        panic!("expected a proposal, got {outcome:?}");
    };
    assert_eq!(nonce, 7);
    assert_eq!(calls, 2);
    assert!(deployer.queue().is_empty());
    assert!(env.persisted_batch()?.is_empty());

    // Nothing executes until the owners sign
    assert!(env.chain.sent().is_empty());
    assert!(env.chain.impersonated().is_empty());

    let proposals = cosigner.proposals();
    assert_eq!(proposals.len(), 1);
    let proposal = &proposals[0];
    assert_eq!(proposal.safe, env.addresses.gnosis_safe);
    assert_eq!(proposal.sender, env.signer.address());
    assert_eq!(proposal.safe_tx_hash, safe_tx_hash);
    assert_eq!(proposal.transaction.to, MULTI_SEND_CALL_ONLY_ADDRESS);
    assert_eq!(proposal.transaction.operation, SafeOperation::DelegateCall);
    assert_eq!(proposal.transaction.nonce, 7);
    assert_eq!(
        proposal
            .transaction
            .signing_hash(LOCAL_CHAIN_ID, env.addresses.gnosis_safe),
        safe_tx_hash
    );

    // The signature is an `eth_sign` over the Safe transaction hash
    let mut signature = proposal.signature.to_vec();
    signature[64] -= ETH_SIGN_V_OFFSET;
    let recovered = Signature::try_from(signature.as_slice())?
        .recover_address_from_msg(safe_tx_hash.as_slice())?;
    assert_eq!(recovered, env.signer.address());

    Ok(())
}

#[tokio::test]
async fn test_single_call_proposed_directly() -> Result<()> {
    let mut env = TestEnv::governed_by_multisig()?;
    let request = env.pool_request()?;
    env.deployer()?.reconcile(&request).await?;
    env.compile_vault(VaultRevision::V2);
    let deferred = env.deployer()?.reconcile(&request).await?;
    let batch = env.persisted_batch()?;

    let cosigner = MockCoSigner::default();
    env.deployer()?
        .flush_pending_batch(&env.proposal_executor(&cosigner))
        .await?;

    let proposals = cosigner.proposals();
    assert_eq!(proposals.len(), 1);
    let transaction = &proposals[0].transaction;
    assert_eq!(transaction.to, deferred.address);
    assert_eq!(transaction.data, batch[0].data);
    assert_eq!(transaction.operation, SafeOperation::Call);

    Ok(())
}

#[tokio::test]
async fn test_failed_proposal_keeps_queue() -> Result<()> {
    let env = TestEnv::governed_by_multisig()?;
    setup_deferred_roles(&env).await?;
    let before = env.persisted_batch()?;
    let cosigner = MockCoSigner::with_nonce(3);
    cosigner.set_failing(true);

    let mut deployer = env.deployer()?;
    let res = deployer
        .flush_pending_batch(&env.proposal_executor(&cosigner))
        .await;
    assert!(matches!(res, Err(ScriptError::ProposalFailed(_))));
    assert!(!res.unwrap_err().is_fatal());
    assert_eq!(deployer.queue().pending(), before.as_slice());
    assert_eq!(env.persisted_batch()?, before);
    assert!(cosigner.proposals().is_empty());

    // The next run proposes the same batch, in the same order
    cosigner.set_failing(false);
    let outcome = env
        .deployer()?
        .flush_pending_batch(&env.proposal_executor(&cosigner))
        .await?;
    assert!(matches!(outcome, FlushOutcome::Proposed { nonce: 3, calls: 2, .. }));
    assert!(env.persisted_batch()?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_failed_proposal_reported_when_batch_cannot_be_rewritten() -> Result<()> {
    let env = TestEnv::governed_by_multisig()?;
    let store = FlakyBatchStore::default();
    let mut queue = BatchQueue::open(Box::new(store.clone()))?;
    let calls = vec![
        PendingCall::new(env.addresses.pool_keeper, vec![1, 2, 3, 4])?,
        PendingCall::new(env.addresses.pool_maintainer, vec![5, 6, 7, 8])?,
    ];
    for call in &calls {
        queue.push(call.clone())?;
    }

    let cosigner = MockCoSigner::default();
    cosigner.set_failing(true);
    store.set_failing(true);

    // The proposal failure is what the caller sees, not the write failure
    let res = env.proposal_executor(&cosigner).flush(&mut queue).await;
    let err = res.unwrap_err();
    assert!(matches!(err, ScriptError::ProposalFailed(_)));
    assert!(!err.is_fatal());

    // The calls stay queued in memory and in the last good write
    assert_eq!(queue.pending(), calls.as_slice());
    assert_eq!(store.persisted(), calls);

    Ok(())
}
