//! In-memory stand-ins for the chain, the Safe Transaction Service and the
//! storage-layout validator

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use scripts::{
    artifacts::ContractArtifact,
    chain::{ChainClient, DeployedContract},
    constants::IMPLEMENTATION_STORAGE_SLOT,
    errors::ScriptError,
    queue::BatchStore,
    safe::{CoSigningService, SafeProposal},
    solidity::IPool,
    types::{DeploymentRecord, PendingCall},
    validator::{StorageLayoutValidator, UpgradeValidator},
};

// --------------
// | MOCK CHAIN |
// --------------

/// The state of a proxy deployed on the mock chain
#[derive(Clone, Debug, Default)]
pub struct MockPool {
    /// The governor, the only account allowed to configure the pool
    pub governor: Address,
    /// The pool's keepers
    pub keepers: Vec<Address>,
    /// The pool's maintainers
    pub maintainers: Vec<Address>,
    /// The calldata the proxy was initialized with
    pub init_data: Bytes,
}

/// A transaction the mock chain accepted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentCall {
    /// The sender
    pub from: Address,
    /// The call
    pub call: PendingCall,
}

/// Everything the mock chain remembers
#[derive(Default)]
struct ChainState {
    /// The deployer's nonce, used to derive contract addresses
    nonce: u64,
    /// The init code of every contract creation, in order
    deployments: Vec<Bytes>,
    /// Raw storage
    storage: HashMap<(Address, B256), B256>,
    /// Deployed proxies
    pools: HashMap<Address, MockPool>,
    /// Every accepted call, in order
    sent: Vec<SentCall>,
    /// Accounts the node lets us send as
    impersonated: Vec<Address>,
    /// Whether sends should fail
    reverting: bool,
    /// The number of transactions, used to derive hashes
    tx_count: u64,
}

/// A chain that understands the proxy and pool calls the scripts make
pub struct MockChain {
    /// The chain ID
    chain_id: u64,
    /// The configured deployer
    signer: Option<Address>,
    /// The address contracts are created from
    creator: Address,
    /// The creation code of the proxy, used to recognize proxy deployments
    proxy_bytecode: Bytes,
    /// The governor new pools are assigned
    governor: Address,
    /// The mutable chain state
    state: Mutex<ChainState>,
}

impl MockChain {
    /// A chain on which pools deployed from `proxy_bytecode` are governed
    /// by `governor`
    pub fn new(
        chain_id: u64,
        signer: Option<Address>,
        proxy_bytecode: Bytes,
        governor: Address,
    ) -> Self {
        Self {
            chain_id,
            signer,
            creator: signer.unwrap_or(Address::repeat_byte(0xde)),
            proxy_bytecode,
            governor,
            state: Mutex::new(ChainState::default()),
        }
    }

    /// Lock the chain state
    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    /// The init code of every contract creation, in order
    pub fn deployments(&self) -> Vec<Bytes> {
        self.state().deployments.clone()
    }

    /// Every accepted call, in order
    pub fn sent(&self) -> Vec<SentCall> {
        self.state().sent.clone()
    }

    /// The accepted calls with the given selector
    pub fn sent_with_selector(&self, selector: [u8; 4]) -> Vec<SentCall> {
        self.sent()
            .into_iter()
            .filter(|s| s.call.selector() == Some(selector))
            .collect()
    }

    /// The accounts that were impersonated
    pub fn impersonated(&self) -> Vec<Address> {
        self.state().impersonated.clone()
    }

    /// The state of the pool at `address`
    pub fn pool(&self, address: Address) -> Option<MockPool> {
        self.state().pools.get(&address).cloned()
    }

    /// The implementation the proxy at `address` points to
    pub fn implementation_of(&self, address: Address) -> Address {
        let word = self
            .state()
            .storage
            .get(&(address, IMPLEMENTATION_STORAGE_SLOT))
            .copied()
            .unwrap_or_default();
        Address::from_slice(&word[12..])
    }

    /// Point a proxy at `implementation` directly, as an out-of-band upgrade would
    pub fn set_implementation(&self, proxy: Address, implementation: Address) {
        self.state().storage.insert(
            (proxy, IMPLEMENTATION_STORAGE_SLOT),
            implementation.into_word(),
        );
    }

    /// Make every subsequent send revert, or stop doing so
    pub fn set_reverting(&self, reverting: bool) {
        self.state().reverting = reverting;
    }

    /// Apply the effects of a call from `from`, as the pool contract would
    fn apply(&self, from: Address, call: &PendingCall) -> Result<B256, ScriptError> {
        let mut state = self.state();
        if state.reverting {
            return Err(ScriptError::ExecutionReverted("mock chain is reverting".to_string()));
        }

        let pool = state
            .pools
            .get_mut(&call.to)
            .ok_or_else(|| ScriptError::ExecutionReverted(format!("no pool at {:#x}", call.to)))?;
        if from != pool.governor {
            return Err(ScriptError::ExecutionReverted("not-governor".to_string()));
        }

        match call.selector() {
            Some(IPool::addKeeperCall::SELECTOR) => {
                let keeper = decode::<IPool::addKeeperCall>(&call.data)?.keeper;
                pool.keepers.push(keeper);
            }
            Some(IPool::addMaintainerCall::SELECTOR) => {
                let maintainer = decode::<IPool::addMaintainerCall>(&call.data)?.maintainer;
                pool.maintainers.push(maintainer);
            }
            Some(IPool::upgradeToAndCallCall::SELECTOR) => {
                let implementation =
                    decode::<IPool::upgradeToAndCallCall>(&call.data)?.newImplementation;
                state.storage.insert(
                    (call.to, IMPLEMENTATION_STORAGE_SLOT),
                    implementation.into_word(),
                );
            }
            _ => return Err(ScriptError::ExecutionReverted("unknown selector".to_string())),
        }

        state.sent.push(SentCall {
            from,
            call: call.clone(),
        });
        Ok(next_tx_hash(&mut state))
    }
}

/// Decode calldata of a known call
fn decode<C: SolCall>(data: &[u8]) -> Result<C, ScriptError> {
    C::abi_decode(data).map_err(|e| ScriptError::ExecutionReverted(e.to_string()))
}

/// A fresh transaction hash
fn next_tx_hash(state: &mut ChainState) -> B256 {
    state.tx_count += 1;
    keccak256(state.tx_count.to_be_bytes())
}

#[async_trait]
impl ChainClient for MockChain {
    fn signer(&self) -> Option<Address> {
        self.signer
    }

    async fn chain_id(&self) -> Result<u64, ScriptError> {
        Ok(self.chain_id)
    }

    async fn deploy(&self, init_code: Bytes) -> Result<DeployedContract, ScriptError> {
        let mut state = self.state();
        let address = self.creator.create(state.nonce);
        state.nonce += 1;
        state.deployments.push(init_code.clone());

        if let Some(args) = init_code.strip_prefix(self.proxy_bytecode.as_ref()) {
            let (implementation, init_data) = <(Address, Bytes)>::abi_decode_params(args)
                .map_err(|e| ScriptError::ContractDeployment(e.to_string()))?;
            state.storage.insert(
                (address, IMPLEMENTATION_STORAGE_SLOT),
                implementation.into_word(),
            );
            state.pools.insert(
                address,
                MockPool {
                    governor: self.governor,
                    init_data,
                    ..Default::default()
                },
            );
        }

        let tx_hash = next_tx_hash(&mut state);
        Ok(DeployedContract { address, tx_hash })
    }

    async fn read(&self, to: Address, data: Bytes) -> Result<Bytes, ScriptError> {
        let pool = self
            .pool(to)
            .ok_or_else(|| ScriptError::ContractInteraction(format!("no pool at {to:#x}")))?;

        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .unwrap_or_default();
        let encoded = match selector {
            IPool::governorCall::SELECTOR => (pool.governor,).abi_encode_params(),
            IPool::keepersCall::SELECTOR => (pool.keepers,).abi_encode_params(),
            IPool::maintainersCall::SELECTOR => (pool.maintainers,).abi_encode_params(),
            _ => {
                return Err(ScriptError::ContractInteraction(
                    "unknown selector".to_string(),
                ))
            }
        };

        Ok(encoded.into())
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ScriptError> {
        Ok(self
            .state()
            .storage
            .get(&(address, slot))
            .copied()
            .unwrap_or_default())
    }

    async fn send(&self, call: &PendingCall) -> Result<B256, ScriptError> {
        let from = self
            .signer
            .ok_or_else(|| ScriptError::MissingAuthority("no signer".to_string()))?;
        self.apply(from, call)
    }

    async fn impersonate(&self, who: Address) -> Result<(), ScriptError> {
        self.state().impersonated.push(who);
        Ok(())
    }

    async fn send_as(&self, from: Address, call: &PendingCall) -> Result<B256, ScriptError> {
        if !self.state().impersonated.contains(&from) {
            return Err(ScriptError::ExecutionReverted(format!(
                "{from:#x} is not impersonated"
            )));
        }
        self.apply(from, call)
    }
}

// ------------------
// | MOCK CO-SIGNER |
// ------------------

/// What the mock Safe Transaction Service has seen
#[derive(Default)]
struct CoSignerState {
    /// The nonce handed to the next proposal
    nonce: u64,
    /// Whether proposals should be rejected
    failing: bool,
    /// The accepted proposals
    proposals: Vec<SafeProposal>,
}

/// A Safe Transaction Service that records proposals in memory
#[derive(Clone, Default)]
pub struct MockCoSigner {
    /// The shared state, so tests can inspect it after handing the service over
    state: Arc<Mutex<CoSignerState>>,
}

impl MockCoSigner {
    /// A service whose next nonce is `nonce`
    pub fn with_nonce(nonce: u64) -> Self {
        let signer = Self::default();
        signer.state.lock().unwrap().nonce = nonce;
        signer
    }

    /// Reject every subsequent proposal, or stop doing so
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// The accepted proposals
    pub fn proposals(&self) -> Vec<SafeProposal> {
        self.state.lock().unwrap().proposals.clone()
    }
}

#[async_trait]
impl CoSigningService for MockCoSigner {
    async fn next_nonce(&self, _safe: Address) -> Result<u64, ScriptError> {
        Ok(self.state.lock().unwrap().nonce)
    }

    async fn propose(&self, proposal: &SafeProposal) -> Result<(), ScriptError> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            return Err(ScriptError::ProposalFailed("503 Service Unavailable".to_string()));
        }

        state.nonce = proposal.transaction.nonce + 1;
        state.proposals.push(proposal.clone());
        Ok(())
    }
}

// ----------------------
// | COUNTING VALIDATOR |
// ----------------------

/// A validator that counts its invocations, delegating to the storage-layout
/// check unless told to reject
#[derive(Clone, Default)]
pub struct CountingValidator {
    /// The number of validations run
    calls: Arc<AtomicUsize>,
    /// Whether every validation should fail
    reject: bool,
}

impl CountingValidator {
    /// A validator rejecting every upgrade
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    /// The number of validations run
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl UpgradeValidator for CountingValidator {
    fn validate(
        &self,
        old: &DeploymentRecord,
        contract_type: &str,
        new: &ContractArtifact,
    ) -> Result<(), ScriptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(ScriptError::StorageIncompatible(format!(
                "`{contract_type}` rejected"
            )));
        }

        StorageLayoutValidator.validate(old, contract_type, new)
    }
}


// ---------------------
// | FLAKY BATCH STORE |
// ---------------------

/// An in-memory batch store whose writes can be made to fail, as a full disk would
#[derive(Clone, Default)]
pub struct FlakyBatchStore {
    /// The persisted calls, shared between clones
    calls: Arc<Mutex<Vec<PendingCall>>>,
    /// Whether writes fail, shared between clones
    failing: Arc<AtomicBool>,
}

impl FlakyBatchStore {
    /// Fail every subsequent write, or stop doing so
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The persisted calls
    pub fn persisted(&self) -> Vec<PendingCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Fail if writes are disabled
    fn check_writable(&self) -> Result<(), ScriptError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ScriptError::WriteBatch("no space left on device".to_string()));
        }
        Ok(())
    }
}

impl BatchStore for FlakyBatchStore {
    fn load(&self) -> Result<Vec<PendingCall>, ScriptError> {
        Ok(self.persisted())
    }

    fn store(&mut self, calls: &[PendingCall]) -> Result<(), ScriptError> {
        self.check_writable()?;
        *self.calls.lock().unwrap() = calls.to_vec();
        Ok(())
    }

    fn delete(&mut self) -> Result<(), ScriptError> {
        self.check_writable()?;
        self.calls.lock().unwrap().clear();
        Ok(())
    }
}
