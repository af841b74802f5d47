//! The chain client: the narrow surface of RPC operations the scripts need

use alloy::{
    network::{Ethereum, TransactionBuilder},
    primitives::utils::parse_ether,
    providers::{ext::AnvilApi, DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use tracing::debug;

use crate::{constants::IMPERSONATED_BALANCE_ETHER, errors::ScriptError, types::PendingCall};

/// A contract created on-chain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeployedContract {
    /// The address of the new contract
    pub address: Address,
    /// The hash of the creating transaction
    pub tx_hash: B256,
}

/// The on-chain operations used by deployment and configuration
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The address of the active signer, if a signing key is configured
    fn signer(&self) -> Option<Address>;

    /// The ID of the connected chain
    async fn chain_id(&self) -> Result<u64, ScriptError>;

    /// Create a contract from `init_code` (bytecode followed by encoded
    /// constructor arguments), awaiting the receipt
    async fn deploy(&self, init_code: Bytes) -> Result<DeployedContract, ScriptError>;

    /// Execute a read-only call against the latest block
    async fn read(&self, to: Address, data: Bytes) -> Result<Bytes, ScriptError>;

    /// Read a raw storage word
    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ScriptError>;

    /// Submit `call` from the active signer, awaiting the receipt
    async fn send(&self, call: &PendingCall) -> Result<B256, ScriptError>;

    /// Allow `who` to send transactions without its key, funding it for gas.
    /// Only development nodes support this.
    async fn impersonate(&self, who: Address) -> Result<(), ScriptError>;

    /// Submit `call` from an impersonated account, awaiting the receipt
    async fn send_as(&self, from: Address, call: &PendingCall) -> Result<B256, ScriptError>;
}

/// Execute a typed read-only call, decoding its return value
pub async fn read_call<C: SolCall, T: ChainClient + ?Sized>(
    chain: &T,
    to: Address,
    call: C,
) -> Result<C::Return, ScriptError> {
    let raw = chain.read(to, call.abi_encode().into()).await?;
    C::abi_decode_returns(&raw).map_err(|e| {
        ScriptError::ContractInteraction(format!("decoding `{}` from {to:#x}: {e}", C::SIGNATURE))
    })
}

/// A [`ChainClient`] over a JSON-RPC endpoint
pub struct RpcChainClient {
    /// The provider signing with the deployer's key
    provider: DynProvider<Ethereum>,
    /// A provider leaving signing to the node, used for impersonated accounts
    node_signed: DynProvider<Ethereum>,
    /// The deployer's address
    signer: Option<Address>,
}

impl RpcChainClient {
    /// Connect to `rpc_url`, signing with `signer` when given
    pub fn new(rpc_url: &str, signer: Option<PrivateKeySigner>) -> Result<Self, ScriptError> {
        let url = Url::parse(rpc_url).map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

        let node_signed = DynProvider::new(ProviderBuilder::new().connect_http(url.clone()));
        let signer_address = signer.as_ref().map(|s| s.address());
        let provider = match signer {
            Some(signer) => {
                DynProvider::new(ProviderBuilder::new().wallet(signer).connect_http(url))
            }
            None => node_signed.clone(),
        };

        Ok(Self {
            provider,
            node_signed,
            signer: signer_address,
        })
    }

    /// Build the transaction request for a privileged call
    fn call_request(call: &PendingCall) -> TransactionRequest {
        TransactionRequest::default()
            .with_to(call.to)
            .with_input(call.data.clone())
            .with_value(call.value)
    }
}

/// Fail with [`ScriptError::ExecutionReverted`] if the receipt reports a revert
fn ensure_success(receipt: &TransactionReceipt) -> Result<B256, ScriptError> {
    if receipt.status() {
        Ok(receipt.transaction_hash)
    } else {
        Err(ScriptError::ExecutionReverted(format!(
            "transaction {:#x} reverted",
            receipt.transaction_hash
        )))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn signer(&self) -> Option<Address> {
        self.signer
    }

    async fn chain_id(&self) -> Result<u64, ScriptError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))
    }

    async fn deploy(&self, init_code: Bytes) -> Result<DeployedContract, ScriptError> {
        let tx = TransactionRequest::default().with_deploy_code(init_code);
        let receipt = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| ScriptError::ContractDeployment(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| ScriptError::ContractDeployment(e.to_string()))?;

        let tx_hash =
            ensure_success(&receipt).map_err(|e| ScriptError::ContractDeployment(e.to_string()))?;
        let address = receipt.contract_address.ok_or_else(|| {
            ScriptError::ContractDeployment(format!("no contract created by {tx_hash:#x}"))
        })?;

        Ok(DeployedContract { address, tx_hash })
    }

    async fn read(&self, to: Address, data: Bytes) -> Result<Bytes, ScriptError> {
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        self.provider
            .call(tx)
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ScriptError> {
        let word = self
            .provider
            .get_storage_at(address, U256::from_be_bytes(slot.0))
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

        Ok(B256::from(word.to_be_bytes::<32>()))
    }

    async fn send(&self, call: &PendingCall) -> Result<B256, ScriptError> {
        let receipt = self
            .provider
            .send_transaction(Self::call_request(call))
            .await
            .map_err(|e| ScriptError::ExecutionReverted(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| ScriptError::ExecutionReverted(e.to_string()))?;

        ensure_success(&receipt)
    }

    async fn impersonate(&self, who: Address) -> Result<(), ScriptError> {
        let balance = parse_ether(IMPERSONATED_BALANCE_ETHER)
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

        self.node_signed
            .anvil_impersonate_account(who)
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;
        self.node_signed
            .anvil_set_balance(who, balance)
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

        debug!("Impersonating {who:#x}");
        Ok(())
    }

    async fn send_as(&self, from: Address, call: &PendingCall) -> Result<B256, ScriptError> {
        let tx = Self::call_request(call).with_from(from);
        let receipt = self
            .node_signed
            .send_transaction(tx)
            .await
            .map_err(|e| ScriptError::ExecutionReverted(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| ScriptError::ExecutionReverted(e.to_string()))?;

        ensure_success(&receipt)
    }
}
