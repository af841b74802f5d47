//! Safe multisig proposals: batching queued calls into one Safe transaction,
//! hashing and signing it, and submitting it to the Safe Transaction Service

use alloy::signers::{local::PrivateKeySigner, SignerSync};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{eip712_domain, SolCall, SolStruct};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    constants::{ETH_SIGN_V_OFFSET, MULTI_SEND_CALL_ONLY_ADDRESS, SAFE_PROPOSAL_ORIGIN},
    errors::ScriptError,
    solidity::{multiSendCall, SafeTx},
    types::PendingCall,
};

/// The kind of call a Safe makes when executing a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SafeOperation {
    /// A regular call
    Call = 0,
    /// A delegate call, used to run `multiSend` in the Safe's context
    DelegateCall = 1,
}

/// A Safe transaction, before signing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeTransaction {
    /// The call's destination
    pub to: Address,
    /// The native token amount sent along
    pub value: U256,
    /// The calldata
    pub data: Bytes,
    /// How the Safe makes the call
    pub operation: SafeOperation,
    /// The Safe nonce the transaction occupies
    pub nonce: u64,
}

impl SafeTransaction {
    /// Build a single transaction executing `calls` in order.
    ///
    /// One call is proposed as is; several are packed into a `multiSend`
    /// delegate call to `MultiSendCallOnly`.
    pub fn batch(calls: &[PendingCall], nonce: u64) -> Result<Self, ScriptError> {
        match calls {
            [] => Err(ScriptError::CalldataConstruction(
                "cannot propose an empty batch".to_string(),
            )),
            [call] => Ok(Self {
                to: call.to,
                value: call.value,
                data: call.data.clone(),
                operation: SafeOperation::Call,
                nonce,
            }),
            calls => Ok(Self {
                to: MULTI_SEND_CALL_ONLY_ADDRESS,
                value: U256::ZERO,
                data: multiSendCall {
                    transactions: pack_multi_send(calls),
                }
                .abi_encode()
                .into(),
                operation: SafeOperation::DelegateCall,
                nonce,
            }),
        }
    }

    /// The EIP-712 hash a Safe owner or delegate signs for this transaction
    pub fn signing_hash(&self, chain_id: u64, safe: Address) -> B256 {
        let domain = eip712_domain!(
            chain_id: chain_id,
            verifying_contract: safe,
        );

        // No gas refunds, the executor pays for gas
        SafeTx {
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            operation: self.operation as u8,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            nonce: U256::from(self.nonce),
        }
        .eip712_signing_hash(&domain)
    }
}

/// Pack calls into the `multiSend` transactions encoding:
/// `operation (1) ‖ to (20) ‖ value (32) ‖ data length (32) ‖ data` per call
pub fn pack_multi_send(calls: &[PendingCall]) -> Bytes {
    let mut packed = Vec::new();
    for call in calls {
        packed.push(SafeOperation::Call as u8);
        packed.extend_from_slice(call.to.as_slice());
        packed.extend_from_slice(&call.value.to_be_bytes::<32>());
        packed.extend_from_slice(&U256::from(call.data.len()).to_be_bytes::<32>());
        packed.extend_from_slice(&call.data);
    }

    packed.into()
}

/// Sign a Safe transaction hash as an `eth_sign` message.
///
/// Safe tells `eth_sign` signatures apart from raw hash signatures by a `v`
/// shifted by 4.
pub fn sign_safe_hash(hash: B256, signer: &PrivateKeySigner) -> Result<Bytes, ScriptError> {
    let signature = signer
        .sign_message_sync(hash.as_slice())
        .map_err(|e| ScriptError::ProposalFailed(e.to_string()))?;

    let mut bytes = signature.as_bytes();
    bytes[64] += ETH_SIGN_V_OFFSET;
    Ok(Bytes::from(bytes.to_vec()))
}

/// A signed Safe transaction, ready to be proposed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeProposal {
    /// The Safe the transaction belongs to
    pub safe: Address,
    /// The proposed transaction
    pub transaction: SafeTransaction,
    /// The EIP-712 hash of the transaction
    pub safe_tx_hash: B256,
    /// The proposer's signature over `safe_tx_hash`
    pub signature: Bytes,
    /// The proposer, an owner or delegate of the Safe
    pub sender: Address,
}

/// The external service collecting multisig signatures
#[async_trait]
pub trait CoSigningService: Send + Sync {
    /// The nonce the next proposal for `safe` should use, accounting for
    /// proposals that are queued but not yet executed
    async fn next_nonce(&self, safe: Address) -> Result<u64, ScriptError>;

    /// Submit a signed proposal
    async fn propose(&self, proposal: &SafeProposal) -> Result<(), ScriptError>;
}

/// The body of a multisig transaction proposal
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProposeTransactionRequest {
    /// The checksummed destination
    to: String,
    /// The value, in wei
    value: String,
    /// The calldata
    data: Bytes,
    /// The [`SafeOperation`] as an integer
    operation: u8,
    /// The gas limit of the inner call, zero for all of it
    safe_tx_gas: String,
    /// The gas refunded on top of the inner call
    base_gas: String,
    /// The refund gas price
    gas_price: String,
    /// The refund token, zero for ether
    gas_token: String,
    /// The refund recipient, zero for the executor
    refund_receiver: String,
    /// The Safe nonce
    nonce: u64,
    /// The EIP-712 hash of the transaction
    contract_transaction_hash: B256,
    /// The checksummed proposer
    sender: String,
    /// The proposer's signature
    signature: Bytes,
    /// A free-form tag identifying the proposing tool
    origin: &'static str,
}

impl From<&SafeProposal> for ProposeTransactionRequest {
    fn from(proposal: &SafeProposal) -> Self {
        let tx = &proposal.transaction;
        Self {
            to: tx.to.to_checksum(None),
            value: tx.value.to_string(),
            data: tx.data.clone(),
            operation: tx.operation as u8,
            safe_tx_gas: "0".to_string(),
            base_gas: "0".to_string(),
            gas_price: "0".to_string(),
            gas_token: Address::ZERO.to_checksum(None),
            refund_receiver: Address::ZERO.to_checksum(None),
            nonce: tx.nonce,
            contract_transaction_hash: proposal.safe_tx_hash,
            sender: proposal.sender.to_checksum(None),
            signature: proposal.signature.clone(),
            origin: SAFE_PROPOSAL_ORIGIN,
        }
    }
}

/// A page of multisig transactions
#[derive(Debug, Deserialize)]
struct MultisigTransactionPage {
    /// The transactions on the page
    results: Vec<Value>,
}

/// Read a nonce the service may encode as either a number or a string
fn nonce_of(value: &Value) -> Option<u64> {
    match value.get("nonce")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// A client of the Safe Transaction Service
pub struct SafeApiClient {
    /// The HTTP client
    client: Client,
    /// The chain-specific service URL, e.g. `https://api.safe.global/tx-service/eth`
    base_url: String,
    /// The API key sent as a bearer token
    api_key: Option<String>,
}

impl SafeApiClient {
    /// A client of the service at `base_url`
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ScriptError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// The URL of the multisig transactions of `safe`
    fn transactions_path(safe: Address) -> String {
        format!("/api/v1/safes/{}/multisig-transactions/", safe.to_checksum(None))
    }

    /// Attach the API key, if any
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Send a GET request and decode the JSON response
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ScriptError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ScriptError::ProposalFailed(e.to_string()))?;

        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ScriptError::ProposalFailed(format!("decoding {path}: {e}")))
    }

    /// Map an unsuccessful response to [`ScriptError::ProposalFailed`]
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ScriptError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        let hint = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => " (check SAFE_API_KEY)",
            _ => "",
        };
        Err(ScriptError::ProposalFailed(format!(
            "Safe Transaction Service returned {status}{hint}: {message}"
        )))
    }
}

#[async_trait]
impl CoSigningService for SafeApiClient {
    async fn next_nonce(&self, safe: Address) -> Result<u64, ScriptError> {
        let info: Value = self
            .get(&format!("/api/v1/safes/{}/", safe.to_checksum(None)))
            .await?;
        let current = nonce_of(&info).ok_or_else(|| {
            ScriptError::ProposalFailed(format!("no nonce reported for Safe {safe:#x}"))
        })?;

        let pending: MultisigTransactionPage = self
            .get(&format!(
                "{}?executed=false&nonce__gte={current}&ordering=-nonce&limit=1",
                Self::transactions_path(safe)
            ))
            .await?;
        let next_pending = pending
            .results
            .first()
            .and_then(nonce_of)
            .map(|n| n + 1)
            .unwrap_or_default();

        Ok(current.max(next_pending))
    }

    async fn propose(&self, proposal: &SafeProposal) -> Result<(), ScriptError> {
        let url = format!("{}{}", self.base_url, Self::transactions_path(proposal.safe));
        let body = ProposeTransactionRequest::from(proposal);
        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ScriptError::ProposalFailed(e.to_string()))?;

        Self::check_status(response).await.map(|_| ())
    }
}
