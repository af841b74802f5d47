//! Type definitions used throughout the scripts

use std::collections::BTreeMap;

use alloy::json_abi::JsonAbi;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_INITIALIZER, IMPLEMENTATION_ALIAS_SUFFIX, PROXY_ALIAS_SUFFIX},
    errors::ScriptError,
};

// ----------------------
// | Deployment Records |
// ----------------------

/// The last known state of a deployed contract, keyed by its alias.
///
/// For a proxied alias, `address` is the proxy's address and
/// `implementation` the implementation it delegates to. Records for
/// implementations and plain contracts leave `implementation` unset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// The externally-visible address of the deployment
    pub address: Address,
    /// The ABI of the code reachable at `address`
    pub abi: JsonAbi,
    /// The creation bytecode, without constructor arguments
    #[serde(default, skip_serializing_if = "<[u8]>::is_empty")]
    pub bytecode: Bytes,
    /// The implementation a proxy currently points to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Address>,
    /// The constructor arguments the contract was deployed with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// The storage layout of the code reachable at `address`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_layout: Option<StorageLayout>,
    /// The hash of the deploying transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
}

impl DeploymentRecord {
    /// Whether the record describes a proxied deployment
    pub fn is_proxied(&self) -> bool {
        self.implementation.is_some()
    }

    /// The identity of the record's creation bytecode
    pub fn bytecode_hash(&self) -> B256 {
        keccak256(&self.bytecode)
    }
}

/// The name of the proxy record belonging to an alias
pub fn proxy_alias(alias: &str) -> String {
    format!("{alias}{PROXY_ALIAS_SUFFIX}")
}

/// The name of the shared implementation record of a contract type
pub fn implementation_alias(contract_type: &str) -> String {
    format!("{contract_type}{IMPLEMENTATION_ALIAS_SUFFIX}")
}

/// A contract's storage layout, as emitted by `solc --storage-layout`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    /// The state variables, in declaration order
    pub storage: Vec<StorageVariable>,
    /// The types referenced by `storage`, keyed by type identifier
    #[serde(default)]
    pub types: BTreeMap<String, StorageType>,
}

/// A single state variable in a storage layout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageVariable {
    /// The contract declaring the variable
    #[serde(default)]
    pub contract: String,
    /// The variable name
    pub label: String,
    /// The byte offset within the slot
    pub offset: u64,
    /// The slot index, as a decimal string
    pub slot: String,
    /// The type identifier, a key into [`StorageLayout::types`]
    #[serde(rename = "type")]
    pub type_id: String,
}

/// A type referenced from a storage layout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageType {
    /// The canonical type name
    pub label: String,
    /// The number of bytes the type occupies, as a decimal string
    pub number_of_bytes: String,
    /// The storage encoding, e.g. `inplace` or `mapping`
    #[serde(default)]
    pub encoding: String,
    /// The members of a struct type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<StorageVariable>,
}

// -------------------
// | Proxy Deploying |
// -------------------

/// The initializer invoked through the proxy's constructor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitCall {
    /// The initializer's method name
    pub method: String,
    /// The arguments, coerced to the initializer's ABI input types
    pub args: Vec<String>,
}

impl InitCall {
    /// An `initialize` call with the given arguments
    pub fn new(args: Vec<String>) -> Self {
        Self {
            method: DEFAULT_INITIALIZER.to_string(),
            args,
        }
    }
}

/// A request to ensure an upgradeable contract is deployed and current
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyDeployment {
    /// The logical name of the deployment
    pub alias: String,
    /// The artifact name of the implementation contract
    pub contract_type: String,
    /// The initializer used on first deployment
    pub init: InitCall,
}

/// The decision a reconciliation pass reached
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    /// No prior record existed; implementation and proxy were deployed
    FreshDeploy,
    /// The ledger and the chain were already current
    NoOp,
    /// The ledger moved to a new implementation the proxy already points to
    ImplementationOnly,
    /// The proxy was pointed at the new implementation
    Upgraded,
    /// The upgrade call was queued for the multisig
    UpgradeDeferred,
}

/// The result of reconciling an alias
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// The proxy address of the alias
    pub address: Address,
    /// The current implementation for the alias's contract type
    pub implementation: Address,
    /// Whether the proxy was deployed during this pass
    pub newly_deployed: bool,
    /// Whether the implementation was deployed during this pass, as opposed
    /// to reused because its bytecode was unchanged
    pub implementation_deployed: bool,
    /// The action taken
    pub action: ReconcileAction,
}

// ---------------------
// | Privileged Calls |
// ---------------------

/// A privileged call that may be executed directly or deferred to a multisig.
///
/// Two calls are the same call iff `to`, `data` and `value` are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCall")]
pub struct PendingCall {
    /// The destination of the call
    pub to: Address,
    /// The encoded calldata
    pub data: Bytes,
    /// The native token amount sent along
    #[serde(with = "decimal_u256")]
    pub value: U256,
}

impl PendingCall {
    /// A call carrying no native value
    pub fn new(to: Address, data: impl Into<Bytes>) -> Result<Self, ScriptError> {
        Self::try_from(RawCall {
            to: Some(to),
            data: Some(data.into()),
            value: None,
        })
    }

    /// The 4-byte function selector of the call
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.data.get(..4).and_then(|s| s.try_into().ok())
    }
}

/// A call as captured from a transaction request, where every field may be absent
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawCall {
    /// The destination of the call
    pub to: Option<Address>,
    /// The encoded calldata
    pub data: Option<Bytes>,
    /// The native token amount, zero when absent
    #[serde(default, with = "decimal_u256::option")]
    pub value: Option<U256>,
}

impl TryFrom<RawCall> for PendingCall {
    type Error = ScriptError;

    fn try_from(raw: RawCall) -> Result<Self, Self::Error> {
        let to = raw
            .to
            .ok_or_else(|| ScriptError::MalformedCallSpec("call has no destination".to_string()))?;
        let data = raw
            .data
            .filter(|data| !data.is_empty())
            .ok_or_else(|| ScriptError::MalformedCallSpec(format!("call to {to} has no data")))?;

        Ok(PendingCall {
            to,
            data,
            value: raw.value.unwrap_or_default(),
        })
    }
}

/// How a privileged call was handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallDisposition {
    /// The active signer is the authority and the call was mined
    Executed {
        /// The hash of the executed transaction
        tx_hash: B256,
    },
    /// The active signer is not the authority and the call was deferred
    Deferred {
        /// Whether the call was new to the queue, as opposed to a duplicate
        queued: bool,
    },
}

impl CallDisposition {
    /// Whether the call took effect on-chain during this run
    pub fn is_executed(&self) -> bool {
        matches!(self, CallDisposition::Executed { .. })
    }
}

/// The result of flushing the pending multisig batch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending
    Empty,
    /// The calls were replayed by the impersonated authority
    Executed {
        /// The number of calls replayed
        calls: usize,
    },
    /// The calls were proposed to the co-signing service as one batch
    Proposed {
        /// The Safe transaction hash of the proposal
        safe_tx_hash: B256,
        /// The Safe nonce the proposal occupies
        nonce: u64,
        /// The number of calls in the batch
        calls: usize,
    },
}

/// Serializes a [`U256`] as a decimal string, accepting decimal or `0x`-prefixed hex
pub mod decimal_u256 {
    use std::str::FromStr;

    use alloy_primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    /// Serialize as a decimal string
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    /// Deserialize from a decimal or hex string
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str(&s).map_err(D::Error::custom)
    }

    /// The same encoding for optional values
    pub mod option {
        use std::str::FromStr;

        use alloy_primitives::U256;
        use serde::{de::Error, Deserialize, Deserializer};

        /// Deserialize an optional decimal or hex string
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<U256>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| U256::from_str(&s).map_err(D::Error::custom))
                .transpose()
        }
    }
}
