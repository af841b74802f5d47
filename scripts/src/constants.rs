//! Constants used in the deploy scripts

use alloy_primitives::{address, b256, Address, B256};

/// The storage slot containing the implementation address in an upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#logic-contract-address
pub const IMPLEMENTATION_STORAGE_SLOT: B256 =
    b256!("0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// The number of bytes stored in a single storage slot
pub const NUM_BYTES_STORAGE_SLOT: usize = 32;

/// The number of bytes in an Ethereum address
pub const NUM_BYTES_ADDRESS: usize = 20;

/// The artifact name of the ERC1967 proxy contract deployed in front of
/// every upgradeable implementation
pub const PROXY_CONTRACT_TYPE: &str = "ERC1967Proxy";

/// The suffix appended to an alias to name its proxy record
pub const PROXY_ALIAS_SUFFIX: &str = "_Proxy";

/// The suffix appended to a contract type to name its shared implementation record
pub const IMPLEMENTATION_ALIAS_SUFFIX: &str = "_Implementation";

/// The initializer invoked through the proxy constructor when none is given
pub const DEFAULT_INITIALIZER: &str = "initialize";

/// The name of the file, inside each network's deployments directory,
/// recording the chain ID the records belong to
pub const CHAIN_ID_FILE: &str = ".chainId";

/// The extension of deployment record and artifact files
pub const JSON_EXTENSION: &str = "json";

/// The default directory holding deployment records
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deployments";

/// The default directory holding compilation artifacts
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// The default file holding calls deferred to the multisig
pub const DEFAULT_BATCH_FILE: &str = "multisig.batch.tmp.json";

/// The suffix of the scratch file written before an atomic rename
pub const TMP_FILE_SUFFIX: &str = "tmp";

/// The native balance, in ether, given to an impersonated authority on local networks
pub const IMPERSONATED_BALANCE_ETHER: &str = "1000000";

/// The contract type of the vault implementation
pub const YIELD_VAULT: &str = "YieldVault";

/// The contract type of the vault factory
pub const YIELD_VAULT_FACTORY: &str = "YieldVaultFactory";

/// The address of the `MultiSendCallOnly` v1.3.0 contract, deployed at the
/// same address on every supported chain
pub const MULTI_SEND_CALL_ONLY_ADDRESS: Address =
    address!("0x40A2aCCbd92BCA938b02010E17A5b8929b49130D");

/// The base URL of the hosted Safe Transaction Service
pub const SAFE_SERVICE_BASE_URL: &str = "https://api.safe.global/tx-service";

/// The origin reported to the Safe Transaction Service with each proposal
pub const SAFE_PROPOSAL_ORIGIN: &str = "vault-scripts";

/// The offset added to the `v` value of an `eth_sign` signature so that
/// Safe recognizes it as a signed message rather than a signed hash
pub const ETH_SIGN_V_OFFSET: u8 = 4;

/// The exit code used when a proposal fails but the pending batch is retained
pub const PROPOSAL_FAILED_EXIT_CODE: i32 = 2;
