//! The networks the scripts deploy to, and the well-known addresses on each

use alloy_primitives::{address, Address};

use crate::errors::ScriptError;

/// How privileged calls deferred to the multisig get executed on a network
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkClass {
    /// A development node that can impersonate accounts
    Local,
    /// A live network, where the multisig must sign
    Public,
}

/// A named deployment target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkProfile {
    /// The network name, also the name of its deployments directory
    pub name: &'static str,
    /// The chain ID the RPC endpoint must report
    pub chain_id: u64,
    /// Whether the network is local or public
    pub class: NetworkClass,
    /// The chain's path segment on the hosted Safe Transaction Service
    pub safe_service_prefix: Option<&'static str>,
}

/// The chain ID of development nodes
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Every supported network
pub const NETWORKS: &[NetworkProfile] = &[
    NetworkProfile {
        name: "hardhat",
        chain_id: LOCAL_CHAIN_ID,
        class: NetworkClass::Local,
        safe_service_prefix: None,
    },
    NetworkProfile {
        name: "localhost",
        chain_id: LOCAL_CHAIN_ID,
        class: NetworkClass::Local,
        safe_service_prefix: None,
    },
    NetworkProfile {
        name: "ethereum",
        chain_id: 1,
        class: NetworkClass::Public,
        safe_service_prefix: Some("eth"),
    },
    NetworkProfile {
        name: "optimism",
        chain_id: 10,
        class: NetworkClass::Public,
        safe_service_prefix: Some("oeth"),
    },
    NetworkProfile {
        name: "base",
        chain_id: 8453,
        class: NetworkClass::Public,
        safe_service_prefix: Some("base"),
    },
    NetworkProfile {
        name: "hemi",
        chain_id: 43111,
        class: NetworkClass::Public,
        safe_service_prefix: None,
    },
    NetworkProfile {
        name: "hemi_testnet",
        chain_id: 743111,
        class: NetworkClass::Public,
        safe_service_prefix: None,
    },
];

/// Look up a network by name
pub fn network(name: &str) -> Result<&'static NetworkProfile, ScriptError> {
    NETWORKS.iter().find(|n| n.name == name).ok_or_else(|| {
        let known = NETWORKS.iter().map(|n| n.name).collect::<Vec<_>>().join(", ");
        ScriptError::UnknownNetwork(format!("`{name}` (known networks: {known})"))
    })
}

// -----------------
// | Address Books |
// -----------------

/// The well-known addresses on a chain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressBook {
    /// The governance multisig
    pub gnosis_safe: Address,
    /// Wrapped ether
    pub weth: Address,
    /// The default keeper added to new pools
    pub pool_keeper: Address,
    /// The default maintainer added to new pools
    pub pool_maintainer: Address,
}

/// Ethereum mainnet
const ETHEREUM: AddressBook = AddressBook {
    gnosis_safe: address!("0x9520b477Aa81180E6DdC006Fc09Fb6d3eb4e807A"),
    weth: address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
    pool_keeper: address!("0xc6b8ed2b369A5fEfd2A0d7cbdBF8aC920DBa3906"),
    pool_maintainer: address!("0x70AB149e550690D55a46AA326211438c5D47B6D3"),
};

/// OP mainnet
const OPTIMISM: AddressBook = AddressBook {
    gnosis_safe: address!("0x32934AD7b1121DeFC631080b58599A0eaAB89878"),
    weth: address!("0x4200000000000000000000000000000000000006"),
    pool_keeper: address!("0x68c80d3d6567B5998F78aC0c81467D5d4A82E781"),
    pool_maintainer: address!("0x8Db4A31683f0B8af64efe13C0D304da6fccFcE13"),
};

/// Base mainnet
const BASE: AddressBook = AddressBook {
    gnosis_safe: address!("0x32934AD7b1121DeFC631080b58599A0eaAB89878"),
    weth: address!("0x4200000000000000000000000000000000000006"),
    pool_keeper: address!("0x33Aa8F94428C0F891dFd77DD141878aBCaEFEbe8"),
    pool_maintainer: address!("0x017CBF62b53313d5eE3aD1288daA95CD39AA11fE"),
};

/// The address book of a chain.
///
/// Development nodes fork Ethereum mainnet, so they share its addresses.
pub fn address_book(chain_id: u64) -> Result<AddressBook, ScriptError> {
    match chain_id {
        1 | LOCAL_CHAIN_ID => Ok(ETHEREUM),
        10 => Ok(OPTIMISM),
        8453 => Ok(BASE),
        _ => Err(ScriptError::UnknownNetwork(format!(
            "no address book for chain {chain_id}"
        ))),
    }
}
