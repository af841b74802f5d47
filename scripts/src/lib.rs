//! Scripts for deploying, upgrading and configuring upgradeable vault
//! contracts, deferring governance calls to a Safe multisig when the
//! deployer cannot make them.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod artifacts;
pub mod authority;
pub mod chain;
pub mod cli;
mod commands;
pub mod config;
pub mod constants;
pub mod deployer;
pub mod errors;
pub mod executor;
pub mod ledger;
pub mod networks;
pub mod queue;
pub mod reconciler;
pub mod safe;
pub mod solidity;
pub mod types;
pub mod utils;
pub mod validator;
