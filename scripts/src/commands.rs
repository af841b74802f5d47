//! Implementations of the various deploy scripts

use std::{str::FromStr, sync::Arc};

use alloy_primitives::Address;
use alloy_sol_types::SolCall;
use tracing::{info, warn};

use crate::{
    chain::ChainClient,
    cli::{
        AddKeeperArgs, AddMaintainerArgs, ConfigureArgs, DeployImplementationArgs,
        DeployPoolArgs, ReconcileArgs,
    },
    config::{pool, DeployConfig},
    deployer::Deployer,
    errors::ScriptError,
    executor::BatchExecutor,
    solidity::IPool,
    types::{CallDisposition, FlushOutcome, InitCall, ProxyDeployment, ReconcileAction},
};

/// Parse a hex address given on the command line
fn parse_address(s: &str) -> Result<Address, ScriptError> {
    Address::from_str(s).map_err(|e| ScriptError::CalldataConstruction(format!("`{s}`: {e}")))
}

/// Log how a privileged call was handled
fn report_disposition(what: &str, disposition: CallDisposition) {
    match disposition {
        CallDisposition::Executed { tx_hash } => info!("{what}: executed in {tx_hash:#x}"),
        CallDisposition::Deferred { queued: true } => {
            info!("{what}: queued for the multisig, run `flush` to execute it")
        }
        CallDisposition::Deferred { queued: false } => {
            info!("{what}: already queued for the multisig")
        }
    }
}

/// Deploy a built-in pool and grant its roles, optionally flushing the batch
pub async fn deploy_pool<C: ChainClient>(
    args: DeployPoolArgs,
    config: &DeployConfig,
    deployer: &mut Deployer<C>,
    chain: Arc<C>,
) -> Result<(), ScriptError> {
    let addresses = config.addresses()?;
    let request = pool(&args.alias)?.deployment(&addresses);
    let keeper = match args.keeper {
        Some(keeper) => parse_address(&keeper)?,
        None => addresses.pool_keeper,
    };
    let maintainer = match args.maintainer {
        Some(maintainer) => parse_address(&maintainer)?,
        None => addresses.pool_maintainer,
    };

    let outcome = deployer
        .deploy_and_configure_pool(&request, keeper, maintainer)
        .await?;
    info!(
        "`{}` is at {:#x} ({:?})",
        request.alias, outcome.deployment.address, outcome.deployment.action
    );
    if let Some(disposition) = outcome.keeper {
        report_disposition(&format!("addKeeper({keeper:#x})"), disposition);
    }
    if let Some(disposition) = outcome.maintainer {
        report_disposition(&format!("addMaintainer({maintainer:#x})"), disposition);
    }

    if args.flush {
        flush(config, deployer, chain).await?;
    }
    Ok(())
}

/// Deploy or upgrade a proxied contract
pub async fn reconcile<C: ChainClient>(
    args: ReconcileArgs,
    deployer: &mut Deployer<C>,
) -> Result<(), ScriptError> {
    let request = ProxyDeployment {
        alias: args.alias,
        contract_type: args.contract_type,
        init: InitCall {
            method: args.initializer,
            args: args.init_args,
        },
    };

    let outcome = deployer.reconcile(&request).await?;
    match outcome.action {
        ReconcileAction::UpgradeDeferred => info!(
            "`{}` upgrade to {:#x} is waiting for the multisig",
            request.alias, outcome.implementation
        ),
        action => info!(
            "`{}` is at {:#x} running {:#x} ({action:?})",
            request.alias, outcome.address, outcome.implementation
        ),
    }

    Ok(())
}

/// Deploy an implementation without a proxy
pub async fn deploy_implementation<C: ChainClient>(
    args: DeployImplementationArgs,
    deployer: &mut Deployer<C>,
) -> Result<(), ScriptError> {
    let (address, deployed) = deployer.deploy_implementation(&args.contract_type).await?;
    if !deployed {
        info!("{} implementation already deployed at {address:#x}", args.contract_type);
    }

    Ok(())
}

/// Deploy the vault factory
pub async fn deploy_factory<C: ChainClient>(
    deployer: &mut Deployer<C>,
) -> Result<(), ScriptError> {
    let (address, _) = deployer.deploy_factory().await?;
    info!("Factory at {address:#x}");
    Ok(())
}

/// Add a keeper to a pool
pub async fn add_keeper<C: ChainClient>(
    args: AddKeeperArgs,
    deployer: &mut Deployer<C>,
) -> Result<(), ScriptError> {
    let keeper = parse_address(&args.keeper)?;
    let disposition = deployer
        .configure_privileged(&args.alias, IPool::addKeeperCall { keeper }.abi_encode())
        .await?;

    report_disposition(&format!("addKeeper({keeper:#x})"), disposition);
    Ok(())
}

/// Add a maintainer to a pool
pub async fn add_maintainer<C: ChainClient>(
    args: AddMaintainerArgs,
    deployer: &mut Deployer<C>,
) -> Result<(), ScriptError> {
    let maintainer = parse_address(&args.maintainer)?;
    let disposition = deployer
        .configure_privileged(
            &args.alias,
            IPool::addMaintainerCall { maintainer }.abi_encode(),
        )
        .await?;

    report_disposition(&format!("addMaintainer({maintainer:#x})"), disposition);
    Ok(())
}

/// Make a governor-only call with raw calldata
pub async fn configure<C: ChainClient>(
    args: ConfigureArgs,
    deployer: &mut Deployer<C>,
) -> Result<(), ScriptError> {
    let calldata = hex::decode(args.calldata.trim_start_matches("0x"))
        .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;

    let disposition = deployer.configure_privileged(&args.alias, calldata).await?;
    report_disposition(&format!("call to `{}`", args.alias), disposition);
    Ok(())
}

/// Execute or propose the calls waiting for the multisig
pub async fn flush<C: ChainClient>(
    config: &DeployConfig,
    deployer: &mut Deployer<C>,
    chain: Arc<C>,
) -> Result<(), ScriptError> {
    if deployer.queue().is_empty() {
        info!("No multisig calls pending");
        return Ok(());
    }

    let executor = BatchExecutor::new(chain, config.execution_mode()?);
    match deployer.flush_pending_batch(&executor).await {
        Ok(FlushOutcome::Empty) => {}
        Ok(FlushOutcome::Executed { calls }) => info!("Executed {calls} multisig calls"),
        Ok(FlushOutcome::Proposed {
            safe_tx_hash,
            nonce,
            calls,
        }) => info!("Proposed {calls} multisig calls as {safe_tx_hash:#x} (nonce {nonce})"),
        Err(e) => {
            warn!(
                "{} multisig calls remain queued in {}",
                deployer.queue().len(),
                config.batch_file.display()
            );
            return Err(e);
        }
    }

    Ok(())
}
