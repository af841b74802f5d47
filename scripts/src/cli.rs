//! Definitions of CLI arguments and commands for deploy scripts

use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand};

use crate::{
    chain::ChainClient,
    commands::{
        add_keeper, add_maintainer, configure, deploy_factory, deploy_implementation,
        deploy_pool, flush, reconcile,
    },
    config::DeployConfig,
    constants::{
        DEFAULT_ARTIFACTS_DIR, DEFAULT_BATCH_FILE, DEFAULT_DEPLOYMENTS_DIR, DEFAULT_INITIALIZER,
        YIELD_VAULT,
    },
    deployer::Deployer,
    errors::ScriptError,
};

/// Deploy, upgrade and configure vault pools
#[derive(Parser)]
#[command(name = "vault-deploy")]
pub struct Cli {
    /// Private key of the deployer
    #[arg(short, long, env = "DEPLOYER_PRIVATE_KEY", hide_env_values = true)]
    pub priv_key: Option<String>,

    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL")]
    pub rpc_url: String,

    /// The network to deploy to, e.g. `localhost` or `ethereum`
    #[arg(short, long, default_value = "localhost")]
    pub network: String,

    /// The directory holding deployment records, one subdirectory per network
    #[arg(long, default_value = DEFAULT_DEPLOYMENTS_DIR)]
    pub deployments_dir: PathBuf,

    /// The directory holding compiled contract artifacts
    #[arg(long, default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts_dir: PathBuf,

    /// The file holding calls waiting for the multisig
    #[arg(long, default_value = DEFAULT_BATCH_FILE)]
    pub batch_file: PathBuf,

    /// The Safe Transaction Service API key
    #[arg(long, env = "SAFE_API_KEY", hide_env_values = true)]
    pub safe_api_key: Option<String>,

    /// A Safe Transaction Service URL to use instead of the hosted one
    #[arg(long)]
    pub safe_service_url: Option<String>,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// The deploy script commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy a known pool behind a proxy and grant its keeper and maintainer roles
    DeployPool(DeployPoolArgs),
    /// Deploy or upgrade an arbitrary proxied contract
    Reconcile(ReconcileArgs),
    /// Deploy a contract's implementation only
    DeployImplementation(DeployImplementationArgs),
    /// Deploy the vault factory
    DeployFactory,
    /// Add a keeper to a pool
    AddKeeper(AddKeeperArgs),
    /// Add a maintainer to a pool
    AddMaintainer(AddMaintainerArgs),
    /// Make an arbitrary governor-only call on a deployed contract
    Configure(ConfigureArgs),
    /// Execute or propose the calls waiting for the multisig
    Flush,
}

impl Command {
    /// Run the command
    pub async fn run<C: ChainClient>(
        self,
        config: &DeployConfig,
        deployer: &mut Deployer<C>,
        chain: Arc<C>,
    ) -> Result<(), ScriptError> {
        match self {
            Command::DeployPool(args) => deploy_pool(args, config, deployer, chain).await,
            Command::Reconcile(args) => reconcile(args, deployer).await,
            Command::DeployImplementation(args) => deploy_implementation(args, deployer).await,
            Command::DeployFactory => deploy_factory(deployer).await,
            Command::AddKeeper(args) => add_keeper(args, deployer).await,
            Command::AddMaintainer(args) => add_maintainer(args, deployer).await,
            Command::Configure(args) => configure(args, deployer).await,
            Command::Flush => flush(config, deployer, chain).await,
        }
    }
}

/// Deploy a pool from the built-in pool definitions.
///
/// The keeper and maintainer default to the network's Vesper addresses.
#[derive(Args)]
pub struct DeployPoolArgs {
    /// The pool alias, e.g. `vaETH`
    #[arg(short, long, default_value = "vaETH")]
    pub alias: String,

    /// The keeper to add, in hex
    #[arg(short, long)]
    pub keeper: Option<String>,

    /// The maintainer to add, in hex
    #[arg(short, long)]
    pub maintainer: Option<String>,

    /// Flush the multisig batch once the pool is configured
    #[arg(long)]
    pub flush: bool,
}

/// Ensure `alias` is deployed behind an ERC1967 proxy running the current
/// implementation of `contract_type`
#[derive(Args)]
pub struct ReconcileArgs {
    /// The logical name of the deployment
    #[arg(short, long)]
    pub alias: String,

    /// The artifact name of the implementation contract
    #[arg(short, long)]
    pub contract_type: String,

    /// The initializer called through the proxy on first deployment
    #[arg(long, default_value = DEFAULT_INITIALIZER)]
    pub initializer: String,

    /// The initializer's arguments, in order
    #[arg(short, long, num_args = 0..)]
    pub init_args: Vec<String>,
}

/// Deploy an implementation without a proxy
#[derive(Args)]
pub struct DeployImplementationArgs {
    /// The artifact name of the implementation contract
    #[arg(short, long, default_value = YIELD_VAULT)]
    pub contract_type: String,
}

/// Add a keeper to a deployed pool
#[derive(Args)]
pub struct AddKeeperArgs {
    /// The pool alias
    #[arg(short, long)]
    pub alias: String,

    /// The keeper to add, in hex
    #[arg(short, long)]
    pub keeper: String,
}

/// Add a maintainer to a deployed pool
#[derive(Args)]
pub struct AddMaintainerArgs {
    /// The pool alias
    #[arg(short, long)]
    pub alias: String,

    /// The maintainer to add, in hex
    #[arg(short, long)]
    pub maintainer: String,
}

/// Make a governor-only call
#[derive(Args)]
pub struct ConfigureArgs {
    /// The alias of the contract to call
    #[arg(short, long)]
    pub alias: String,

    /// The calldata, in hex form
    #[arg(short, long)]
    pub calldata: String,
}
