use std::sync::Arc;

use clap::Parser;
use scripts::{
    chain::RpcChainClient, cli::Cli, config::DeployConfig, constants::PROPOSAL_FAILED_EXIT_CODE,
    deployer::Deployer, errors::ScriptError,
};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<(), ScriptError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().pretty().init();

    let config = DeployConfig::from_cli(&cli)?;
    let chain = Arc::new(RpcChainClient::new(&config.rpc_url, config.signer.clone())?);
    let mut deployer = Deployer::open(&config, chain.clone()).await?;

    match cli.command.run(&config, &mut deployer, chain).await {
        Err(e) if !e.is_fatal() => {
            warn!("{e}");
            warn!("The pending batch was kept, run `flush` again to retry");
            std::process::exit(PROPOSAL_FAILED_EXIT_CODE)
        }
        res => res,
    }
}
