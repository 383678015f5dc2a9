use std::time::Duration;

use alloy::providers::RootProvider;
use alloy::transports::http::ReqwestTransport;
use anyhow::Result;
use blf::env::load_dotenv;
use blf::plan::ExtractionPlan;
use blf::provider::RpcChainClient;
use blf_engine::EngineConfig;
use clap::Parser;
use tracing::{debug, info, warn};

use self::extract::*;
mod extract {
    pub mod cli;
}

fn main() -> Result<()> {
    let dotenv = load_dotenv();
    blf::tracing::init();
    match dotenv {
        Ok(Some(path)) => debug!("Loaded {}", path.display()),
        Ok(None) => {}
        Err(e) => warn!("Ignoring the local `.env` file, which could not be parsed: {e}"),
    }

    let args = cli::Cli::parse();
    let plan = ExtractionPlan::from_path(&args.plan)?;

    let provider = RootProvider::<ReqwestTransport>::new_http(args.rpc_url);
    let client = RpcChainClient::<_, ReqwestTransport>::new(provider)?;
    let config = EngineConfig {
        poll_interval: Duration::from_millis(args.poll_interval),
        abort_on_exception: args.abort_on_exception,
        output_folder: args.output_dir,
    };

    let (program, mut state) = blf::compile::prepare(&plan, client, &config)?;
    info!(
        "Running {} with {} exporters",
        args.plan.display(),
        state.exporters.len()
    );
    program.execute(&mut state);

    let reported = state.exception_handler.reported_errors();
    if reported > 0 {
        info!("Finished with {reported} errors, see error.log");
    } else {
        info!("Finished");
    }
    Ok(())
}
