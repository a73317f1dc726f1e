//! warden-cpi binary.
//!
//! Invoked by the BOSH director once per CPI call:
//!
//! ```text
//! echo '{"method":"info","arguments":[],"context":{}}' | warden-cpi --config-path cpi.json
//! ```

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use warden_cpi::actions::{build_dispatcher, ActionDeps};
use warden_cpi::backend::GardenBackend;
use warden_cpi::config::Config;
use warden_cpi::disk::DiskStore;
use warden_cpi::rpc::RpcServer;
use warden_cpi::stemcell::StemcellStore;
use warden_cpi::system::{ExecCommandRunner, FileSystem, OsFileSystem, TarballCompressor};
use warden_cpi::{logging, VERSION};
use warden_cpi_id::{IdGenerator, UuidGenerator};

#[derive(Debug, Parser)]
#[command(name = "warden-cpi", version, about = "BOSH CPI for Garden/Warden")]
struct Cli {
    /// Path to the configuration file.
    #[arg(
        long = "config-path",
        alias = "configPath",
        env = "WARDEN_CPI_CONFIG_PATH"
    )]
    config_path: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Config is loaded before logging so its level can apply
    let config = Config::from_path(&cli.config_path);
    let configured_level = config.as_ref().ok().and_then(|c| c.log_level.clone());
    if let Err(e) = logging::init(configured_level.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::from(1);
    }

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e).context("loading config"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "warden-cpi failed");
            for cause in e.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            ExitCode::from(1)
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!(
        version = VERSION,
        warden_network = %config.warden.connect_network,
        warden_address = %config.warden.connect_address,
        "warden-cpi starting"
    );

    let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem::new());
    let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator::new());

    let backend = GardenBackend::new(
        config.garden(),
        fs.clone(),
        Arc::new(ExecCommandRunner::new()),
    )
    .context("creating garden client")?;
    let stemcells = StemcellStore::new(
        config.actions.stemcells_dir.clone(),
        fs.clone(),
        ids.clone(),
        Arc::new(TarballCompressor::new()),
    );
    let disks = DiskStore::new(config.actions.disks_dir.clone(), fs, ids.clone());

    let dispatcher = build_dispatcher(ActionDeps {
        backend: Arc::new(backend),
        stemcells: Arc::new(stemcells),
        disks: Arc::new(disks),
        vm_ids: ids,
        agent: config.actions.agent.clone(),
    });

    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    RpcServer::new(dispatcher)
        .serve_once(stdin, stdout)
        .await
        .context("serving request")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_accepts_legacy_flag() {
        let cli = Cli::try_parse_from(["warden-cpi", "--configPath", "/etc/cpi.json"]).unwrap();
        assert_eq!(cli.config_path, PathBuf::from("/etc/cpi.json"));
    }

    #[test]
    fn test_cli_requires_config_path() {
        assert!(Cli::try_parse_from(["warden-cpi"]).is_err());
    }
}
