use std::{env, path::Path};

use anyhow::bail;
use mcore::{config::Config, server::Server, storage::Store};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        bail!("usage: {} [config.toml]", args[0]);
    }

    let config = Config::load(args.get(1).map(Path::new))?;
    let store = Store::from_config(&config.store);
    store.provision().await?;

    let server = Server::bind(&config, store).await?;
    info!(
        addr = %server.local_addr(),
        static_dir = %config.static_dir.display(),
        "server started"
    );

    tokio::select! {
        _ = server.serve() => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("shutting down");
        }
    }

    Ok(())
}
