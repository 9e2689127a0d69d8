//! dmlink-simd: run the simulated acquisition host on the configured port.
//!
//! Usage: dmlink-simd [--port N] [--chunks N] [--functions A,B,...]

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{bail, Context, Result};

use dmlink_core::config::DmlinkConfig;
use dmlink_sim::{SimHost, SimOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = DmlinkConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        DmlinkConfig::default()
    });

    let mut port = config.connection.port;
    let mut options = SimOptions::default().with_layout(config.wire.layout());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut rest = args.as_slice();
    while let [flag, value, tail @ ..] = rest {
        match flag.as_str() {
            "--port" => port = value.parse().context("--port expects a number")?,
            "--chunks" => {
                options = options.with_chunks(value.parse().context("--chunks expects a number")?)
            }
            "--functions" => options = options.with_script_functions(value.split(',')),
            other => bail!("unknown option: {other}"),
        }
        rest = tail;
    }
    if let [extra] = rest {
        bail!("missing value for {extra}");
    }

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let host = SimHost::bind(addr, options)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %host.local_addr()?, layout = ?config.wire.layout(), "simulated host listening");
    host.serve().await?;
    Ok(())
}
