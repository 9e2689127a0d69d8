//! dmlink-ctl: command-line interface for a camera host's socket plugin.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use dmlink_client::{CameraWorker, Client, EnergyFilter};
use dmlink_core::config::DmlinkConfig;
use dmlink_core::wire::ByteOrder;
use dmlink_core::ProcessingMode;

// ── Output types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StatusReport {
    host: String,
    port: u16,
    dm_version: i64,
    plugin_version: i64,
    cameras: i64,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn connect(config: &DmlinkConfig) -> Result<Client> {
    tracing::debug!(host = %config.connection.host, port = config.connection.port, layout = ?config.wire.layout(), "connecting");
    Client::connect(config).with_context(|| {
        format!(
            "failed to connect to {}:{}; is the camera plugin listening?",
            config.connection.host, config.connection.port
        )
    })
}

/// Split `args` into `--flag value` options and positionals. `switches`
/// name flags that take no value.
fn parse_options<'a>(args: &[&'a str], switches: &[&str]) -> Result<(Vec<(&'a str, &'a str)>, Vec<&'a str>)> {
    let mut options = Vec::new();
    let mut positional = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i];
        if switches.contains(&arg) {
            options.push((arg, ""));
        } else if arg.starts_with("--") {
            i += 1;
            let value = args.get(i).with_context(|| format!("{arg} requires a value"))?;
            options.push((arg, *value));
        } else {
            positional.push(arg);
        }
        i += 1;
    }
    Ok((options, positional))
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

fn cmd_status(config: &DmlinkConfig, json: bool) -> Result<()> {
    let mut client = connect(config)?;
    let report = StatusReport {
        host: config.connection.host.clone(),
        port: config.connection.port,
        dm_version: client.dm_version().context("GetDMVersion failed")?,
        plugin_version: client.plugin_version().context("GetPluginVersion failed")?,
        cameras: client.number_of_cameras().context("GetNumberOfCameras failed")?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("═══════════════════════════════════════");
    println!("  Camera Host Status");
    println!("═══════════════════════════════════════");
    println!("  Host           : {}:{}", report.host, report.port);
    println!("  DM version     : {}", report.dm_version);
    println!("  Plugin version : {}", report.plugin_version);
    println!("  Cameras        : {}", report.cameras);
    Ok(())
}

fn cmd_probe(config: &DmlinkConfig, names: &[&str]) -> Result<()> {
    if names.is_empty() {
        bail!("probe needs at least one function name");
    }
    let mut client = connect(config)?;
    for name in names {
        let supported = client.supports_script_function(name)?;
        println!("  {:<24} {}", name, if supported { "yes" } else { "no" });
    }
    Ok(())
}

fn cmd_script(config: &DmlinkConfig, text: &str) -> Result<()> {
    let mut client = connect(config)?;
    let reply = client.execute_script(text)?;
    println!("status {}  value {}", reply.status, reply.value);
    Ok(())
}

fn cmd_run(config: &DmlinkConfig, args: &[&str]) -> Result<()> {
    let (options, positional) = parse_options(args, &["--background"])?;
    let [path] = positional.as_slice() else {
        bail!("run expects exactly one script file");
    };
    let background = options.iter().any(|(k, _)| *k == "--background");
    let mut client = connect(config)?;
    let reply = client
        .run_script_file(Path::new(path), background)
        .with_context(|| format!("failed to run {path}"))?;
    println!("status {}  value {}", reply.status, reply.value);
    Ok(())
}

async fn cmd_acquire(config: &DmlinkConfig, args: &[&str]) -> Result<()> {
    let (options, positional) = parse_options(args, &["--dark"])?;
    if let Some(extra) = positional.first() {
        bail!("unexpected argument: {extra}");
    }

    let mut camera = config.camera.clone();
    let mut out: Option<PathBuf> = None;
    let mut timeout = Duration::from_secs(60);
    for (key, value) in options {
        match key {
            "--exposure" => camera.exposure = value.parse().context("--exposure must be seconds")?,
            "--binning" => camera.binning = value.parse().context("--binning must be a number")?,
            "--processing" => camera.processing = value.parse::<ProcessingMode>()?,
            "--dark" => camera.processing = ProcessingMode::Dark,
            "--out" => out = Some(PathBuf::from(value)),
            "--timeout" => {
                let secs: f64 = value.parse().context("--timeout must be seconds")?;
                timeout = Duration::try_from_secs_f64(secs).context("--timeout must be non-negative")?;
            }
            other => bail!("unknown option: {other}"),
        }
    }
    let out = out.context("acquire requires --out <file>")?;
    let geometry = camera.geometry();

    let client = connect(config)?;
    acquire_to_file(client, camera.camera_id, geometry, timeout, &out).await
}

async fn acquire_to_file(
    mut client: Client,
    camera_id: i64,
    geometry: dmlink_core::CameraGeometry,
    timeout: Duration,
    out: &Path,
) -> Result<()> {
    client.select_camera(camera_id).context("SelectCamera failed")?;
    let (handle, _thread) = CameraWorker::spawn(client)?;
    let image = handle
        .call_with_timeout(timeout, move |c| c.acquire(&geometry))
        .await
        .with_context(|| format!("acquisition failed for {geometry}"))?;

    std::fs::write(out, image.to_bytes(ByteOrder::Little))
        .with_context(|| format!("failed to write {}", out.display()))?;
    let (rows, cols) = image.shape();
    println!("Wrote {rows}x{cols} u16 image to {}", out.display());
    Ok(())
}

fn cmd_filter(config: &DmlinkConfig) -> Result<()> {
    let mut client = connect(config)?;
    let filter = EnergyFilter::detect(&mut client)?;
    if !filter.is_available() {
        println!("No energy filter functions available on this host.");
        return Ok(());
    }
    println!("═══════════════════════════════════════");
    println!("  Energy Filter");
    println!("═══════════════════════════════════════");
    println!("  Slit in     : {}", filter.filter_enabled(&mut client)? > 0.0);
    println!("  Slit width  : {} eV", filter.slit_width(&mut client)?);
    println!("  Energy loss : {} eV", filter.energy_offset(&mut client)?);
    Ok(())
}

fn cmd_config() -> Result<()> {
    let path = DmlinkConfig::write_default_if_missing()?;
    println!("{}", path.display());
    Ok(())
}

fn print_usage() {
    println!("Usage: dmlink-ctl [--port <port>] [--host <host>] <command>");
    println!();
    println!("Commands:");
    println!("  status [--json]              Host, plugin and camera count");
    println!("  probe <function>...          Check which script functions exist");
    println!("  script <text>                Execute a script and print its result");
    println!("  run <file> [--background]    Execute a script file");
    println!("  acquire --out <file>         Acquire one image as raw little-endian u16");
    println!("          [--exposure s] [--binning n] [--processing p] [--dark] [--timeout s]");
    println!("  filter                       Show energy filter state");
    println!("  config                       Create the config file if missing and print its path");
    println!();
    println!("Options:");
    println!("  --port <port>   Plugin port (default: config, SERIALEMCCD_PORT, or 48890)");
    println!("  --host <host>   Plugin host (default: 127.0.0.1)");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = DmlinkConfig::load().context("failed to load config")?;

    // Global options come before the command.
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.connection.port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--host" => {
                i += 1;
                config.connection.host = args.get(i).context("--host requires a value")?.clone();
            }
            _ => break,
        }
        i += 1;
    }
    let remaining: Vec<&str> = args[i..].iter().map(String::as_str).collect();

    match remaining.as_slice() {
        ["status"] | [] => cmd_status(&config, false),
        ["status", "--json"] => cmd_status(&config, true),
        ["probe", names @ ..] => cmd_probe(&config, names),
        ["script", text] => cmd_script(&config, text),
        ["run", rest @ ..] => cmd_run(&config, rest),
        ["acquire", rest @ ..] => cmd_acquire(&config, rest).await,
        ["filter"] => cmd_filter(&config),
        ["config"] => cmd_config(),
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
