mod cli;

use discrip::{config, logging, Ripper};
use dr_core::{Error, LogLevel, LogSink, ProgressSender};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Write;
use std::path::Path;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { device, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let session = logging::init_session(&config.logging, cli.verbose)?;
            log_startup(&config, &session);

            let device = device.unwrap_or_else(|| config.rip.device.clone());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(scan(&config, &device, json, cli.verbose))
        }
        Commands::Rip {
            title,
            output,
            device,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let session = logging::init_session(&config.logging, cli.verbose)?;
            log_startup(&config, &session);

            let device = device.unwrap_or_else(|| config.rip.device.clone());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(rip(&config, &device, title, &output, cli.verbose))
        }
        Commands::CheckTools => {
            logging::init_console(cli.verbose)?;
            let config = config::load_config_or_default(cli.config.as_deref())?;
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            logging::init_console(cli.verbose)?;
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("discrip {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn log_startup(config: &config::Config, session: &logging::SessionLog) {
    tracing::info!("discrip {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Session log: {}", session.path.display());
    match config::validate_config(config) {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!("{}", warning);
            }
        }
        Err(e) => tracing::warn!("{e:#}"),
    }
}

/// Sink that prints job lines to stdout; debug lines only when verbose.
fn stdout_sink(verbose: bool) -> LogSink {
    LogSink::new(move |line| {
        if line.level == LogLevel::Debug && !verbose {
            return;
        }
        println!("{line}");
    })
}

/// Cancel the returned token on Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

async fn scan(config: &config::Config, device: &str, json: bool, verbose: bool) -> Result<()> {
    let ripper = Ripper::from_config(config);
    let cancel = ctrl_c_token();
    let log = if json {
        LogSink::noop()
    } else {
        stdout_sink(verbose)
    };

    let titles = ripper.scan_titles(device, &log, &cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&titles)?);
        return Ok(());
    }

    if titles.is_empty() {
        println!("No titles found on {device}");
        return Ok(());
    }

    println!("\n{:>5}  {:>8}", "Title", "Duration");
    for title in &titles {
        println!("{:>5}  {:>8}", title.number, title.duration_hms());
    }
    Ok(())
}

async fn rip(
    config: &config::Config,
    device: &str,
    title: u32,
    output: &Path,
    verbose: bool,
) -> Result<()> {
    let ripper = Ripper::from_config(config);
    let cancel = ctrl_c_token();
    let log = stdout_sink(verbose);
    let progress = ProgressSender::new(|pct| {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\rProgress: {pct:5.1}%");
        let _ = stderr.flush();
    });

    let result = ripper
        .rip(device, title, output, &progress, &log, &cancel)
        .await;
    eprintln!();

    match result {
        Ok(()) => {
            eprintln!("Progress: 100.0%");
            Ok(())
        }
        Err(Error::Cancelled) => anyhow::bail!("Rip cancelled"),
        Err(e) => Err(e.into()),
    }
}

fn check_tools(config: &config::Config) -> Result<()> {
    println!("Checking external tools...\n");

    let ripper = Ripper::from_config(config);
    let tools = ripper.check_tools();
    let mut all_ok = true;

    for info in &tools {
        let status = if info.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {} [{}]", status, info.tool, info.tool.role());

        if let Some(ref version) = info.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = info.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all fallbacks.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            let warnings = config::validate_config(&config)?;
            println!("✓ Configuration is valid");
            println!("  Device: {}", config.rip.device);
            println!("  Temp dir: {}", config.rip.temp_dir().display());
            println!("  Log dir: {}", config.logging.dir.display());
            println!("  Log level: {}", config.logging.level);
            for warning in warnings {
                println!("  warning: {}", warning);
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Device: {}", config.rip.device);
            println!("  Log dir: {}", config.logging.dir.display());
        }
    }

    Ok(())
}
