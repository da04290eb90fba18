//! rwc5020x CLI - Command-line tool for driving RWC5020x LoRaWAN testers.
//!
//! ## Features
//!
//! - Run EU certification scenarios with a PASS/FAIL verdict
//! - Check DUT link activation
//! - Start, stop and clear the link test
//! - Set the tester mode and sub screen
//! - Send single raw command lines
//! - Serial (RS-232) and UDP (Ethernet) channels
//! - Exchange audit log
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use console::style;
use env_logger::Env;
use log::{debug, info, warn};
use rwc5020x::{
    ChannelConfig, Command, DatagramConfig, FileAudit, FirmwareVersion, NativePortEnumerator,
    PortEnumerator, Response, Scenario, SerialConfig, Sequencer, TestFailure, Tester, Transceive,
    Transceiver, Verdict, sequence::require_ack,
};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

mod config;

use config::{Config, ConnectionConfig};

/// Exit status for invalid usage.
const USAGE_EXIT_CODE: i32 = 2;

/// rwc5020x - Drive RWC5020x LoRaWAN testers over serial or UDP.
///
/// Environment variables:
///   RWC5020X_SERIAL    - Serial port of the tester
///   RWC5020X_UDP       - Tester address for UDP (host:port)
///   RWC5020X_FIRMWARE  - Tester firmware version (e.g. 1.222)
#[derive(Parser)]
#[command(name = "rwc5020x")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port of the tester.
    #[arg(short, long, global = true, env = "RWC5020X_SERIAL")]
    serial: Option<String>,

    /// Tester address for UDP (host:port).
    #[arg(short, long, global = true, env = "RWC5020X_UDP", value_name = "HOST:PORT")]
    udp: Option<String>,

    /// Local UDP port to bind (0 = any).
    #[arg(long, global = true, value_name = "PORT")]
    local_port: Option<u16>,

    /// Reply timeout in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Tester firmware version, used to reject unsupported commands.
    #[arg(long, global = true, env = "RWC5020X_FIRMWARE", value_name = "VERSION")]
    firmware: Option<String>,

    /// Append every exchange to this file.
    #[arg(long, global = true, value_name = "PATH")]
    audit_log: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a certification scenario.
    Run {
        /// Scenario name (eu-5.3, eu-5.5).
        #[arg(value_parser = parse_scenario)]
        scenario: Scenario,
    },

    /// Check whether the DUT link is active.
    Status,

    /// Start, stop or clear the link test.
    Link {
        /// What to do with the link test.
        #[arg(value_enum)]
        action: LinkAction,
    },

    /// Set the tester operating mode and sub screen.
    Configure {
        /// Operating mode (EDT, GWT, NST_TX, NST_RX, NST_MFG).
        #[arg(long)]
        mode: Option<String>,

        /// Sub screen (LINK, POWER_TIME, POWER_CHANNEL, SENSITIVITY).
        #[arg(long)]
        screen: Option<String>,
    },

    /// Send one raw command line and print the reply.
    Send {
        /// Command line, e.g. "READ:LINK:MSG?".
        line: String,

        /// Output the classified reply as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Query tester identification and firmware version.
    Identify,

    /// List available serial ports.
    ListPorts {
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LinkAction {
    Run,
    Stop,
    Clear,
}

/// Errors that end the process with a usage status.
#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
}

fn parse_scenario(s: &str) -> Result<Scenario, String> {
    s.parse::<Scenario>()
        .map_err(|e| e.to_string())
}

fn main() {
    let cli = Cli::parse();

    if std::env::var("NO_COLOR").is_ok() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "rwc5020x v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        let code = match err.downcast_ref::<CliError>() {
            Some(CliError::Usage(_)) => USAGE_EXIT_CODE,
            None => 1,
        };
        std::process::exit(code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::ListPorts { json } => cmd_list_ports(*json),
        Commands::Completions { shell } => {
            cmd_completions(*shell);
            Ok(())
        },
        Commands::Run { scenario } => cmd_run(cli, &config, *scenario),
        Commands::Status => cmd_status(cli, &config),
        Commands::Link { action } => cmd_link(cli, &config, *action),
        Commands::Configure { mode, screen } => {
            cmd_configure(cli, &config, mode.as_deref(), screen.as_deref())
        },
        Commands::Send { line, json } => cmd_send(cli, &config, line, *json),
        Commands::Identify => cmd_identify(cli, &config),
    }
}

/// Pick the tester channel. Channel flags on the command line replace the
/// configured channel entirely; exactly one channel must remain.
fn resolve_channel(cli: &Cli, connection: &ConnectionConfig) -> Result<ChannelConfig, CliError> {
    let (serial, udp) = if cli.serial.is_some() || cli.udp.is_some() {
        (cli.serial.clone(), cli.udp.clone())
    } else {
        (connection.serial.clone(), connection.udp.clone())
    };
    let timeout = cli
        .timeout_ms
        .or(connection.timeout_ms)
        .map(Duration::from_millis);
    let local_port = cli
        .local_port
        .or(connection.local_port);

    match (serial, udp) {
        (Some(_), Some(_)) => Err(CliError::Usage(
            "--serial and --udp are mutually exclusive".to_string(),
        )),
        (None, None) => Err(CliError::Usage(
            "no tester channel selected, use --serial PORT or --udp HOST:PORT".to_string(),
        )),
        (Some(port), None) => {
            let mut serial = SerialConfig::new(port);
            if let Some(timeout) = timeout {
                serial = serial.with_timeout(timeout);
            }
            Ok(ChannelConfig::Serial(serial))
        },
        (None, Some(remote)) => {
            let mut datagram = DatagramConfig::new(remote);
            if let Some(port) = local_port {
                datagram = datagram.with_local_port(port);
            }
            if let Some(timeout) = timeout {
                datagram = datagram.with_timeout(timeout);
            }
            Ok(ChannelConfig::Datagram(datagram))
        },
    }
}

fn resolve_firmware(cli: &Cli) -> Result<Option<FirmwareVersion>, CliError> {
    cli.firmware
        .as_deref()
        .map(|text| {
            text.parse::<FirmwareVersion>()
                .map_err(|e| CliError::Usage(e.to_string()))
        })
        .transpose()
}

/// Unopened transceiver for `channel`, with the audit log attached.
fn new_link(cli: &Cli, channel: ChannelConfig) -> Transceiver {
    let link = Transceiver::new(channel);
    match &cli.audit_log {
        Some(path) => link.with_audit(Box::new(FileAudit::new(path))),
        None => link,
    }
}

/// Open the tester channel selected by flags and config.
fn open_link(cli: &Cli, config: &Config) -> Result<Transceiver> {
    let mut link = new_link(cli, resolve_channel(cli, &config.connection)?);
    let target = link.describe();
    link.open()
        .with_context(|| format!("Failed to open {target}"))?;
    Ok(link)
}

fn build_tester<T: Transceive>(
    link: T,
    firmware: Option<FirmwareVersion>,
    config: &Config,
) -> Tester<T> {
    let mut tester = Tester::new(link);
    if let Some(version) = firmware {
        tester = tester.with_firmware(version);
    }
    if let Some(settle) = config.sequence.mac_settle() {
        tester = tester.with_mac_settle(settle);
    }
    tester
}

fn build_sequencer<T: Transceive>(tester: Tester<T>, config: &Config) -> Sequencer<T> {
    Sequencer::new(tester)
        .with_timing(config.sequence.timing())
        .with_poll_policy(config.sequence.poll_policy())
}

/// Close the link, logging instead of failing.
fn close_link(link: &mut Transceiver) {
    if let Err(e) = link.close() {
        warn!("Failed to close {}: {e}", link.describe());
    }
}

fn cmd_run(cli: &Cli, config: &Config, scenario: Scenario) -> Result<()> {
    let firmware = resolve_firmware(cli)?;
    let mut link = new_link(cli, resolve_channel(cli, &config.connection)?);
    if let Err(e) = link.open() {
        rwc5020x::abort(&TestFailure::from(e));
    }

    eprintln!(
        "{} {} on {}",
        style("▶").cyan(),
        style(scenario.title()).bold(),
        link.describe()
    );

    let mut seq = build_sequencer(build_tester(&mut link, firmware, config), config);
    let result = scenario.run(&mut seq);
    drop(seq);
    close_link(&mut link);

    let verdict = Verdict::of(&result);
    if let Err(failure) = result {
        rwc5020x::abort(&failure);
    }
    println!("\n{}", style(verdict.marker()).green().bold());
    Ok(())
}

fn cmd_status(cli: &Cli, config: &Config) -> Result<()> {
    let firmware = resolve_firmware(cli)?;
    let mut link = open_link(cli, config)?;

    let mut seq = build_sequencer(build_tester(&mut link, firmware, config), config);
    let result = seq.poll_link_status();
    drop(seq);
    close_link(&mut link);

    result?;
    println!("Link status: {}", style("Active").green());
    Ok(())
}

fn cmd_link(cli: &Cli, config: &Config, action: LinkAction) -> Result<()> {
    let firmware = resolve_firmware(cli)?;
    let mut link = open_link(cli, config)?;

    let mut seq = build_sequencer(build_tester(&mut link, firmware, config), config);
    let (result, state) = match action {
        LinkAction::Run => (seq.run_link(), "running"),
        LinkAction::Stop => (seq.stop_link(), "stopped"),
        LinkAction::Clear => (seq.clear_link(), "messages cleared"),
    };
    drop(seq);
    close_link(&mut link);

    result?;
    println!("Link: {}", style(state).green());
    Ok(())
}

fn cmd_configure(
    cli: &Cli,
    config: &Config,
    mode: Option<&str>,
    screen: Option<&str>,
) -> Result<()> {
    if mode.is_none() && screen.is_none() {
        return Err(CliError::Usage(
            "nothing to configure, give --mode and/or --screen".to_string(),
        )
        .into());
    }
    let firmware = resolve_firmware(cli)?;
    let mut link = open_link(cli, config)?;

    let mut tester = build_tester(&mut link, firmware, config);
    let result = apply_display(&mut tester, mode, screen);
    drop(tester);
    close_link(&mut link);
    result
}

/// Set mode then sub screen; the tester must acknowledge each.
fn apply_display<T: Transceive>(
    tester: &mut Tester<T>,
    mode: Option<&str>,
    screen: Option<&str>,
) -> Result<()> {
    if let Some(mode) = mode {
        require_ack(tester.set_mode(mode)?, "Configuring test mode")?;
        println!("Test Mode: {}", style(mode).cyan());
    }
    if let Some(screen) = screen {
        require_ack(tester.set_screen(screen)?, "Configuring sub screen")?;
        println!("Sub Screen: {}", style(screen).cyan());
    }
    Ok(())
}

fn cmd_send(cli: &Cli, config: &Config, line: &str, json: bool) -> Result<()> {
    let mut link = open_link(cli, config)?;
    let command = Command::raw(line);
    let reply = link.transceive(command.as_str(), Duration::ZERO);
    close_link(&mut link);

    if json {
        println!("{}", serde_json::to_string(&reply)?);
    } else if !reply.is_absent() {
        println!("{reply}");
    }

    if reply.is_absent() {
        return Err(TestFailure::NoReply {
            what: command.to_string(),
        }
        .into());
    }
    Ok(())
}

fn cmd_identify(cli: &Cli, config: &Config) -> Result<()> {
    let firmware = resolve_firmware(cli)?;
    let mut link = open_link(cli, config)?;
    let mut tester = build_tester(&mut link, firmware, config);

    let identification = tester.identification()?;
    let version = tester.system_version()?;
    drop(tester);
    close_link(&mut link);

    let Response::Data(identification) = identification else {
        return Err(anyhow!("*IDN? returned {identification}"));
    };
    println!("Identification: {}", identification.trim());

    let reported = firmware_from_identification(&identification)
        .or_else(|| version.payload().and_then(|v| v.parse().ok()));
    match reported {
        Some(reported) => {
            println!("Firmware: {}", style(reported).cyan());
            if let Some(expected) = firmware.filter(|expected| *expected != reported) {
                warn!("Tester reports firmware {reported}, but {expected} was given");
            }
        },
        None => info!("Firmware version not reported ({version})"),
    }
    Ok(())
}

/// Extract `Ver=x.y` from a `*IDN?` reply.
fn firmware_from_identification(identification: &str) -> Option<FirmwareVersion> {
    identification
        .split(',')
        .map(str::trim)
        .find(|part| part.starts_with("Ver="))
        .and_then(|part| part.parse().ok())
}

fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports().context("Failed to list serial ports")?;

    if json {
        let ports: Vec<serde_json::Value> = ports
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_default()
        );
        return Ok(());
    }

    eprintln!("{}", style("Serial ports").bold().underlined());

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &ports {
        let vid_pid = port
            .usb_id()
            .map(|id| format!(" ({id})"))
            .unwrap_or_default();
        let product = port.product.as_deref().unwrap_or("");

        eprintln!(
            "  {} {}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            vid_pid,
            if !product.is_empty() {
                format!(" - {}", style(product).dim())
            } else {
                String::new()
            }
        );
    }
    Ok(())
}

fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "rwc5020x", &mut io::stdout());
}
