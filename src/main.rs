// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use certd::{sign, Ca, Csr, Error, OutputFormat, Result, ServeOptions, Server};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI definitions
// ============================================================================

#[derive(Parser)]
#[command(name = "certd")]
#[command(about = "Minimal self-hosted certificate authority")]
#[command(version)]
#[command(after_help = "\
EXAMPLES:
    certd setup --config ca.json                       # Create a CA
    certd request --config ca.json --hosts localhost   # Print a cert and key
    certd serve --config ca.json --setup               # Run the HTTPS endpoint
    certd export-ca --config ca.json --out ca.crt      # Export the CA cert

The endpoint accepts the Basic auth user and password in CERTD_USER and
CERTD_PASS (default admin/password).")]
struct Cli {
    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new CA and write it to the config file
    Setup {
        /// Path to the CA config
        #[arg(long)]
        config: PathBuf,
    },

    /// Sign a certificate for a list of hosts and print it with its key
    Request {
        /// Path to the CA config
        #[arg(long)]
        config: PathBuf,

        /// Comma separated list of IPs and hostnames
        #[arg(long)]
        hosts: String,

        /// Print the certificate as JSON
        #[arg(long)]
        json: bool,

        /// Create a new CA first, replacing any existing config
        #[arg(long)]
        setup: bool,
    },

    /// Run the HTTPS issuance endpoint
    Serve {
        /// Path to the CA config
        #[arg(long)]
        config: PathBuf,

        /// Create the CA if the config file does not exist
        #[arg(long)]
        setup: bool,

        /// Address to listen on
        #[arg(long, default_value = certd::config::DEFAULT_LISTEN)]
        listen: String,

        /// Port to listen on
        #[arg(long, default_value_t = certd::config::DEFAULT_PORT)]
        port: u16,

        /// IPs and hostnames for the serving certificate (default: listen address)
        #[arg(long)]
        cert_addrs: Option<String>,

        /// Maximum concurrent certificate issuances
        #[arg(long)]
        max_issuance: Option<usize>,
    },

    /// Write the CA certificate to a file
    ExportCa {
        /// Path to the CA config
        #[arg(long)]
        config: PathBuf,

        /// Where to write the certificate
        #[arg(long)]
        out: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Output helper that respects --quiet and --verbose flags.
#[derive(Clone, Copy)]
struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    fn new(quiet: bool, verbose: bool) -> Self {
        Self { quiet, verbose }
    }

    /// Print a standard message (suppressed with --quiet)
    fn print(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a verbose message (only shown with --verbose)
    fn verbose(&self, msg: &str) {
        if self.verbose {
            println!("{}", msg);
        }
    }
}

fn main() {
    // Reset SIGPIPE to default behavior (exit) instead of panic
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout carries only certificates and messages.
fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("certd={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let out = Output::new(cli.quiet, cli.verbose);

    if !matches!(cli.command, Commands::Completions { .. }) {
        init_logging(cli.quiet, cli.verbose);
    }

    match cli.command {
        Commands::Setup { config } => cmd_setup(&config, out),
        Commands::Request {
            config,
            hosts,
            json,
            setup,
        } => cmd_request(&config, &hosts, json, setup),
        Commands::Serve {
            config,
            setup,
            listen,
            port,
            cert_addrs,
            max_issuance,
        } => {
            let mut options = ServeOptions {
                listen,
                port,
                cert_addrs,
                ..Default::default()
            };
            if let Some(max) = max_issuance {
                if max == 0 {
                    return Err(Error::Config("--max-issuance must be at least 1".into()));
                }
                options.max_issuance = max;
            }
            cmd_serve(&config, setup, options, out)
        }
        Commands::ExportCa { config, out: path } => cmd_export_ca(&config, &path, out),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

fn cmd_setup(config: &Path, out: Output) -> Result<()> {
    let ca = Ca::setup(config)?;
    out.print(&format!(
        "config successfully written to \"{}\"",
        config.display()
    ));
    out.verbose(&format!(
        "  CA valid for {} days",
        ca.days_remaining().unwrap_or_default()
    ));
    Ok(())
}

fn cmd_request(config: &Path, hosts: &str, json: bool, setup: bool) -> Result<()> {
    let ca = if setup {
        Ca::setup(config)?
    } else {
        Ca::load(config)?
    };

    let csr = Csr::create(hosts)?;
    let cert = sign(&ca, csr)?;

    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };
    println!("{}", cert.render(format)?);
    Ok(())
}

fn cmd_serve(config: &Path, setup: bool, options: ServeOptions, out: Output) -> Result<()> {
    if setup && !config.exists() {
        Ca::setup(config)?;
        out.verbose(&format!("  CA config written to {}", config.display()));
    }

    let ca = Ca::load(config)?;
    ca.check_key_binding()?;

    let server = Server::new(ca, options);
    out.print(&format!(
        "Serving certificates on https://{}",
        server.options().bind_addr()
    ));
    out.print("Press Ctrl+C to stop");

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Config(format!("Failed to create runtime: {}", e)))?;

    runtime.block_on(server.run())
}

fn cmd_export_ca(config: &Path, path: &Path, out: Output) -> Result<()> {
    let ca = Ca::load(config)?;
    ca.write_certificate(path)?;
    out.print(&format!("CA certificate written to {}", path.display()));
    Ok(())
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "certd", &mut std::io::stdout());
    Ok(())
}
