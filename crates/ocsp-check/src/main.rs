mod config;

use clap::Parser;
use config::CliConfig;
use ocsp_proto::{
    extract_ocsp_url, load_file, CertStatus, CertificateFormat, CheckOptions, CheckResult,
    ErrorKind, HashAlgorithm, OcspClient, OcspError,
};
use std::path::PathBuf;
use std::process;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_REVOKED: i32 = 1;
const EXIT_UNKNOWN: i32 = 2;
const EXIT_INPUT: i32 = 3;
const EXIT_TRANSPORT: i32 = 4;
const EXIT_PROTOCOL: i32 = 5;

/// Query an OCSP responder for the revocation status of a certificate
///
/// Exit status: 0 good, 1 revoked, 2 unknown, 3 bad input,
/// 4 transport failure, 5 protocol or configuration failure.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "ocsp-check")]
struct Cli {
    /// Certificate to check (PEM, DER or bare base64)
    #[arg(long, value_name = "FILE", required_unless_present = "write_example")]
    cert: Option<PathBuf>,

    /// Certificate of the issuing CA
    #[arg(long, value_name = "FILE", required_unless_present = "write_example")]
    issuer: Option<PathBuf>,

    /// Responder URL (defaults to the certificate's AIA OCSP entry)
    #[arg(long, env = "OCSP_URL")]
    url: Option<String>,

    /// Identifier of the checked entity, included in log lines
    #[arg(long)]
    entity: Option<String>,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write an example configuration file and exit
    #[arg(long, value_name = "FILE")]
    write_example: Option<PathBuf>,

    /// CertID hash algorithm (sha1, sha256, sha384, sha512)
    #[arg(long)]
    hash: Option<HashAlgorithm>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Do not send a nonce
    #[arg(long)]
    no_nonce: bool,

    /// Fail when the responder does not echo the nonce
    #[arg(long, conflicts_with = "no_nonce")]
    require_nonce: bool,

    /// Use HTTP GET for small requests
    #[arg(long)]
    get: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the file configuration
    fn apply(&self, config: &mut CliConfig) {
        let ocsp = &mut config.ocsp;
        if let Some(hash) = self.hash {
            ocsp.hash_algorithm = hash;
        }
        if let Some(timeout) = self.timeout {
            ocsp.request_timeout_secs = timeout;
        }
        if self.no_nonce {
            ocsp.nonce_enabled = false;
        }
        if self.require_nonce {
            ocsp.nonce_required = true;
        }
        if self.get {
            ocsp.use_get_for_small_requests = true;
        }
    }
}

fn status_exit_code(result: &CheckResult) -> i32 {
    match result.status() {
        CertStatus::Good => 0,
        CertStatus::Revoked { .. } => EXIT_REVOKED,
        CertStatus::Unknown => EXIT_UNKNOWN,
    }
}

fn error_exit_code(err: &OcspError) -> i32 {
    match err.kind() {
        ErrorKind::Input => EXIT_INPUT,
        ErrorKind::Transport => EXIT_TRANSPORT,
        ErrorKind::Protocol | ErrorKind::Config => EXIT_PROTOCOL,
    }
}

fn print_result(result: &CheckResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(out) => println!("{}", out),
            Err(e) => error!("Failed to serialize result: {}", e),
        }
        return;
    }

    println!("Status:       {}", result.status());
    println!("This update:  {}", result.this_update());
    match result.next_update() {
        Some(next) => println!("Next update:  {}", next),
        None => println!("Next update:  (none)"),
    }
    println!("Produced at:  {}", result.produced_at());
}

async fn run(cli: &Cli, config: CliConfig) -> Result<CheckResult, OcspError> {
    let (Some(cert_path), Some(issuer_path)) = (&cli.cert, &cli.issuer) else {
        return Err(OcspError::Config(
            "--cert and --issuer are required".to_string(),
        ));
    };

    let cert = load_file(cert_path, CertificateFormat::Auto)?;
    let issuer = load_file(issuer_path, CertificateFormat::Auto)?;

    let url = match &cli.url {
        Some(url) => url.clone(),
        None => extract_ocsp_url(&cert)?,
    };
    debug!(url = %url, serial = %cert.serial_hex(), "Checking certificate");

    let client = OcspClient::new(config.ocsp)?;
    let options = CheckOptions {
        entity: cli.entity.clone(),
    };
    client.check_certificates(&cert, &issuer, &url, &options).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(path) = &cli.write_example {
        if let Err(e) = CliConfig::example().to_file(path) {
            eprintln!("Error writing example config: {}", e);
            process::exit(EXIT_INPUT);
        }
        println!("Wrote example configuration to {}", path.display());
        process::exit(0);
    }

    let mut config = match &cli.config {
        Some(path) => match CliConfig::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Configuration error in {}: {}", path.display(), e);
                process::exit(EXIT_PROTOCOL);
            }
        },
        None => CliConfig::default(),
    };
    cli.apply(&mut config);

    // Logs go to stderr so stdout stays parseable with --json
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level())))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&cli, config).await {
        Ok(result) => {
            print_result(&result, cli.json);
            process::exit(status_exit_code(&result));
        }
        Err(e) => {
            error!(kind = ?e.kind(), "OCSP check failed: {}", e);
            if cli.json {
                let out = serde_json::json!({
                    "error": e.to_string(),
                    "kind": format!("{:?}", e.kind()).to_lowercase(),
                });
                println!("{}", out);
            }
            process::exit(error_exit_code(&e));
        }
    }
}
