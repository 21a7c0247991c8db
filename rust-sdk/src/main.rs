//! Kiket Audit - command line tool for webhook signatures and audit proofs.
//!
//! Computes content hashes, produces signed webhook fixtures, checks Merkle
//! inclusion proofs locally and queries the audit service. Results go to
//! stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kiket::audit::{verify_locally, AuditClient, BlockchainProof, ListAnchorsOptions};
use kiket::{compute_content_hash, generate_signature, ApiClient, Config};

#[derive(Parser)]
#[command(name = "kiket-audit", version, about = "Kiket webhook and audit proof tooling")]
struct Cli {
    /// Per-request timeout for audit service calls, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the content hash of a JSON object
    Hash {
        /// File holding a JSON object
        file: PathBuf,
    },

    /// Sign a webhook body, printing the signature and timestamp headers
    Sign {
        /// File holding the raw request body
        #[arg(long)]
        body: PathBuf,
        /// Webhook secret
        #[arg(long, env = "KIKET_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
        /// Unix timestamp to sign with; defaults to now
        #[arg(long, allow_hyphen_values = true)]
        timestamp: Option<i64>,
    },

    /// Check a proof locally, and optionally with the audit service
    Verify {
        /// File holding a proof as returned by the audit service
        proof: PathBuf,
        /// File holding the original record; its hash must match the proof
        #[arg(long)]
        record: Option<PathBuf>,
        /// Also ask the audit service for on-chain confirmation
        #[arg(long)]
        remote: bool,
    },

    /// List blockchain anchors
    Anchors {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        network: Option<String>,
        /// Only anchors covering records at or after this RFC 3339 time
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Only anchors covering records at or before this RFC 3339 time
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// Show one anchor by Merkle root
    Anchor {
        merkle_root: String,
        /// Include the anchor's leaf records
        #[arg(long)]
        records: bool,
    },

    /// Fetch the proof for an audit record
    Proof { record_id: i64 },
}

#[derive(Serialize)]
struct SignatureOutput {
    signature: String,
    timestamp: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize structured JSON logging on stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let timeout = cli.timeout_ms.map(Duration::from_millis);

    match cli.command {
        Command::Hash { file } => {
            let record = read_object(&file)?;
            println!("{}", compute_content_hash(&record));
        }

        Command::Sign {
            body,
            secret,
            timestamp,
        } => {
            let body = std::fs::read(&body)
                .with_context(|| format!("Failed to read {}", body.display()))?;
            let (signature, timestamp) = generate_signature(secret.as_bytes(), &body, timestamp)?;
            print_json(&SignatureOutput {
                signature,
                timestamp,
            })?;
        }

        Command::Verify {
            proof,
            record,
            remote,
        } => {
            let proof: BlockchainProof = read_json(&proof)?;

            if let Some(record) = record {
                let hash = compute_content_hash(&read_object(&record)?);
                if !hash.eq_ignore_ascii_case(&proof.content_hash) {
                    eprintln!(
                        "record hash {hash} does not match proof content hash {}",
                        proof.content_hash
                    );
                    return Ok(ExitCode::FAILURE);
                }
            }

            let local = verify_locally(&proof);
            info!(
                record_id = proof.record_id,
                proof_valid = local.proof_valid,
                "local_verification_complete"
            );

            let result = if remote {
                audit_client()?.verify(&proof, timeout).await?
            } else {
                local
            };

            print_json(&result)?;
            let ok = if remote { result.verified } else { result.proof_valid };
            return Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE });
        }

        Command::Anchors {
            status,
            network,
            from,
            to,
            page,
            per_page,
        } => {
            let options = ListAnchorsOptions {
                status,
                network,
                from,
                to,
                page,
                per_page,
            };
            let result = audit_client()?.list_anchors(&options, timeout).await?;
            print_json(&result)?;
        }

        Command::Anchor {
            merkle_root,
            records,
        } => {
            let anchor = audit_client()?
                .get_anchor(&merkle_root, records, timeout)
                .await?;
            print_json(&anchor)?;
        }

        Command::Proof { record_id } => {
            let proof = audit_client()?.get_proof(record_id, timeout).await?;
            print_json(&proof)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn audit_client() -> Result<AuditClient> {
    let config = Config::from_env();
    let api = ApiClient::new(config.client()).context("Failed to create API client")?;
    Ok(AuditClient::new(api))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    match read_json::<Value>(path)? {
        Value::Object(map) => Ok(map),
        _ => bail!("{} does not hold a JSON object", path.display()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}
