//! FieldGuide product key tool
//!
//! Vendor side:
//!   fieldguide-keytool keygen --out signing.key
//!   fieldguide-keytool issue --signing-key signing.key --type admin \
//!       --customer 42 --expires 2027-06-30 --feature editor \
//!       --manifest fieldguide-license/data/signatures.json
//!
//! Customer machine:
//!   fieldguide-keytool activate XXXXX-XXXXX-XXXXX-XXXXX-XXXXX
//!   fieldguide-keytool status
//!   fieldguide-keytool deactivate

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fieldguide_keytool::{
    generate_signing_key, load_signing_key, load_trust, parse_expiry, parse_features,
    public_key_literal, record_signature, KeyReport,
};
use fieldguide_license::{
    ActivationOutcome, KeyPayload, LicenseConfig, LicenseType, Licensing, ProductKeyValidator,
    StandardHasher, SystemDeviceIdentity,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "fieldguide-keytool")]
#[command(about = "Issue FieldGuide product keys and manage activation")]
struct Cli {
    /// Licensing data directory (defaults to $FIELDGUIDE_DATA_DIR or the
    /// platform data directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new Ed25519 signing key
    Keygen {
        /// Where to write the 32-byte seed
        #[arg(short, long, default_value = "signing.key")]
        out: PathBuf,
    },
    /// Issue a product key and record its signature in a manifest
    Issue(IssueArgs),
    /// Decode and validate a key without activating
    Inspect {
        key: String,
        #[command(flatten)]
        trust: TrustArgs,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Activate this machine
    Activate {
        key: String,
        /// Ask the online activation registry
        #[arg(long)]
        force_online: bool,
        #[command(flatten)]
        trust: TrustArgs,
    },
    /// Remove this machine's activation
    Deactivate,
    /// Show the current license
    Status {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct IssueArgs {
    /// Signing key written by `keygen`
    #[arg(short, long, default_value = "signing.key")]
    signing_key: PathBuf,

    /// License tier
    #[arg(short = 't', long = "type", value_enum)]
    license_type: Tier,

    /// Customer account number
    #[arg(short, long)]
    customer: u32,

    /// Expiration date (YYYY-MM-DD, UTC); omit for a perpetual key
    #[arg(short, long)]
    expires: Option<String>,

    /// Feature to unlock (repeatable)
    #[arg(short, long = "feature")]
    features: Vec<String>,

    /// Signature manifest to append to
    #[arg(short, long, default_value = "signatures.json")]
    manifest: PathBuf,
}

/// Overrides for the embedded verification material.
#[derive(Args, Debug)]
struct TrustArgs {
    /// Signature manifest to validate against
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Hex-encoded Ed25519 public key to verify with
    #[arg(long)]
    public_key: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Tier {
    Tech,
    Admin,
    Trial,
}

impl From<Tier> for LicenseType {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Tech => LicenseType::Tech,
            Tier::Admin => LicenseType::Admin,
            Tier::Trial => LicenseType::Trial,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = match &cli.data_dir {
        Some(dir) => LicenseConfig::with_data_dir(dir),
        None => LicenseConfig::default(),
    };

    match cli.command {
        Command::Keygen { out } => keygen(out),
        Command::Issue(args) => issue(args),
        Command::Inspect { key, trust, json } => inspect(&key, &trust, json),
        Command::Activate {
            key,
            force_online,
            trust,
        } => activate(&config, &key, force_online, &trust),
        Command::Deactivate => {
            licensing(&config, None)?.activation.deactivate()?;
            println!("Deactivated.");
            Ok(())
        }
        Command::Status { json } => status(&config, json),
    }
}

fn keygen(out: PathBuf) -> Result<()> {
    let issuer = generate_signing_key(&out)?;
    let public_key = issuer.public_key();
    println!("Signing key: {}", out.display());
    println!("Public key (hex): {}", hex::encode(public_key));
    println!("Public key (embed): {}", public_key_literal(&public_key));
    Ok(())
}

fn issue(args: IssueArgs) -> Result<()> {
    let issuer = load_signing_key(&args.signing_key)?;
    let payload = KeyPayload {
        license_type: args.license_type.into(),
        expires_at: args.expires.as_deref().map(parse_expiry).transpose()?,
        customer_id: args.customer,
        feature_flags: parse_features(&args.features)?,
    };

    let issued = issuer.issue(&payload)?;
    let entries = record_signature(&args.manifest, &issued)?;
    info!(
        "Recorded signature {} in {:?} ({} entries)",
        issued.reference, args.manifest, entries
    );
    println!("{}", issued.key);
    Ok(())
}

fn inspect(key: &str, trust: &TrustArgs, json: bool) -> Result<()> {
    let (verifier, registry) = load_trust(trust.manifest.as_deref(), trust.public_key.as_deref())?;
    let validator = ProductKeyValidator::new(verifier, registry, Arc::new(StandardHasher));
    let report = KeyReport::from(&validator.parse_and_validate(key));

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Valid:        {}", report.valid);
    if let Some(error) = &report.error {
        println!("Error:        {error}");
    }
    if let Some(license_type) = &report.license_type {
        println!("Type:         {license_type}");
    }
    if let Some(expiration) = &report.expiration_date {
        println!("Expires:      {expiration}");
    }
    if let Some(customer) = report.customer_id {
        println!("Customer:     {customer}");
    }
    if !report.features.is_empty() {
        println!("Features:     {}", report.features.join(", "));
    }
    Ok(())
}

fn activate(config: &LicenseConfig, key: &str, force_online: bool, trust: &TrustArgs) -> Result<()> {
    let licensing = licensing(config, Some(trust))?;
    match licensing.activation.activate(key, force_online)? {
        ActivationOutcome::Activated(token) => {
            println!("Activated: {} license", token.license_type().name());
            Ok(())
        }
        ActivationOutcome::Rejected(failure) => bail!("Activation failed: {failure}"),
    }
}

fn status(config: &LicenseConfig, json: bool) -> Result<()> {
    let info = licensing(config, None)?.manager.license_info()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    if !info.is_activated {
        println!("Not activated.");
        return Ok(());
    }
    if let Some(license_type) = info.license_type {
        println!("License:      {}", license_type.name());
    }
    match (info.expiration_date, info.days_remaining) {
        (Some(at), Some(days)) => {
            println!("Expires:      {} ({days} days left)", at.format("%Y-%m-%d"));
        }
        _ => println!("Expires:      never"),
    }
    if let Some(customer) = &info.customer_id {
        println!("Customer:     {customer}");
    }
    let features: Vec<&str> = info.enabled_features.iter().map(String::as_str).collect();
    println!("Features:     {}", features.join(", "));
    Ok(())
}

fn licensing(config: &LicenseConfig, trust: Option<&TrustArgs>) -> Result<Licensing> {
    let (manifest, public_key) = trust
        .map(|t| (t.manifest.as_deref(), t.public_key.as_deref()))
        .unwrap_or_default();
    let (verifier, registry) = load_trust(manifest, public_key)?;
    Ok(Licensing::with_collaborators(
        config,
        verifier,
        registry,
        Arc::new(SystemDeviceIdentity),
    ))
}
