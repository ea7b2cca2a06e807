// keyveil - command line front end for the crypto facade
// Keys travel as base64 strings; file operations run asynchronously

use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::Parser;

use keyveil::{AppConfig, Crypto, Data, HashAlgorithm, KeyPairType, SoftwareEngine};

#[derive(Parser, Debug)]
#[command(name = "keyveil")]
#[command(version)]
#[command(about = "Key handling, hybrid encryption and group sessions", long_about = None)]
struct Args {
    /// JSON configuration file; engine settings go under "engine"
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Generate a key pair
    Keygen {
        /// Key type name, e.g. ED25519
        #[arg(short = 't', long = "type")]
        key_type: Option<KeyPairType>,

        /// Derive the pair from base64 key material instead of randomness
        #[arg(long)]
        seed: Option<String>,
    },

    /// Hash a file
    Hash {
        input: PathBuf,

        /// SHA224, SHA256, SHA384 or SHA512
        #[arg(short, long)]
        algorithm: Option<HashAlgorithm>,
    },

    /// Encrypt a file for one or more recipients
    Encrypt {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recipient public key (base64), repeatable
        #[arg(short, long = "recipient", required = true)]
        recipients: Vec<String>,

        /// Pad plaintext to hide its length
        #[arg(long)]
        padding: bool,
    },

    /// Decrypt a file
    Decrypt {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Private key (base64)
        #[arg(short, long)]
        key: String,
    },

    /// Sign a file, printing the base64 signature
    Sign {
        input: PathBuf,

        /// Private key (base64)
        #[arg(short, long)]
        key: String,
    },

    /// Verify a file signature
    Verify {
        input: PathBuf,

        /// Signature (base64)
        #[arg(short, long)]
        signature: String,

        /// Signer public key (base64)
        #[arg(short, long)]
        key: String,
    },

    /// Print the session id a group id maps to
    GroupId { group_id: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => AppConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    tracing::debug!(?config, "configuration loaded");
    let crypto = Crypto::with_config(SoftwareEngine::new(config.engine), config.crypto);

    match args.command {
        Commands::Keygen { key_type, seed } => {
            let keys = match seed {
                Some(seed) => crypto.generate_keys_from_key_material(seed, key_type)?,
                None => crypto.generate_keys(key_type)?,
            };
            let private = crypto.export_private_key(&keys.private_key)?;
            println!("identifier:  {}", keys.public_key.identifier);
            println!("public key:  {}", keys.public_key.value());
            println!("private key: {}", STANDARD.encode(&*private));
        }

        Commands::Hash { input, algorithm } => {
            let data = tokio::fs::read(&input)
                .await
                .with_context(|| format!("reading {}", input.display()))?;
            println!("{}", hex::encode(crypto.calculate_hash(data, algorithm)?));
        }

        Commands::Encrypt {
            input,
            output,
            recipients,
            padding,
        } => {
            let public_keys = recipients
                .into_iter()
                .map(|key| crypto.import_public_key(key))
                .collect::<keyveil::Result<Vec<_>>>()?;
            let path = crypto
                .encrypt_file(&input, output.as_deref(), &public_keys, padding)
                .await?;
            println!("{}", path.display());
        }

        Commands::Decrypt { input, output, key } => {
            let private = crypto.import_private_key(key)?;
            let path = crypto.decrypt_file(&input, output.as_deref(), &private).await?;
            println!("{}", path.display());
        }

        Commands::Sign { input, key } => {
            let private = crypto.import_private_key(key)?;
            let signature = crypto.generate_file_signature(&input, &private).await?;
            println!("{}", STANDARD.encode(signature));
        }

        Commands::Verify {
            input,
            signature,
            key,
        } => {
            let public = crypto.import_public_key(key)?;
            if crypto.verify_file_signature(signature, &input, &public).await? {
                println!("signature OK");
            } else {
                anyhow::bail!("signature does not match");
            }
        }

        Commands::GroupId { group_id } => {
            println!("{}", crypto.calculate_group_session_id(Data::from(group_id))?);
        }
    }

    Ok(())
}
