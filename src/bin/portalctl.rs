//! Portal-operator utility: key import and admin provisioning.
//!
//! Runs on the portal host against the portal database. It only ever handles
//! public key material; the sealed secret key stays with the key holder.
//!
//! Commands:
//! - `import-keys`: install the encryption and evaluation keys produced by
//!   `keyholder gen` so the portal can encrypt submissions and run tallies.
//! - `add-admin`: provision (or update) a staff account. The initial
//!   password is sourced from `CLASSGLASS_ADMIN_PASSWORD_FD` /
//!   `CLASSGLASS_ADMIN_PASSWORD_FILE` / the Docker secret mount, and hashed
//!   with Argon2id before it touches the database.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use class_glass::adapters::sqlite::SqliteStore;
use class_glass::config::{read_secret, PortalConfig, ADMIN_PASSWORD};
use class_glass::domain::{kdf, EncryptionKey, EvaluationKey, PortalKeys, Role};
use class_glass::ports::{ApplicationStore, CredentialStore};

const USAGE: &str = "Usage: portalctl <command>\n\
  import-keys --public <path> --eval <path> [--db <path>]\n\
  add-admin   --email <email> --role reviewer|registrar [--db <path>]";

fn main() -> Result<()> {
    let _guard = class_glass::telemetry::init()?;

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("import-keys") => cmd_import_keys(args),
        Some("add-admin") => cmd_add_admin(args),
        Some("-h" | "--help") => {
            println!("{USAGE}");
            Ok(())
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    match args.next() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("{flag} requires a value\n{USAGE}"),
    }
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteStore> {
    let path = db.unwrap_or_else(|| PortalConfig::from_env_or_default().db_path);
    SqliteStore::new(&path).with_context(|| format!("opening portal database {path:?}"))
}

fn cmd_import_keys(mut args: impl Iterator<Item = String>) -> Result<()> {
    let mut public_path: Option<PathBuf> = None;
    let mut eval_path: Option<PathBuf> = None;
    let mut db: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--public" => public_path = Some(next_value(&mut args, "--public")?.into()),
            "--eval" => eval_path = Some(next_value(&mut args, "--eval")?.into()),
            "--db" => db = Some(next_value(&mut args, "--db")?.into()),
            other => bail!("Unknown arg: {other}\n{USAGE}"),
        }
    }

    let public_path = public_path.with_context(|| format!("--public is required\n{USAGE}"))?;
    let eval_path = eval_path.with_context(|| format!("--eval is required\n{USAGE}"))?;

    let encryption = EncryptionKey::from_bytes(
        std::fs::read(&public_path).with_context(|| format!("reading {public_path:?}"))?,
    );
    let evaluation = EvaluationKey::from_bytes(
        std::fs::read(&eval_path).with_context(|| format!("reading {eval_path:?}"))?,
    );

    let store = open_store(db)?;
    store.save_portal_keys(&PortalKeys {
        encryption: encryption.clone(),
        evaluation: evaluation.clone(),
    })?;

    println!("Installed portal keys (encryption {}, evaluation {})",
        encryption.fingerprint, evaluation.fingerprint);
    Ok(())
}

fn cmd_add_admin(mut args: impl Iterator<Item = String>) -> Result<()> {
    let mut email: Option<String> = None;
    let mut role: Option<Role> = None;
    let mut db: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--email" => email = Some(next_value(&mut args, "--email")?),
            "--role" => {
                let value = next_value(&mut args, "--role")?;
                role = Some(
                    Role::parse(&value)
                        .with_context(|| format!("unknown role '{value}' (expected reviewer or registrar)"))?,
                );
            }
            "--db" => db = Some(next_value(&mut args, "--db")?.into()),
            other => bail!("Unknown arg: {other}\n{USAGE}"),
        }
    }

    let email = email.with_context(|| format!("--email is required\n{USAGE}"))?;
    let role = role.with_context(|| format!("--role is required\n{USAGE}"))?;
    if !email.contains('@') {
        bail!("--email does not look like an email address");
    }

    let password = read_secret(ADMIN_PASSWORD)?;
    let hash = kdf::hash_password(&password).context("hashing admin password")?;

    let store = open_store(db)?;
    store.upsert_account(&email, &hash, role)?;

    println!("Provisioned {role} account");
    Ok(())
}
