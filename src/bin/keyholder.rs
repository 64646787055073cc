//! Key-holder utility for the admissions portal.
//!
//! Runs on the key holder's machine, never on the portal host; this is what
//! keeps the secret key out of the store operator's reach. Two commands:
//!
//! - `gen`: generate an FHE key set. The secret key is sealed under a
//!   passphrase (Argon2id + AES-256-GCM) and written with 0600 permissions;
//!   the public encryption and evaluation keys are written as plain files to
//!   hand to the portal operator (`portalctl import-keys`).
//! - `decrypt-report`: decrypt an aggregate report exported by the portal
//!   and print per-category totals. Totals only; there is nothing else this
//!   key can decrypt out of the report file.
//!
//! # Passphrase
//!
//! Sourced from `CLASSGLASS_KEYHOLDER_PASSPHRASE_FD`, then
//! `CLASSGLASS_KEYHOLDER_PASSPHRASE_FILE`, then the Docker secret mount. In
//! debug builds only, the `CLASSGLASS_KEYHOLDER_PASSPHRASE` env var works as
//! an escape hatch.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use class_glass::adapters::tfhe::TfheAdapter;
use class_glass::application::{decrypt_report, AggregateReport};
use class_glass::config::{read_secret, KEYHOLDER_PASSPHRASE};
use class_glass::domain::{kdf, SecretKey};
use class_glass::ports::FheEngine;

const USAGE: &str = "Usage: keyholder <command>\n\
  gen            [--out-secret <path>] [--out-public <path>] [--out-eval <path>] [--force]\n\
  decrypt-report --report <path> --secret <path>";

fn main() -> Result<()> {
    let _guard = class_glass::telemetry::init()?;

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("gen") => cmd_gen(args),
        Some("decrypt-report") => cmd_decrypt_report(args),
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

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<PathBuf> {
    match args.next() {
        Some(v) if !v.is_empty() => Ok(PathBuf::from(v)),
        _ => bail!("{flag} requires a path\n{USAGE}"),
    }
}

fn refuse_overwrite(path: &PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("Refusing to overwrite existing file {path:?}. Use --force.");
    }
    Ok(())
}

fn write_with_mode(path: &PathBuf, bytes: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    use std::io::Write;
    let mut file = opts.open(path).with_context(|| format!("opening {path:?}"))?;
    file.write_all(bytes)
        .with_context(|| format!("writing {path:?}"))?;
    Ok(())
}

fn cmd_gen(mut args: impl Iterator<Item = String>) -> Result<()> {
    let mut out_secret = PathBuf::from("secret.key");
    let mut out_public = PathBuf::from("encryption.key");
    let mut out_eval = PathBuf::from("evaluation.key");
    let mut force = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out-secret" => out_secret = next_value(&mut args, "--out-secret")?,
            "--out-public" => out_public = next_value(&mut args, "--out-public")?,
            "--out-eval" => out_eval = next_value(&mut args, "--out-eval")?,
            "--force" => force = true,
            other => bail!("Unknown arg: {other}\n{USAGE}"),
        }
    }

    refuse_overwrite(&out_secret, force)?;
    refuse_overwrite(&out_public, force)?;
    refuse_overwrite(&out_eval, force)?;

    let passphrase = read_secret(KEYHOLDER_PASSPHRASE)?;

    let adapter = TfheAdapter::new();
    let keys = adapter.generate_keys().context("generating FHE key set")?;

    let sealed = kdf::seal_key(keys.secret.as_bytes(), &passphrase)
        .context("sealing secret key")?;
    write_with_mode(&out_secret, &sealed.to_bytes(), 0o600)?;

    // Public material: readable is fine, nothing here can decrypt.
    write_with_mode(&out_public, keys.encryption.as_bytes(), 0o644)?;
    write_with_mode(&out_eval, keys.evaluation.as_bytes(), 0o644)?;

    // Print only non-secret material.
    println!("Wrote sealed secret key to {out_secret:?}");
    println!("Wrote encryption key to {out_public:?} (fingerprint {})", keys.encryption.fingerprint);
    println!("Wrote evaluation key to {out_eval:?} (fingerprint {})", keys.evaluation.fingerprint);
    println!("Hand the encryption and evaluation keys to the portal operator; keep the sealed secret key here.");

    Ok(())
}

fn cmd_decrypt_report(mut args: impl Iterator<Item = String>) -> Result<()> {
    let mut report_path: Option<PathBuf> = None;
    let mut secret_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--report" => report_path = Some(next_value(&mut args, "--report")?),
            "--secret" => secret_path = Some(next_value(&mut args, "--secret")?),
            other => bail!("Unknown arg: {other}\n{USAGE}"),
        }
    }

    let report_path = report_path.with_context(|| format!("--report is required\n{USAGE}"))?;
    let secret_path = secret_path.with_context(|| format!("--secret is required\n{USAGE}"))?;

    let passphrase = read_secret(KEYHOLDER_PASSPHRASE)?;

    let sealed_bytes =
        std::fs::read(&secret_path).with_context(|| format!("reading {secret_path:?}"))?;
    let sealed = kdf::SealedKey::from_bytes(&sealed_bytes).context("parsing sealed secret key")?;
    let secret = SecretKey::from_bytes(kdf::open_key(&sealed, &passphrase)?);

    let report_json =
        std::fs::read_to_string(&report_path).with_context(|| format!("reading {report_path:?}"))?;
    let report: AggregateReport =
        serde_json::from_str(&report_json).context("parsing aggregate report")?;

    let adapter = TfheAdapter::new();
    let decrypted = decrypt_report(&adapter, &report, &secret)?;

    println!(
        "Aggregate report for '{}' (schema v{}, {} records):",
        decrypted.field, decrypted.schema_version, report.record_count
    );
    for (label, count) in &decrypted.counts {
        println!("  {label:<12} {count}");
    }

    Ok(())
}
