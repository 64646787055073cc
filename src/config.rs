//! Runtime configuration sourced from the environment.
//!
//! All values have safe defaults; malformed overrides are ignored rather than
//! aborting startup. Secrets (key-holder passphrase, admin passwords) are NOT
//! read from plain environment variables in release builds; see
//! [`read_secret`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use zeroize::Zeroizing;

/// Configuration for portal services.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,

    /// Lifetime of an admin session token.
    pub session_ttl: chrono::Duration,

    /// Upper bound for encryption and authentication calls.
    pub op_timeout: Duration,

    /// Backoff before the single retry of a failed encryption call.
    pub retry_backoff: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("classglass.db"),
            session_ttl: chrono::Duration::minutes(30),
            op_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl PortalConfig {
    /// Load config overrides from environment (best-effort).
    ///
    /// Supported:
    /// - `CLASSGLASS_DB_PATH`
    /// - `CLASSGLASS_SESSION_TTL_MINUTES`
    /// - `CLASSGLASS_OP_TIMEOUT_SECS`
    /// - `CLASSGLASS_RETRY_BACKOFF_MS`
    #[must_use]
    pub fn from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("CLASSGLASS_DB_PATH") {
            if !v.trim().is_empty() {
                cfg.db_path = PathBuf::from(v.trim());
            }
        }

        if let Ok(v) = std::env::var("CLASSGLASS_SESSION_TTL_MINUTES") {
            if let Ok(minutes) = v.trim().parse::<i64>() {
                if minutes > 0 {
                    cfg.session_ttl = chrono::Duration::minutes(minutes);
                }
            }
        }

        if let Ok(v) = std::env::var("CLASSGLASS_OP_TIMEOUT_SECS") {
            if let Ok(secs) = v.trim().parse::<u64>() {
                if secs > 0 {
                    cfg.op_timeout = Duration::from_secs(secs);
                }
            }
        }

        if let Ok(v) = std::env::var("CLASSGLASS_RETRY_BACKOFF_MS") {
            if let Ok(ms) = v.trim().parse::<u64>() {
                cfg.retry_backoff = Duration::from_millis(ms);
            }
        }

        cfg
    }
}

/// Error raised when a secret cannot be obtained from any configured source.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("Missing secret: provide {fd_env} or {file_env} (or mount {secret_path})")]
pub struct MissingSecret {
    pub fd_env: &'static str,
    pub file_env: &'static str,
    pub secret_path: &'static str,
}

/// Where a secret may be sourced from, in precedence order:
/// an already-open file descriptor, an explicit file path, a Docker/Compose
/// secret mount, and (debug builds only) a plain environment variable.
#[derive(Debug, Clone, Copy)]
pub struct SecretSource {
    /// Env var naming an open FD to read the secret from (Unix only).
    pub fd_env: &'static str,
    /// Env var naming a file path to read the secret from.
    pub file_env: &'static str,
    /// Default Docker secret mount path.
    pub secret_path: &'static str,
    /// Dev-only env var holding the secret itself (refused in release builds).
    pub dev_env: &'static str,
}

/// Secret source for the key holder's sealing passphrase.
pub const KEYHOLDER_PASSPHRASE: SecretSource = SecretSource {
    fd_env: "CLASSGLASS_KEYHOLDER_PASSPHRASE_FD",
    file_env: "CLASSGLASS_KEYHOLDER_PASSPHRASE_FILE",
    secret_path: "/run/secrets/classglass_keyholder_passphrase",
    dev_env: "CLASSGLASS_KEYHOLDER_PASSPHRASE",
};

/// Secret source for the initial password of a provisioned admin account.
pub const ADMIN_PASSWORD: SecretSource = SecretSource {
    fd_env: "CLASSGLASS_ADMIN_PASSWORD_FD",
    file_env: "CLASSGLASS_ADMIN_PASSWORD_FILE",
    secret_path: "/run/secrets/classglass_admin_password",
    dev_env: "CLASSGLASS_ADMIN_PASSWORD",
};

fn trimmed_secret(raw: &str) -> Option<Zeroizing<String>> {
    let secret = raw.trim_end_matches(['\n', '\r']).to_string();
    if secret.is_empty() {
        None
    } else {
        Some(Zeroizing::new(secret))
    }
}

/// Read a secret from the first available source in `source`.
///
/// In release builds the dev env var is never consulted.
///
/// # Errors
/// Returns [`MissingSecret`] if no source yields a non-empty secret.
pub fn read_secret(source: SecretSource) -> Result<Zeroizing<String>, MissingSecret> {
    let missing = MissingSecret {
        fd_env: source.fd_env,
        file_env: source.file_env,
        secret_path: source.secret_path,
    };

    // 1) Read from an already-open FD (systemd / K8s sidecar friendly).
    #[cfg(unix)]
    if let Ok(fd_str) = std::env::var(source.fd_env) {
        use std::io::Read;
        use std::os::unix::io::FromRawFd;

        let fd: i32 = fd_str.trim().parse().map_err(|_| missing)?;
        if fd <= 2 {
            // Refuse stdio FDs.
            return Err(missing);
        }

        // SAFETY: we take ownership of the FD for a one-time read and close it.
        let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
        let mut buf = String::new();
        file.read_to_string(&mut buf).map_err(|_| missing)?;
        return trimmed_secret(&buf).ok_or(missing);
    }

    // 2) Read from an explicit file path.
    if let Ok(path) = std::env::var(source.file_env) {
        let content = std::fs::read_to_string(path.trim()).map_err(|_| missing)?;
        return trimmed_secret(&content).ok_or(missing);
    }

    // 3) Docker secrets default path.
    if Path::new(source.secret_path).exists() {
        let content = std::fs::read_to_string(source.secret_path).map_err(|_| missing)?;
        return trimmed_secret(&content).ok_or(missing);
    }

    // 4) Dev-only env var (refused in release builds).
    if cfg!(debug_assertions) {
        if let Ok(v) = std::env::var(source.dev_env) {
            return trimmed_secret(&v).ok_or(missing);
        }
    }

    Err(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PortalConfig::default();
        assert_eq!(cfg.session_ttl, chrono::Duration::minutes(30));
        assert_eq!(cfg.op_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("CLASSGLASS_SESSION_TTL_MINUTES", "5");
        std::env::set_var("CLASSGLASS_OP_TIMEOUT_SECS", "not-a-number");

        let cfg = PortalConfig::from_env_or_default();
        assert_eq!(cfg.session_ttl, chrono::Duration::minutes(5));
        // Malformed override falls back to the default.
        assert_eq!(cfg.op_timeout, Duration::from_secs(30));

        std::env::remove_var("CLASSGLASS_SESSION_TTL_MINUTES");
        std::env::remove_var("CLASSGLASS_OP_TIMEOUT_SECS");
    }

    #[test]
    fn test_secret_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("passphrase");
        std::fs::write(&path, "hunter2-but-longer\n").expect("write secret");

        std::env::set_var(
            "CLASSGLASS_KEYHOLDER_PASSPHRASE_FILE",
            path.to_str().expect("utf8 path"),
        );
        let secret = read_secret(KEYHOLDER_PASSPHRASE).expect("secret should load");
        assert_eq!(secret.as_str(), "hunter2-but-longer");
        std::env::remove_var("CLASSGLASS_KEYHOLDER_PASSPHRASE_FILE");
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        // No sources configured for this bogus purpose.
        let source = SecretSource {
            fd_env: "CLASSGLASS_TEST_NO_SUCH_FD",
            file_env: "CLASSGLASS_TEST_NO_SUCH_FILE",
            secret_path: "/run/secrets/classglass_test_no_such_secret",
            dev_env: "CLASSGLASS_TEST_NO_SUCH_SECRET",
        };
        assert!(read_secret(source).is_err());
    }
}
