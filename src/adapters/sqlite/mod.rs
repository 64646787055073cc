//! SQLite adapter: Implementation of the store and credential ports.
//!
//! Provides durable persistence for applications, their sensitive-field
//! ciphertexts, the append-only audit log, admin credentials and the portal's
//! public key material. State survives process restarts by design.
//!
//! # Concurrency
//!
//! The connection is protected by a `Mutex`, and every multi-statement write
//! runs inside an IMMEDIATE transaction, so concurrent transitions on the
//! same application id serialize: one wins, the other observes the
//! post-transition state and either no-ops or fails with an invalid
//! transition. A poisoned mutex (panic in another thread) fails fast; that is
//! intentional for data integrity.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::domain::{
    Application, ApplicationStatus, AuditEntry, EncryptionKey, EvaluationKey, PortalKeys, Role,
    SensitiveCiphertext, StatusFilter, TransitionError, TransitionOutcome,
};
use crate::ports::{AdminAccount, ApplicationStore, CredentialStore, StatusCounts};

/// Default busy timeout for competing writers (ms).
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Application not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// SQLite storage adapter.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given database path.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    /// Returns error if the database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize pragmas and the database schema.
    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().expect("Lock failed");

        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        // WAL keeps aggregation reads from blocking behind review writes.
        let _mode: String =
            conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                email TEXT NOT NULL,
                status TEXT NOT NULL,
                schema_version INTEGER NOT NULL,
                submitted_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sensitive_fields (
                application_id TEXT NOT NULL REFERENCES applications(id),
                field TEXT NOT NULL,
                schema_version INTEGER NOT NULL,
                ciphertext BLOB NOT NULL,
                key_fingerprint TEXT NOT NULL,
                PRIMARY KEY (application_id, field)
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id TEXT NOT NULL,
                actor TEXT NOT NULL,
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS admins (
                email TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS portal_keys (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                encryption_key BLOB NOT NULL,
                evaluation_key BLOB NOT NULL,
                encryption_fingerprint TEXT NOT NULL,
                evaluation_fingerprint TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_applications_status
                ON applications(status);
            CREATE INDEX IF NOT EXISTS idx_audit_application
                ON audit_log(application_id);
            ",
        )?;

        Ok(())
    }

    fn parse_status(s: &str) -> Result<ApplicationStatus, StorageError> {
        ApplicationStatus::parse(s)
            .ok_or_else(|| StorageError::Serialization(format!("Unknown status '{s}' in store")))
    }

    fn parse_timestamp(s: &str) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now())
    }

    /// Load the sensitive-field ciphertexts for one application.
    fn load_fields(
        conn: &Connection,
        application_id: &str,
    ) -> Result<Vec<SensitiveCiphertext>, StorageError> {
        let mut stmt = conn.prepare(
            r"
            SELECT field, schema_version, ciphertext, key_fingerprint
            FROM sensitive_fields
            WHERE application_id = ?1
            ORDER BY rowid ASC
            ",
        )?;

        let fields = stmt
            .query_map(params![application_id], |row| {
                let field: String = row.get(0)?;
                let schema_version: i64 = row.get(1)?;
                let ciphertext: Vec<u8> = row.get(2)?;
                let key_fingerprint: String = row.get(3)?;
                Ok(SensitiveCiphertext::new(
                    field,
                    schema_version as u32,
                    ciphertext,
                    key_fingerprint,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(fields)
    }

    fn row_to_application(
        conn: &Connection,
        id: String,
        full_name: String,
        email: String,
        status_str: String,
        schema_version: i64,
        submitted_at_str: String,
    ) -> Result<Application, StorageError> {
        let sensitive_fields = Self::load_fields(conn, &id)?;
        Ok(Application {
            id,
            full_name,
            email,
            status: Self::parse_status(&status_str)?,
            schema_version: schema_version as u32,
            sensitive_fields,
            submitted_at: Self::parse_timestamp(&submitted_at_str),
        })
    }
}

impl ApplicationStore for SqliteStore {
    type Error = StorageError;

    fn submit(&self, application: &Application) -> Result<(), Self::Error> {
        let mut conn = self.conn.lock().expect("Lock failed");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            r"
            INSERT INTO applications (
                id, full_name, email, status, schema_version, submitted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                application.id,
                application.full_name,
                application.email,
                application.status.as_str(),
                application.schema_version as i64,
                application.submitted_at.to_rfc3339(),
            ],
        )?;

        for ct in &application.sensitive_fields {
            tx.execute(
                r"
                INSERT INTO sensitive_fields (
                    application_id, field, schema_version, ciphertext, key_fingerprint
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![
                    application.id,
                    ct.field,
                    ct.schema_version as i64,
                    ct.ciphertext,
                    ct.key_fingerprint,
                ],
            )?;
        }

        tx.commit()?;

        tracing::debug!(id = %application.id, "Persisted application");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Application>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let row = conn
            .query_row(
                r"
                SELECT id, full_name, email, status, schema_version, submitted_at
                FROM applications
                WHERE id = ?1
                ",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, full_name, email, status, schema_version, submitted_at)) => {
                Ok(Some(Self::row_to_application(
                    &conn,
                    id,
                    full_name,
                    email,
                    status,
                    schema_version,
                    submitted_at,
                )?))
            }
            None => Ok(None),
        }
    }

    fn transition_status(
        &self,
        id: &str,
        target: ApplicationStatus,
        actor: &str,
    ) -> Result<TransitionOutcome, Self::Error> {
        let mut conn = self.conn.lock().expect("Lock failed");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM applications WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(current) = current else {
            return Err(StorageError::NotFound(id.to_string()));
        };
        let from = Self::parse_status(&current)?;

        let outcome = from.apply(target)?;
        if let TransitionOutcome::Applied { from } = outcome {
            let now = chrono::Utc::now().to_rfc3339();

            tx.execute(
                "UPDATE applications SET status = ?1 WHERE id = ?2",
                params![target.as_str(), id],
            )?;
            tx.execute(
                r"
                INSERT INTO audit_log (
                    application_id, actor, from_status, to_status, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![id, actor, from.as_str(), target.as_str(), now],
            )?;
            tx.commit()?;

            tracing::info!(id = %id, from = %from, to = %target, "Status transition applied");
        }

        Ok(outcome)
    }

    fn list(&self, filter: StatusFilter) -> Result<Vec<Application>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        // rowid preserves insertion order across status changes.
        let (sql, status_param) = match filter {
            StatusFilter::All => (
                r"
                SELECT id, full_name, email, status, schema_version, submitted_at
                FROM applications
                ORDER BY rowid ASC
                ",
                None,
            ),
            StatusFilter::Status(status) => (
                r"
                SELECT id, full_name, email, status, schema_version, submitted_at
                FROM applications
                WHERE status = ?1
                ORDER BY rowid ASC
                ",
                Some(status.as_str()),
            ),
        };

        let mut stmt = conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        };

        let rows: Vec<(String, String, String, String, i64, String)> = match status_param {
            Some(status) => stmt
                .query_map(params![status], map_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };

        let mut applications = Vec::with_capacity(rows.len());
        for (id, full_name, email, status, schema_version, submitted_at) in rows {
            applications.push(Self::row_to_application(
                &conn,
                id,
                full_name,
                email,
                status,
                schema_version,
                submitted_at,
            )?);
        }

        Ok(applications)
    }

    fn count_by_status(&self) -> Result<StatusCounts, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM applications GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            match Self::parse_status(&status)? {
                ApplicationStatus::Pending => counts.pending = n as usize,
                ApplicationStatus::Approved => counts.approved = n as usize,
                ApplicationStatus::Rejected => counts.rejected = n as usize,
            }
        }

        Ok(counts)
    }

    fn audit_entries(&self, id: &str) -> Result<Vec<AuditEntry>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let mut stmt = conn.prepare(
            r"
            SELECT application_id, actor, from_status, to_status, recorded_at
            FROM audit_log
            WHERE application_id = ?1
            ORDER BY seq ASC
            ",
        )?;

        let rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (application_id, actor, from_status, to_status, recorded_at) in rows {
            entries.push(AuditEntry {
                application_id,
                actor,
                from_status: Self::parse_status(&from_status)?,
                to_status: Self::parse_status(&to_status)?,
                recorded_at: Self::parse_timestamp(&recorded_at),
            });
        }

        Ok(entries)
    }

    fn field_ciphertexts(&self, field: &str) -> Result<Vec<SensitiveCiphertext>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        // Single statement under the connection lock: a consistent snapshot.
        let mut stmt = conn.prepare(
            r"
            SELECT field, schema_version, ciphertext, key_fingerprint
            FROM sensitive_fields
            WHERE field = ?1
            ORDER BY rowid ASC
            ",
        )?;

        let ciphertexts = stmt
            .query_map(params![field], |row| {
                let field: String = row.get(0)?;
                let schema_version: i64 = row.get(1)?;
                let ciphertext: Vec<u8> = row.get(2)?;
                let key_fingerprint: String = row.get(3)?;
                Ok(SensitiveCiphertext::new(
                    field,
                    schema_version as u32,
                    ciphertext,
                    key_fingerprint,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ciphertexts)
    }

    fn save_portal_keys(&self, keys: &PortalKeys) -> Result<(), Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            r"
            INSERT OR REPLACE INTO portal_keys (
                id, encryption_key, evaluation_key,
                encryption_fingerprint, evaluation_fingerprint, created_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ",
            params![
                keys.encryption.as_bytes(),
                keys.evaluation.as_bytes(),
                keys.encryption.fingerprint,
                keys.evaluation.fingerprint,
                now,
            ],
        )?;

        tracing::info!(
            encryption_fingerprint = %keys.encryption.fingerprint,
            "Installed portal key material"
        );
        Ok(())
    }

    fn load_portal_keys(&self) -> Result<Option<PortalKeys>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let row = conn
            .query_row(
                "SELECT encryption_key, evaluation_key FROM portal_keys WHERE id = 1",
                [],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?)),
            )
            .optional()?;

        Ok(row.map(|(encryption, evaluation)| PortalKeys {
            encryption: EncryptionKey::from_bytes(encryption),
            evaluation: EvaluationKey::from_bytes(evaluation),
        }))
    }

    fn has_portal_keys(&self) -> Result<bool, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM portal_keys WHERE id = 1", [], |row| {
                row.get(0)
            })?;

        Ok(count > 0)
    }
}

impl CredentialStore for SqliteStore {
    type Error = StorageError;

    fn find_account(&self, email: &str) -> Result<Option<AdminAccount>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let row = conn
            .query_row(
                "SELECT email, password_hash, role, created_at FROM admins WHERE email = ?1",
                params![email],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((email, password_hash, role_str, created_at)) => {
                let role = Role::parse(&role_str).ok_or_else(|| {
                    StorageError::Serialization(format!("Unknown role '{role_str}' in store"))
                })?;
                Ok(Some(AdminAccount {
                    email,
                    password_hash,
                    role,
                    created_at: Self::parse_timestamp(&created_at),
                }))
            }
            None => Ok(None),
        }
    }

    fn upsert_account(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<(), Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            r"
            INSERT INTO admins (email, password_hash, role, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(email) DO UPDATE SET
                password_hash = excluded.password_hash,
                role = excluded.role
            ",
            params![email, password_hash, role.as_str(), now],
        )?;

        tracing::info!(role = %role, "Provisioned admin account");
        Ok(())
    }
}
