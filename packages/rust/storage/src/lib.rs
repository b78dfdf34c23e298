//! Privileged libSQL channel to the platform's backing store.
//!
//! The [`Storage`] struct wraps a connection to the automation platform's own
//! database. It is only used when the control plane cannot answer or cannot
//! complete an operation: counting administrative identities for state
//! detection, and inserting the owner identity directly.
//!
//! **Invariants this layer enforces itself** (the platform's validation is
//! bypassed here):
//! - at most one configured row with the owner role
//! - the password column holds a bcrypt hash in the platform's format
//! - every owner has a personal project and a personal-owner relation row
//! - the settings flag behind "owner configured" is set

pub mod hashing;
mod schema;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use datalive_shared::{BootstrapError, OwnerIdentity, Result, StorageConfig};

pub use hashing::{hash_password, verify_password};
pub use schema::{OWNER_ROLE, OWNER_SETUP_SETTING, PERSONAL_OWNER_ROLE, PERSONAL_PROJECT_TYPE};

/// Datetime format of the platform's SQLite columns.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A row of the `user` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
    pub role: String,
}

/// Post-condition report for an owner identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerCheck {
    pub user_id: String,
    pub is_owner: bool,
    pub has_password: bool,
    /// Personal project linked through a personal-owner relation.
    pub personal_project: Option<String>,
}

impl OwnerCheck {
    /// Whether every invariant of a usable identity holds.
    pub fn is_complete(&self) -> bool {
        self.is_owner && self.has_password && self.personal_project.is_some()
    }
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open the platform's existing database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BootstrapError::Storage(format!(
                "database file not found: {}",
                path.display()
            )));
        }
        Self::open_local(path).await
    }

    /// Create (or open) a scratch database at `path` with the platform schema subset.
    pub async fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BootstrapError::io(parent, e))?;
        }
        let storage = Self::open_local(path).await?;
        storage.ensure_schema().await?;
        Ok(storage)
    }

    /// Connect to a remote libSQL endpoint.
    pub async fn open_remote(url: &str, auth_token: &str) -> Result<Self> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| BootstrapError::Storage(e.to_string()))?;
        Self::connect(db)
    }

    /// Open whatever `[storage]` points at, or `None` when nothing is configured.
    pub async fn from_config(config: &StorageConfig) -> Result<Option<Self>> {
        if let Some(url) = &config.url {
            let token = config.auth_token.as_deref().unwrap_or_default();
            return Ok(Some(Self::open_remote(url, token).await?));
        }
        match &config.path {
            Some(path) => Ok(Some(Self::open(Path::new(path)).await?)),
            None => Ok(None),
        }
    }

    async fn open_local(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| BootstrapError::Storage(e.to_string()))?;
        Self::connect(db)
    }

    fn connect(db: Database) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| BootstrapError::Storage(e.to_string()))?;
        Ok(Self { db, conn })
    }

    /// Apply the platform schema subset (no-op on a real platform database).
    pub async fn ensure_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(schema::PLATFORM_SUBSET)
            .await
            .map_err(|e| BootstrapError::Storage(format!("schema setup failed: {e}")))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Identity queries
    // -----------------------------------------------------------------------

    /// Count owner rows that carry an email and a password.
    ///
    /// The platform keeps a "shell" owner row with a null email until setup
    /// completes; that row is not a configured identity.
    pub async fn count_configured_owners(&self) -> Result<i64> {
        count_configured_owners(&self.conn).await
    }

    /// Look up a user by email.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        let mut rows = self
            .conn
            .query(
                r#"SELECT "id", "email", "firstName", "lastName", "password", "role"
                   FROM "user" WHERE "email" = ?1"#,
                params![email],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// Read the settings flag behind the control plane's "owner configured" answer.
    pub async fn owner_setup_flag(&self) -> Result<Option<bool>> {
        let mut rows = self
            .conn
            .query(
                r#"SELECT "value" FROM "settings" WHERE "key" = ?1"#,
                params![OWNER_SETUP_SETTING],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                let value: String = row.get(0).map_err(storage_err)?;
                Ok(Some(value == "true"))
            }
            None => Ok(None),
        }
    }

    /// Overwrite the settings flag behind "owner configured".
    pub async fn set_owner_setup_flag(&self, configured: bool) -> Result<()> {
        upsert_owner_flag(&self.conn, configured).await
    }

    // -----------------------------------------------------------------------
    // Owner insertion
    // -----------------------------------------------------------------------

    /// Insert the owner identity with every linkage row the platform requires.
    ///
    /// Runs in one transaction: promotes the shell owner row if the platform
    /// created one, otherwise inserts a new owner row; ensures a personal
    /// project and relation; sets the owner-configured flag. Refuses to run
    /// when a configured owner already exists. Returns the user id.
    #[instrument(skip_all, fields(email = %owner.email))]
    pub async fn insert_owner(&self, owner: &OwnerIdentity) -> Result<String> {
        let password_hash = hash_password(&owner.password)?;
        let now = Utc::now().format(DATETIME_FORMAT).to_string();

        let tx = self.conn.transaction().await.map_err(storage_err)?;

        if count_configured_owners(&tx).await? > 0 {
            return Err(BootstrapError::Storage(
                "an owner identity already exists; refusing to create a second".into(),
            ));
        }

        let mut existing = tx
            .query(
                r#"SELECT "role" FROM "user" WHERE "email" = ?1"#,
                params![owner.email.as_str()],
            )
            .await
            .map_err(storage_err)?;
        if let Some(row) = existing.next().await.map_err(storage_err)? {
            let role: String = row.get(0).map_err(storage_err)?;
            return Err(BootstrapError::Storage(format!(
                "email {} already belongs to a user with role {role}",
                owner.email
            )));
        }

        let user_id = match shell_owner_id(&tx).await? {
            Some(id) => {
                debug!(%id, "promoting shell owner row");
                tx.execute(
                    r#"UPDATE "user"
                       SET "email" = ?1, "firstName" = ?2, "lastName" = ?3,
                           "password" = ?4, "updatedAt" = ?5
                       WHERE "id" = ?6"#,
                    params![
                        owner.email.as_str(),
                        owner.first_name.as_str(),
                        owner.last_name.as_str(),
                        password_hash.as_str(),
                        now.as_str(),
                        id.as_str()
                    ],
                )
                .await
                .map_err(storage_err)?;
                id
            }
            None => {
                let id = Uuid::now_v7().to_string();
                tx.execute(
                    r#"INSERT INTO "user"
                       ("id", "email", "firstName", "lastName", "password", "role",
                        "disabled", "mfaEnabled", "createdAt", "updatedAt")
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7, ?7)"#,
                    params![
                        id.as_str(),
                        owner.email.as_str(),
                        owner.first_name.as_str(),
                        owner.last_name.as_str(),
                        password_hash.as_str(),
                        OWNER_ROLE,
                        now.as_str()
                    ],
                )
                .await
                .map_err(storage_err)?;
                id
            }
        };

        let project_name = format!(
            "{} {} <{}>",
            owner.first_name, owner.last_name, owner.email
        );
        match personal_project_id(&tx, &user_id).await? {
            Some(project_id) => {
                tx.execute(
                    r#"UPDATE "project" SET "name" = ?1, "updatedAt" = ?2 WHERE "id" = ?3"#,
                    params![project_name.as_str(), now.as_str(), project_id.as_str()],
                )
                .await
                .map_err(storage_err)?;
            }
            None => {
                let project_id = Uuid::now_v7().to_string();
                tx.execute(
                    r#"INSERT INTO "project" ("id", "name", "type", "createdAt", "updatedAt")
                       VALUES (?1, ?2, ?3, ?4, ?4)"#,
                    params![
                        project_id.as_str(),
                        project_name.as_str(),
                        PERSONAL_PROJECT_TYPE,
                        now.as_str()
                    ],
                )
                .await
                .map_err(storage_err)?;
                tx.execute(
                    r#"INSERT INTO "project_relation"
                       ("projectId", "userId", "role", "createdAt", "updatedAt")
                       VALUES (?1, ?2, ?3, ?4, ?4)"#,
                    params![
                        project_id.as_str(),
                        user_id.as_str(),
                        PERSONAL_OWNER_ROLE,
                        now.as_str()
                    ],
                )
                .await
                .map_err(storage_err)?;
            }
        }

        upsert_owner_flag(&tx, true).await?;
        tx.commit().await.map_err(storage_err)?;

        info!(%user_id, "owner identity written to backing store");
        Ok(user_id)
    }

    /// Check the post-condition of an owner identity identified by email.
    pub async fn verify_owner(&self, email: &str) -> Result<Option<OwnerCheck>> {
        let Some(user) = self.find_user_by_email(email).await? else {
            return Ok(None);
        };
        let personal_project = personal_project_id(&self.conn, &user.id).await?;
        Ok(Some(OwnerCheck {
            is_owner: user.role == OWNER_ROLE,
            has_password: user.password_hash.as_deref().is_some_and(|h| !h.is_empty()),
            user_id: user.id,
            personal_project,
        }))
    }
}

// ---------------------------------------------------------------------------
// Helpers (shared by plain connections and transactions)
// ---------------------------------------------------------------------------

fn storage_err(e: libsql::Error) -> BootstrapError {
    BootstrapError::Storage(e.to_string())
}

async fn count_configured_owners(conn: &Connection) -> Result<i64> {
    let mut rows = conn
        .query(
            r#"SELECT COUNT(*) FROM "user"
               WHERE "role" = ?1 AND "email" IS NOT NULL AND "password" IS NOT NULL"#,
            params![OWNER_ROLE],
        )
        .await
        .map_err(storage_err)?;

    match rows.next().await.map_err(storage_err)? {
        Some(row) => row.get::<i64>(0).map_err(storage_err),
        None => Ok(0),
    }
}

async fn shell_owner_id(conn: &Connection) -> Result<Option<String>> {
    let mut rows = conn
        .query(
            r#"SELECT "id" FROM "user" WHERE "role" = ?1 AND "email" IS NULL LIMIT 1"#,
            params![OWNER_ROLE],
        )
        .await
        .map_err(storage_err)?;

    match rows.next().await.map_err(storage_err)? {
        Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
        None => Ok(None),
    }
}

async fn personal_project_id(conn: &Connection, user_id: &str) -> Result<Option<String>> {
    let mut rows = conn
        .query(
            r#"SELECT pr."projectId" FROM "project_relation" pr
               JOIN "project" p ON p."id" = pr."projectId"
               WHERE pr."userId" = ?1 AND pr."role" = ?2 AND p."type" = ?3
               LIMIT 1"#,
            params![user_id, PERSONAL_OWNER_ROLE, PERSONAL_PROJECT_TYPE],
        )
        .await
        .map_err(storage_err)?;

    match rows.next().await.map_err(storage_err)? {
        Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
        None => Ok(None),
    }
}

async fn upsert_owner_flag(conn: &Connection, configured: bool) -> Result<()> {
    let value = if configured { "true" } else { "false" };
    conn.execute(
        r#"INSERT INTO "settings" ("key", "value", "loadOnStartup") VALUES (?1, ?2, 1)
           ON CONFLICT("key") DO UPDATE SET "value" = excluded."value""#,
        params![OWNER_SETUP_SETTING, value],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

fn row_to_user(row: &libsql::Row) -> Result<UserRow> {
    Ok(UserRow {
        id: row.get::<String>(0).map_err(storage_err)?,
        email: row.get::<Option<String>>(1).map_err(storage_err)?,
        first_name: row.get::<Option<String>>(2).map_err(storage_err)?,
        last_name: row.get::<Option<String>>(3).map_err(storage_err)?,
        password_hash: row.get::<Option<String>>(4).map_err(storage_err)?,
        role: row.get::<String>(5).map_err(storage_err)?,
    })
}
