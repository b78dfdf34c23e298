//! The slice of the platform's relational schema the fallback path touches.
//!
//! The platform owns and migrates its own schema; this crate never alters a
//! live database's structure. The DDL below mirrors the SQLite layout of the
//! `user`, `project`, `project_relation` and `settings` tables so scratch
//! databases (tests, local dry runs) behave like the real store. Every
//! statement is `IF NOT EXISTS`, so applying it to a real store is a no-op.

/// Role marker of the single administrative identity.
pub const OWNER_ROLE: &str = "global:owner";

/// Project-relation role linking a user to their personal project.
pub const PERSONAL_OWNER_ROLE: &str = "project:personalOwner";

/// Project type of a user's personal project.
pub const PERSONAL_PROJECT_TYPE: &str = "personal";

/// Settings key behind the control plane's "owner configured" flag.
pub const OWNER_SETUP_SETTING: &str = "userManagement.isInstanceOwnerSetUp";

pub(crate) const PLATFORM_SUBSET: &str = r#"
CREATE TABLE IF NOT EXISTS "user" (
    "id"                     VARCHAR PRIMARY KEY NOT NULL,
    "email"                  VARCHAR(255) UNIQUE,
    "firstName"              VARCHAR(32),
    "lastName"               VARCHAR(32),
    "password"               VARCHAR,
    "personalizationAnswers" TEXT,
    "settings"               TEXT,
    "role"                   TEXT NOT NULL,
    "disabled"               BOOLEAN NOT NULL DEFAULT FALSE,
    "mfaEnabled"             BOOLEAN NOT NULL DEFAULT FALSE,
    "createdAt"              DATETIME NOT NULL DEFAULT (STRFTIME('%Y-%m-%d %H:%M:%f', 'NOW')),
    "updatedAt"              DATETIME NOT NULL DEFAULT (STRFTIME('%Y-%m-%d %H:%M:%f', 'NOW'))
);

CREATE TABLE IF NOT EXISTS "project" (
    "id"        VARCHAR(36) PRIMARY KEY NOT NULL,
    "name"      VARCHAR(255) NOT NULL,
    "type"      VARCHAR(36) NOT NULL,
    "createdAt" DATETIME NOT NULL DEFAULT (STRFTIME('%Y-%m-%d %H:%M:%f', 'NOW')),
    "updatedAt" DATETIME NOT NULL DEFAULT (STRFTIME('%Y-%m-%d %H:%M:%f', 'NOW'))
);

CREATE TABLE IF NOT EXISTS "project_relation" (
    "projectId" VARCHAR(36) NOT NULL REFERENCES "project"("id") ON DELETE CASCADE,
    "userId"    VARCHAR NOT NULL REFERENCES "user"("id") ON DELETE CASCADE,
    "role"      VARCHAR NOT NULL,
    "createdAt" DATETIME NOT NULL DEFAULT (STRFTIME('%Y-%m-%d %H:%M:%f', 'NOW')),
    "updatedAt" DATETIME NOT NULL DEFAULT (STRFTIME('%Y-%m-%d %H:%M:%f', 'NOW')),
    PRIMARY KEY ("projectId", "userId")
);

CREATE INDEX IF NOT EXISTS "project_relation_user" ON "project_relation" ("userId");

CREATE TABLE IF NOT EXISTS "settings" (
    "key"           TEXT PRIMARY KEY NOT NULL,
    "value"         TEXT NOT NULL DEFAULT '',
    "loadOnStartup" BOOLEAN NOT NULL DEFAULT FALSE
);
"#;
