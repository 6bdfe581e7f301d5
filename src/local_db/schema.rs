//! Local schema versioning
//!
//! `schema.sql` always describes the latest layout. Each entry in [`MIGRATIONS`]
//! is recorded in `schema_migrations` once applied.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Known migration versions, oldest first
pub const MIGRATIONS: &[i32] = &[1];

/// Check if a database at `current_version` needs migrating
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Versions newer than `current_version`, in application order
pub fn get_pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATIONS
        .iter()
        .copied()
        .filter(|version| *version > current_version)
        .collect()
}
