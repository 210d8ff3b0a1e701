//! Capability flags consulted by the query builder.

use crate::config::DatabaseSettings;
use libsql_backend_core::EngineVersion;

/// First engine release with `RETURNING` support.
pub const RETURNING_MIN_VERSION: EngineVersion = EngineVersion::new(3, 35, 0);

/// Capability matrix for one connection.
///
/// Static flags never change. The `RETURNING` flags are computed on every
/// call from the current settings: an embedded replica writes to the
/// primary but reads from its local file, so a `RETURNING` read-back can
/// miss the row it just wrote.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseFeatures<'a> {
    settings: &'a DatabaseSettings,
    engine_version: EngineVersion,
}

impl<'a> DatabaseFeatures<'a> {
    pub fn new(settings: &'a DatabaseSettings, engine_version: EngineVersion) -> Self {
        Self {
            settings,
            engine_version,
        }
    }

    pub fn engine_version(&self) -> EngineVersion {
        self.engine_version
    }

    pub fn supports_savepoints(&self) -> bool {
        false
    }

    pub fn uses_savepoints(&self) -> bool {
        false
    }

    pub fn autocommits_when_autocommit_is_off(&self) -> bool {
        false
    }

    pub fn connection_persists_old_columns(&self) -> bool {
        false
    }

    pub fn can_rollback_ddl(&self) -> bool {
        true
    }

    pub fn uses_autocommit(&self) -> bool {
        true
    }

    pub fn supports_transactions(&self) -> bool {
        true
    }

    pub fn supports_atomic_references_rename(&self) -> bool {
        true
    }

    /// Can an `INSERT` return generated columns with `RETURNING`?
    pub fn can_return_columns_from_insert(&self) -> bool {
        if self.settings.has_sync_url() {
            return false;
        }
        self.engine_version >= RETURNING_MIN_VERSION
    }

    pub fn can_return_rows_from_bulk_insert(&self) -> bool {
        self.can_return_columns_from_insert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODERN: EngineVersion = EngineVersion::new(3, 45, 1);
    const OLD: EngineVersion = EngineVersion::new(3, 34, 1);

    #[test]
    fn static_flags() {
        let settings = DatabaseSettings::memory();
        let features = DatabaseFeatures::new(&settings, MODERN);
        assert!(!features.supports_savepoints());
        assert!(!features.uses_savepoints());
        assert!(!features.autocommits_when_autocommit_is_off());
        assert!(!features.connection_persists_old_columns());
        assert!(features.can_rollback_ddl());
        assert!(features.uses_autocommit());
        assert!(features.supports_transactions());
        assert!(features.supports_atomic_references_rename());
    }

    #[test]
    fn returning_follows_engine_version_without_sync_url() {
        let settings = DatabaseSettings::target("app.db");
        assert!(DatabaseFeatures::new(&settings, MODERN).can_return_columns_from_insert());
        assert!(DatabaseFeatures::new(&settings, RETURNING_MIN_VERSION).can_return_rows_from_bulk_insert());
        assert!(!DatabaseFeatures::new(&settings, OLD).can_return_columns_from_insert());
    }

    #[test]
    fn returning_disabled_with_sync_url() {
        let settings = DatabaseSettings::replica("replica.db", "libsql://db.turso.io");
        let features = DatabaseFeatures::new(&settings, MODERN);
        assert!(!features.can_return_columns_from_insert());
        assert!(!features.can_return_rows_from_bulk_insert());
    }

    #[test]
    fn empty_sync_url_does_not_disable_returning() {
        let settings = DatabaseSettings::target("app.db").sync_url("");
        assert!(DatabaseFeatures::new(&settings, MODERN).can_return_columns_from_insert());
    }

    #[test]
    fn flags_follow_settings_changes() {
        let mut settings = DatabaseSettings::target("app.db");
        assert!(DatabaseFeatures::new(&settings, MODERN).can_return_columns_from_insert());
        settings.sync_url = Some("libsql://db.turso.io".to_string());
        assert!(!DatabaseFeatures::new(&settings, MODERN).can_return_columns_from_insert());
    }
}
