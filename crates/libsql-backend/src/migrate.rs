//! Schema migrations applied through the schema change executor.

use crate::connection::LibsqlConnection;
use libsql_backend_core::{Params, Result, Value};
use std::collections::HashMap;

/// Default name of the tracking table.
pub const DEFAULT_MIGRATIONS_TABLE: &str = "_libsql_migrations";

/// A database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique migration ID (typically timestamp-based)
    pub id: String,
    pub description: String,
    /// Statements that apply the migration, in order
    pub up: Vec<String>,
    /// Statements that revert the migration, in order
    pub down: Vec<String>,
}

impl Migration {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    /// Append an apply statement.
    pub fn up(mut self, sql: impl Into<String>) -> Self {
        self.up.push(sql.into());
        self
    }

    /// Append a revert statement.
    pub fn down(mut self, sql: impl Into<String>) -> Self {
        self.down.push(sql.into());
        self
    }
}

/// Status of a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatus {
    Pending,
    /// Applied at the given unix timestamp (seconds)
    Applied { at: i64 },
}

/// Applies and reverts [`Migration`]s, recording them in a tracking table.
///
/// Every migration runs in its own schema scope. A failing statement stops
/// the run: statements of that migration that already ran stay applied and
/// the migration is not recorded.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    migrations: Vec<Migration>,
    table_name: String,
}

impl MigrationRunner {
    pub fn new(migrations: Vec<Migration>) -> Self {
        Self {
            migrations,
            table_name: DEFAULT_MIGRATIONS_TABLE.to_string(),
        }
    }

    /// Set a custom tracking table name.
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Ensure the tracking table exists.
    pub fn init(&self, conn: &mut LibsqlConnection) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )",
            conn.ops().quote_name(&self.table_name)
        );
        conn.edit_schema(|editor| editor.execute(&sql))
    }

    /// Status of every known migration, in declaration order.
    pub fn status(&self, conn: &mut LibsqlConnection) -> Result<Vec<(String, MigrationStatus)>> {
        self.init(conn)?;

        let sql = format!(
            "SELECT id, applied_at FROM {}",
            conn.ops().quote_name(&self.table_name)
        );
        let mut cur = conn.cursor()?;
        cur.execute(&sql, &Params::None)?;
        let rows = cur.fetchall()?;
        cur.close()?;

        let mut applied: HashMap<String, i64> = HashMap::new();
        for row in rows {
            let id: String = row.get_named("id")?;
            let at: i64 = row.get_named("applied_at")?;
            applied.insert(id, at);
        }

        Ok(self
            .migrations
            .iter()
            .map(|m| {
                let status = match applied.get(&m.id) {
                    Some(&at) => MigrationStatus::Applied { at },
                    None => MigrationStatus::Pending,
                };
                (m.id.clone(), status)
            })
            .collect())
    }

    /// Apply all pending migrations in order. Returns the applied IDs.
    pub fn migrate(&self, conn: &mut LibsqlConnection) -> Result<Vec<String>> {
        let status = self.status(conn)?;
        let record_sql = format!(
            "INSERT INTO {} (id, description, applied_at) VALUES (%s, %s, %s)",
            conn.ops().quote_name(&self.table_name)
        );

        let mut applied = Vec::new();
        for (migration, (_, state)) in self.migrations.iter().zip(status) {
            if state != MigrationStatus::Pending {
                continue;
            }
            tracing::info!(id = %migration.id, description = %migration.description, "applying migration");

            conn.edit_schema(|editor| {
                for sql in &migration.up {
                    editor.execute(sql)?;
                }
                editor.execute_with(
                    &record_sql,
                    &Params::positional([
                        Value::Text(migration.id.clone()),
                        Value::Text(migration.description.clone()),
                        Value::BigInt(unix_now()),
                    ]),
                )
            })?;

            applied.push(migration.id.clone());
        }
        Ok(applied)
    }

    /// Revert the most recently applied migration. Returns its ID.
    pub fn rollback(&self, conn: &mut LibsqlConnection) -> Result<Option<String>> {
        let status = self.status(conn)?;

        let last = self
            .migrations
            .iter()
            .zip(status)
            .enumerate()
            .filter_map(|(index, (migration, (_, state)))| match state {
                MigrationStatus::Applied { at } => Some(((at, index), migration)),
                MigrationStatus::Pending => None,
            })
            .max_by_key(|(key, _)| *key)
            .map(|(_, migration)| migration);

        let Some(migration) = last else {
            return Ok(None);
        };
        tracing::info!(id = %migration.id, "reverting migration");

        let delete_sql = format!(
            "DELETE FROM {} WHERE id = %s",
            conn.ops().quote_name(&self.table_name)
        );
        conn.edit_schema(|editor| {
            for sql in &migration.down {
                editor.execute(sql)?;
            }
            editor.execute_with(&delete_sql, &Params::positional([migration.id.as_str()]))
        })?;

        Ok(Some(migration.id.clone()))
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_statements() {
        let m = Migration::new("0001", "create items")
            .up("CREATE TABLE items (id INTEGER PRIMARY KEY)")
            .up("CREATE INDEX items_id ON items (id)")
            .down("DROP TABLE items");
        assert_eq!(m.up.len(), 2);
        assert_eq!(m.down, vec!["DROP TABLE items".to_string()]);
    }

    #[test]
    fn default_table_name() {
        let runner = MigrationRunner::new(vec![]);
        assert_eq!(runner.table_name, "_libsql_migrations");
        let runner = runner.table_name("schema_history");
        assert_eq!(runner.table_name, "schema_history");
    }
}
