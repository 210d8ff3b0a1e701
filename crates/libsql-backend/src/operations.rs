//! Backend-specific SQL helpers.

use libsql_backend_core::Params;

/// SQL helpers for the libSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseOperations;

impl DatabaseOperations {
    /// Render the last executed statement for logs and debug output.
    ///
    /// Never issues a query of its own: a helper round trip on a remote
    /// stream can fail after the statement itself succeeded.
    pub fn last_executed_query(&self, sql: &str, params: &Params) -> String {
        if params.is_empty() {
            sql.to_string()
        } else {
            format!("{} -- params: {}", sql, params)
        }
    }

    /// Quote an identifier, doubling embedded quotes.
    pub fn quote_name(&self, name: &str) -> String {
        if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
            return name.to_string();
        }
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_executed_query_without_params() {
        let ops = DatabaseOperations;
        assert_eq!(ops.last_executed_query("SELECT 1", &Params::None), "SELECT 1");
        assert_eq!(
            ops.last_executed_query("SELECT 1", &Params::positional(Vec::<i64>::new())),
            "SELECT 1"
        );
    }

    #[test]
    fn last_executed_query_appends_params() {
        let ops = DatabaseOperations;
        let rendered = ops.last_executed_query(
            "SELECT * FROM t WHERE a = %s AND b = %s",
            &Params::positional([1_i64.into(), libsql_backend_core::Value::from("r1")]),
        );
        assert_eq!(rendered, "SELECT * FROM t WHERE a = %s AND b = %s -- params: [1, 'r1']");
    }

    #[test]
    fn quote_name_escapes() {
        let ops = DatabaseOperations;
        assert_eq!(ops.quote_name("items"), "\"items\"");
        assert_eq!(ops.quote_name("\"items\""), "\"items\"");
        assert_eq!(ops.quote_name("we\"ird"), "\"we\"\"ird\"");
    }
}
