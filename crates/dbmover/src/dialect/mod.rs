//! SQL dialect strategy table keyed by database type.
//!
//! All vendor-specific SQL fragments live here: identifier quoting, identity
//! read-back, identity-insert mode, truncate, identity reseed, bulk load, and
//! the null-low ordering used for self-referencing tables. The engines never
//! branch on [`DatabaseType`] directly.

use serde::{Deserialize, Serialize};

/// Database vendor tag reported by schema introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseType {
    SqlServer,
    MySql,
    Sqlite,
    PostgreSql,
    Oracle,
    Other,
}

impl DatabaseType {
    /// Parse a database type from a loosely formatted tag string.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "sqlserver" | "mssql" | "sql_server" => DatabaseType::SqlServer,
            "mysql" | "mariadb" => DatabaseType::MySql,
            "sqlite" | "sqlite3" => DatabaseType::Sqlite,
            "postgres" | "postgresql" | "pg" => DatabaseType::PostgreSql,
            "oracle" => DatabaseType::Oracle,
            _ => DatabaseType::Other,
        }
    }
}

/// How a destination accepts explicit values for an auto-increment column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplicitIdentityMode {
    /// Explicit values are always accepted (MySQL, SQLite, PostgreSQL).
    Unrestricted,
    /// A session mode must be enabled first (SQL Server IDENTITY_INSERT).
    RequiresMode,
    /// Explicit values cannot be written; the counter must be advanced
    /// manually with placeholder rows.
    Unsupported,
}

/// SQL syntax strategy for one database vendor.
#[derive(Debug, Clone, Copy)]
pub struct Dialect {
    db: DatabaseType,
}

impl Dialect {
    pub fn new(db: DatabaseType) -> Self {
        Self { db }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.db
    }

    /// Quote an identifier (table or column name).
    pub fn quote_ident(&self, name: &str) -> String {
        match self.db {
            DatabaseType::SqlServer => format!("[{}]", name.replace(']', "]]")),
            DatabaseType::MySql => format!("`{}`", name.replace('`', "``")),
            _ => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Quote a string literal.
    pub fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Boolean literal for INSERT/UPDATE statements.
    pub fn bool_literal(&self, value: bool) -> &'static str {
        match self.db {
            DatabaseType::PostgreSql => {
                if value {
                    "TRUE"
                } else {
                    "FALSE"
                }
            }
            _ => {
                if value {
                    "1"
                } else {
                    "0"
                }
            }
        }
    }

    /// Query returning the identity value assigned by the most recent insert,
    /// or `None` when the vendor offers no read-back (translation then
    /// records source values pass-through).
    pub fn identity_query(&self, table: &str, field: &str) -> Option<String> {
        match self.db {
            // SCOPE_IDENTITY over @@IDENTITY: a destination trigger inserting
            // into another identity table must not shadow this insert's value.
            DatabaseType::SqlServer => Some("SELECT SCOPE_IDENTITY()".to_string()),
            DatabaseType::MySql => Some("SELECT LAST_INSERT_ID()".to_string()),
            DatabaseType::Sqlite => Some("SELECT last_insert_rowid()".to_string()),
            DatabaseType::PostgreSql => Some(format!(
                "SELECT currval(pg_get_serial_sequence('{}', '{}'))",
                table.replace('\'', "''"),
                field.replace('\'', "''")
            )),
            DatabaseType::Oracle | DatabaseType::Other => None,
        }
    }

    /// How explicit identity values can be written on this vendor.
    pub fn explicit_identity_mode(&self) -> ExplicitIdentityMode {
        match self.db {
            DatabaseType::SqlServer => ExplicitIdentityMode::RequiresMode,
            DatabaseType::MySql
            | DatabaseType::Sqlite
            | DatabaseType::PostgreSql
            | DatabaseType::Other => ExplicitIdentityMode::Unrestricted,
            DatabaseType::Oracle => ExplicitIdentityMode::Unsupported,
        }
    }

    /// Statement enabling explicit identity insertion for a table, when the
    /// vendor requires a mode switch.
    pub fn identity_insert_on(&self, table: &str) -> Option<String> {
        match self.db {
            DatabaseType::SqlServer => {
                Some(format!("SET IDENTITY_INSERT {} ON", self.quote_ident(table)))
            }
            _ => None,
        }
    }

    /// Statement disabling explicit identity insertion.
    pub fn identity_insert_off(&self, table: &str) -> Option<String> {
        match self.db {
            DatabaseType::SqlServer => {
                Some(format!("SET IDENTITY_INSERT {} OFF", self.quote_ident(table)))
            }
            _ => None,
        }
    }

    /// Whether the vendor has a set-based TRUNCATE.
    pub fn supports_truncate(&self) -> bool {
        !matches!(self.db, DatabaseType::Sqlite | DatabaseType::Other)
    }

    /// TRUNCATE statement for a table.
    pub fn truncate_statement(&self, table: &str) -> Option<String> {
        if !self.supports_truncate() {
            return None;
        }
        Some(format!("TRUNCATE TABLE {}", self.quote_ident(table)))
    }

    /// Statement resetting the identity counter of a cleared table.
    pub fn reseed_statement(&self, table: &str, field: &str) -> Option<String> {
        match self.db {
            DatabaseType::SqlServer => Some(format!(
                "DBCC CHECKIDENT ('{}', RESEED, 0)",
                table.replace('\'', "''")
            )),
            DatabaseType::MySql => Some(format!(
                "ALTER TABLE {} AUTO_INCREMENT = 1",
                self.quote_ident(table)
            )),
            DatabaseType::Sqlite => Some(format!(
                "DELETE FROM sqlite_sequence WHERE name = '{}'",
                table.replace('\'', "''")
            )),
            DatabaseType::PostgreSql => Some(format!(
                "SELECT setval(pg_get_serial_sequence('{}', '{}'), 1, false)",
                table.replace('\'', "''"),
                field.replace('\'', "''")
            )),
            DatabaseType::Oracle | DatabaseType::Other => None,
        }
    }

    /// Whether the vendor has a set-based bulk load from a staged file.
    pub fn supports_bulk_insert(&self) -> bool {
        matches!(self.db, DatabaseType::SqlServer | DatabaseType::MySql)
    }

    /// Bulk-load statement reading a delimited staging file.
    pub fn bulk_insert_statement(
        &self,
        table: &str,
        path: &str,
        field_terminator: &str,
        row_terminator: &str,
        encoding: Option<&str>,
    ) -> Option<String> {
        match self.db {
            DatabaseType::SqlServer => {
                let mut with = format!(
                    "FIELDTERMINATOR = '{}', ROWTERMINATOR = '{}'",
                    escape_terminator(field_terminator),
                    escape_terminator(row_terminator)
                );
                if let Some(enc) = encoding {
                    with.push_str(&format!(", CODEPAGE = '{}'", enc.replace('\'', "''")));
                }
                Some(format!(
                    "BULK INSERT {} FROM '{}' WITH ({})",
                    self.quote_ident(table),
                    path.replace('\'', "''"),
                    with
                ))
            }
            DatabaseType::MySql => {
                let mut sql = format!(
                    "LOAD DATA LOCAL INFILE '{}' INTO TABLE {}",
                    path.replace('\'', "''"),
                    self.quote_ident(table)
                );
                if let Some(enc) = encoding {
                    sql.push_str(&format!(" CHARACTER SET {}", enc));
                }
                sql.push_str(&format!(
                    " FIELDS TERMINATED BY '{}' LINES TERMINATED BY '{}'",
                    escape_terminator(field_terminator),
                    escape_terminator(row_terminator)
                ));
                Some(sql)
            }
            _ => None,
        }
    }

    /// ORDER BY expression for the referencing column of a self-referencing
    /// table. Rows must come out with referenced parents first, so NULL (no
    /// parent) has to sort lowest; vendors where NULL sorts high get a
    /// coalesce-style wrapper.
    pub fn self_reference_order_expr(&self, column: &str) -> String {
        let quoted = self.quote_ident(column);
        match self.db {
            DatabaseType::PostgreSql | DatabaseType::Oracle => {
                format!("COALESCE({}, 0)", quoted)
            }
            _ => quoted,
        }
    }
}

/// Render control characters in a terminator the way loader syntax expects.
fn escape_terminator(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tag() {
        assert_eq!(DatabaseType::from_tag("mssql"), DatabaseType::SqlServer);
        assert_eq!(DatabaseType::from_tag("PostgreSQL"), DatabaseType::PostgreSql);
        assert_eq!(DatabaseType::from_tag("sqlite3"), DatabaseType::Sqlite);
        assert_eq!(DatabaseType::from_tag("weird-db"), DatabaseType::Other);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(Dialect::new(DatabaseType::SqlServer).quote_ident("Orders"), "[Orders]");
        assert_eq!(Dialect::new(DatabaseType::MySql).quote_ident("Orders"), "`Orders`");
        assert_eq!(Dialect::new(DatabaseType::PostgreSql).quote_ident("Orders"), "\"Orders\"");
        assert_eq!(
            Dialect::new(DatabaseType::PostgreSql).quote_ident("od\"d"),
            "\"od\"\"d\""
        );
    }

    #[test]
    fn test_identity_query() {
        assert_eq!(
            Dialect::new(DatabaseType::SqlServer).identity_query("t", "id").unwrap(),
            "SELECT SCOPE_IDENTITY()"
        );
        assert_eq!(
            Dialect::new(DatabaseType::Sqlite).identity_query("t", "id").unwrap(),
            "SELECT last_insert_rowid()"
        );
        assert!(Dialect::new(DatabaseType::PostgreSql)
            .identity_query("t", "id")
            .unwrap()
            .contains("pg_get_serial_sequence"));
        assert!(Dialect::new(DatabaseType::Other).identity_query("t", "id").is_none());
    }

    #[test]
    fn test_identity_insert_mode() {
        assert_eq!(
            Dialect::new(DatabaseType::SqlServer).explicit_identity_mode(),
            ExplicitIdentityMode::RequiresMode
        );
        assert_eq!(
            Dialect::new(DatabaseType::Sqlite).explicit_identity_mode(),
            ExplicitIdentityMode::Unrestricted
        );
        assert_eq!(
            Dialect::new(DatabaseType::Oracle).explicit_identity_mode(),
            ExplicitIdentityMode::Unsupported
        );
        assert_eq!(
            Dialect::new(DatabaseType::SqlServer).identity_insert_on("t").unwrap(),
            "SET IDENTITY_INSERT [t] ON"
        );
    }

    #[test]
    fn test_truncate_and_reseed() {
        let mssql = Dialect::new(DatabaseType::SqlServer);
        assert_eq!(mssql.truncate_statement("t").unwrap(), "TRUNCATE TABLE [t]");
        assert_eq!(
            mssql.reseed_statement("t", "id").unwrap(),
            "DBCC CHECKIDENT ('t', RESEED, 0)"
        );

        let sqlite = Dialect::new(DatabaseType::Sqlite);
        assert!(!sqlite.supports_truncate());
        assert!(sqlite.truncate_statement("t").is_none());
        assert_eq!(
            sqlite.reseed_statement("t", "id").unwrap(),
            "DELETE FROM sqlite_sequence WHERE name = 't'"
        );

        let mysql = Dialect::new(DatabaseType::MySql);
        assert_eq!(
            mysql.reseed_statement("t", "id").unwrap(),
            "ALTER TABLE `t` AUTO_INCREMENT = 1"
        );
    }

    #[test]
    fn test_bulk_insert_statement() {
        let mssql = Dialect::new(DatabaseType::SqlServer);
        let sql = mssql
            .bulk_insert_statement("Orders", "/tmp/orders.dat", "\t", "\n", Some("65001"))
            .unwrap();
        assert!(sql.starts_with("BULK INSERT [Orders] FROM '/tmp/orders.dat'"));
        assert!(sql.contains("FIELDTERMINATOR = '\\t'"));
        assert!(sql.contains("ROWTERMINATOR = '\\n'"));
        assert!(sql.contains("CODEPAGE = '65001'"));

        let mysql = Dialect::new(DatabaseType::MySql);
        let sql = mysql
            .bulk_insert_statement("Orders", "/tmp/orders.dat", "\t", "\n", None)
            .unwrap();
        assert!(sql.contains("LOAD DATA LOCAL INFILE"));
        assert!(sql.contains("FIELDS TERMINATED BY '\\t'"));

        assert!(Dialect::new(DatabaseType::PostgreSql)
            .bulk_insert_statement("t", "p", "\t", "\n", None)
            .is_none());
    }

    #[test]
    fn test_self_reference_order_expr() {
        // SQL Server and SQLite already sort NULL lowest in ascending order
        assert_eq!(
            Dialect::new(DatabaseType::SqlServer).self_reference_order_expr("ParentId"),
            "[ParentId]"
        );
        // PostgreSQL and Oracle sort NULL high, so wrap with a coalesce
        assert_eq!(
            Dialect::new(DatabaseType::PostgreSql).self_reference_order_expr("ParentId"),
            "COALESCE(\"ParentId\", 0)"
        );
    }
}
