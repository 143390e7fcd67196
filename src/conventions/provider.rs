//! Provider type convention and SQL dialect differences
//!
//! # Type mapping
//!
//! | Kind      | SQLite  | MySQL                        | SQL Server                       | PostgreSQL         |
//! |-----------|---------|------------------------------|----------------------------------|--------------------|
//! | text      | TEXT    | VARCHAR(n) / LONGTEXT        | NVARCHAR(n) / NVARCHAR(MAX)      | VARCHAR(n) / TEXT  |
//! | integer   | INTEGER | BIGINT                       | BIGINT                           | BIGINT             |
//! | float     | REAL    | DOUBLE / DECIMAL(p,s)        | FLOAT / DECIMAL(p,s)             | DOUBLE PRECISION / NUMERIC(p,s) |
//! | boolean   | INTEGER | TINYINT(1)                   | BIT                              | BOOLEAN            |
//! | uuid      | TEXT    | CHAR(36)                     | UNIQUEIDENTIFIER                 | UUID               |
//! | timestamp | TEXT    | DATETIME(6)                  | DATETIMEOFFSET                   | TIMESTAMPTZ        |
//!
//! SQLite and MySQL have no timezone-aware timestamp type: values are stored
//! normalized to UTC. On SQLite that is RFC 3339 text with exactly six
//! fractional digits, so stored values compare and sort correctly as text.

use crate::core::field::{FieldDef, FieldKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest `VARCHAR` MySQL accepts for utf8mb4 before switching to `LONGTEXT`
const MYSQL_MAX_VARCHAR: u32 = 16_383;

/// Longest `NVARCHAR(n)` SQL Server accepts before `NVARCHAR(MAX)`
const SQLSERVER_MAX_NVARCHAR: u32 = 4_000;

/// Relational engine the model is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Sqlite,
    #[serde(alias = "mariadb")]
    MySql,
    #[serde(alias = "mssql")]
    SqlServer,
    #[serde(alias = "postgresql")]
    Postgres,
}

/// Precision and scale of a decimal column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalSpec {
    pub precision: u8,
    pub scale: u8,
}

impl Provider {
    /// SQL column type for a declared field
    pub fn column_type(
        &self,
        field: &FieldDef,
        decimal: Option<DecimalSpec>,
        default_string_length: Option<u32>,
    ) -> String {
        match field.kind {
            FieldKind::Text => self.text_type(field.max_length.or(default_string_length)),
            FieldKind::Integer => match self {
                Provider::Sqlite => "INTEGER".into(),
                _ => "BIGINT".into(),
            },
            FieldKind::Float => match (self, decimal) {
                (Provider::Sqlite, _) => "REAL".into(),
                (Provider::Postgres, Some(d)) => format!("NUMERIC({},{})", d.precision, d.scale),
                (_, Some(d)) => format!("DECIMAL({},{})", d.precision, d.scale),
                (Provider::MySql, None) => "DOUBLE".into(),
                (Provider::SqlServer, None) => "FLOAT".into(),
                (Provider::Postgres, None) => "DOUBLE PRECISION".into(),
            },
            FieldKind::Boolean => match self {
                Provider::Sqlite => "INTEGER".into(),
                Provider::MySql => "TINYINT(1)".into(),
                Provider::SqlServer => "BIT".into(),
                Provider::Postgres => "BOOLEAN".into(),
            },
            FieldKind::Uuid => match self {
                Provider::Sqlite => "TEXT".into(),
                Provider::MySql => "CHAR(36)".into(),
                Provider::SqlServer => "UNIQUEIDENTIFIER".into(),
                Provider::Postgres => "UUID".into(),
            },
            FieldKind::Timestamp => match self {
                Provider::Sqlite => "TEXT".into(),
                Provider::MySql => "DATETIME(6)".into(),
                Provider::SqlServer => "DATETIMEOFFSET".into(),
                Provider::Postgres => "TIMESTAMPTZ".into(),
            },
        }
    }

    fn text_type(&self, max_length: Option<u32>) -> String {
        match (self, max_length) {
            (Provider::Sqlite, _) => "TEXT".into(),
            (Provider::MySql, Some(n)) if n <= MYSQL_MAX_VARCHAR => format!("VARCHAR({})", n),
            (Provider::MySql, _) => "LONGTEXT".into(),
            (Provider::SqlServer, Some(n)) if n <= SQLSERVER_MAX_NVARCHAR => {
                format!("NVARCHAR({})", n)
            }
            (Provider::SqlServer, _) => "NVARCHAR(MAX)".into(),
            (Provider::Postgres, Some(n)) => format!("VARCHAR({})", n),
            (Provider::Postgres, None) => "TEXT".into(),
        }
    }

    /// Column definition suffix of a database-generated integer key
    pub fn auto_increment_key(&self) -> &'static str {
        match self {
            Provider::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Provider::MySql => "BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY",
            Provider::SqlServer => "BIGINT IDENTITY(1,1) NOT NULL PRIMARY KEY",
            Provider::Postgres => "BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
        }
    }

    /// Current-timestamp default expression
    pub fn current_timestamp(&self) -> &'static str {
        match self {
            // %f is SS.SSS; pad to the microsecond text bound values use
            Provider::Sqlite => "(strftime('%Y-%m-%dT%H:%M:%f000Z', 'now'))",
            Provider::MySql => "CURRENT_TIMESTAMP(6)",
            Provider::SqlServer => "SYSDATETIMEOFFSET()",
            Provider::Postgres => "CURRENT_TIMESTAMP",
        }
    }

    /// Bind placeholder for the `index`-th parameter (1-based)
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Provider::Postgres => format!("${}", index),
            Provider::SqlServer => format!("@p{}", index),
            Provider::Sqlite | Provider::MySql => "?".into(),
        }
    }

    pub fn quote(&self, identifier: &str) -> String {
        match self {
            Provider::MySql => format!("`{}`", identifier.replace('`', "``")),
            Provider::SqlServer => format!("[{}]", identifier.replace(']', "]]")),
            Provider::Sqlite | Provider::Postgres => {
                format!("\"{}\"", identifier.replace('"', "\"\""))
            }
        }
    }

    /// Whether `INSERT ... RETURNING` is available
    pub fn supports_returning(&self) -> bool {
        matches!(self, Provider::Sqlite | Provider::Postgres)
    }

    /// Paging clause appended after `ORDER BY`
    ///
    /// `has_order` tells whether an `ORDER BY` was rendered; SQL Server needs
    /// one before `OFFSET`.
    pub fn paging(&self, skip: Option<usize>, take: Option<usize>, has_order: bool) -> String {
        match (self, skip, take) {
            (_, None, None) => String::new(),
            (Provider::SqlServer, skip, take) => {
                let mut out = String::new();
                if !has_order {
                    out.push_str(" ORDER BY (SELECT NULL)");
                }
                out.push_str(&format!(" OFFSET {} ROWS", skip.unwrap_or(0)));
                if let Some(take) = take {
                    out.push_str(&format!(" FETCH NEXT {} ROWS ONLY", take));
                }
                out
            }
            (Provider::Postgres, skip, take) => {
                let mut out = String::new();
                if let Some(take) = take {
                    out.push_str(&format!(" LIMIT {}", take));
                }
                if let Some(skip) = skip {
                    out.push_str(&format!(" OFFSET {}", skip));
                }
                out
            }
            // LIMIT is mandatory before OFFSET on these engines
            (Provider::Sqlite, skip, take) => paging_with_limit(skip, take, "-1"),
            (Provider::MySql, skip, take) => paging_with_limit(skip, take, "18446744073709551615"),
        }
    }
}

fn paging_with_limit(skip: Option<usize>, take: Option<usize>, unbounded: &str) -> String {
    let limit = take.map_or_else(|| unbounded.to_string(), |t| t.to_string());
    match skip {
        Some(skip) => format!(" LIMIT {} OFFSET {}", limit, skip),
        None => format!(" LIMIT {}", limit),
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Sqlite => "sqlite",
            Provider::MySql => "mysql",
            Provider::SqlServer => "sqlserver",
            Provider::Postgres => "postgres",
        };
        f.write_str(name)
    }
}
