//! DB connection descriptor and the stable connection-id used to
//! deduplicate connections within an emitted program (spec.md §3).

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbKind {
    Postgres,
    Mysql,
    Sqlserver,
}

impl DbKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DbKind::Postgres => "postgres",
            DbKind::Mysql => "mysql",
            DbKind::Sqlserver => "sqlserver",
        }
    }

    /// Placeholder style for the dialect (spec.md §8 property 6).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            DbKind::Postgres => format!("${}", index),
            DbKind::Mysql => "?".to_string(),
            DbKind::Sqlserver => format!("@p{}", index),
        }
    }

    /// The driver module path the generated program imports, and the
    /// pinned version recorded in the dependency manifest (spec.md §4.7,
    /// §6). Fixed in code, as the spec requires.
    pub fn driver_module_and_version(self) -> (&'static str, &'static str) {
        match self {
            DbKind::Postgres => ("github.com/jackc/pgx/v5", "v5.6.0"),
            DbKind::Mysql => ("github.com/go-sql-driver/mysql", "v1.8.1"),
            DbKind::Sqlserver => ("github.com/microsoft/go-mssqldb", "v1.7.2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    Disable,
    Require,
    VerifyFull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConnection {
    pub kind: DbKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub tls_mode: TlsMode,
    pub extra: Option<String>,
}

/// Derives the stable connection id used to deduplicate connections
/// within a single emitted program (spec.md §3: Glossary "Connection
/// id"). Deliberately excludes `password` and `extra` so credential
/// rotation for the same logical connection doesn't spuriously open a
/// second pool.
pub fn connection_id(conn: &DbConnection) -> String {
    let mut hasher = DefaultHasher::new();
    conn.kind.as_str().hash(&mut hasher);
    conn.host.hash(&mut hasher);
    conn.port.hash(&mut hasher);
    conn.database.hash(&mut hasher);
    conn.user.hash(&mut hasher);
    format!("{:?}", conn.tls_mode).hash(&mut hasher);
    format!("conn_{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(password: &str) -> DbConnection {
        DbConnection {
            kind: DbKind::Postgres,
            host: "db.internal".into(),
            port: 5432,
            database: "orders".into(),
            user: "svc".into(),
            password: password.into(),
            tls_mode: TlsMode::Require,
            extra: None,
        }
    }

    #[test]
    fn connection_id_ignores_password() {
        let a = connection_id(&sample("secret1"));
        let b = connection_id(&sample("secret2"));
        assert_eq!(a, b);
    }

    #[test]
    fn connection_id_distinguishes_host() {
        let mut other = sample("x");
        other.host = "other.internal".into();
        assert_ne!(connection_id(&sample("x")), connection_id(&other));
    }

    #[test]
    fn placeholder_dialects_match_spec() {
        assert_eq!(DbKind::Postgres.placeholder(1), "$1");
        assert_eq!(DbKind::Mysql.placeholder(1), "?");
        assert_eq!(DbKind::Sqlserver.placeholder(1), "@p1");
    }
}
