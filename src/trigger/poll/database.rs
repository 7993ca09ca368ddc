//! Database trigger polling (spec.md §4.8 "Database polling").

use std::time::Duration;

use serde_json::{Map, Value};
use sqlx::{mysql::MySqlPoolOptions, postgres::PgPoolOptions, Column, Row, TypeInfo};
use tiberius::{AuthMethod, Client, Config as TiberiusConfig, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

use super::{validate_identifier, PollOutcome};
use crate::errors::{FlowsmithError, Result};
use crate::model::trigger::{DatabaseTriggerConfig, WatermarkType};
use crate::model::{DbConnection, DbKind, TlsMode};

type TiberiusClient = Client<tokio_util::compat::Compat<TcpStream>>;

/// Short-lived, single-connection handle for a schema-read probe
/// (spec.md §5 "Shared-resource policy": max 1 conn, lifetime 30s) so
/// trigger polling cannot starve live pipeline workers. SQL Server has
/// no connection-pool abstraction in `tiberius`; a fresh client is
/// dialed per poll and dropped at the end of the probe, which gives
/// the same "short-lived, one connection" shape the other two
/// dialects get from their pool options.
async fn probe_pool(conn: &DbConnection) -> Result<ProbePool> {
    let url = connection_url(conn);
    match conn.kind {
        DbKind::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(1)
                .max_lifetime(Duration::from_secs(30))
                .connect(&url)
                .await?;
            Ok(ProbePool::Postgres(pool))
        }
        DbKind::Mysql => {
            let pool = MySqlPoolOptions::new()
                .max_connections(1)
                .max_lifetime(Duration::from_secs(30))
                .connect(&url)
                .await?;
            Ok(ProbePool::Mysql(pool))
        }
        DbKind::Sqlserver => {
            let client = sqlserver_connect(conn).await?;
            Ok(ProbePool::Sqlserver(client))
        }
    }
}

async fn sqlserver_connect(conn: &DbConnection) -> Result<TiberiusClient> {
    let mut config = TiberiusConfig::new();
    config.host(conn.host.clone());
    config.port(conn.port);
    config.database(conn.database.clone());
    config.authentication(AuthMethod::sql_server(conn.user.clone(), conn.password.clone()));
    config.encryption(match conn.tls_mode {
        TlsMode::Disable => EncryptionLevel::NotSupported,
        TlsMode::Require | TlsMode::VerifyFull => EncryptionLevel::Required,
    });
    if !matches!(conn.tls_mode, TlsMode::VerifyFull) {
        config.trust_cert();
    }

    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    let client = Client::connect(config, tcp.compat_write()).await?;
    Ok(client)
}

enum ProbePool {
    Postgres(sqlx::PgPool),
    Mysql(sqlx::MySqlPool),
    Sqlserver(TiberiusClient),
}

fn connection_url(conn: &DbConnection) -> String {
    let scheme = match conn.kind {
        DbKind::Postgres => "postgres",
        DbKind::Mysql => "mysql",
        DbKind::Sqlserver => "sqlserver",
    };
    format!(
        "{scheme}://{}:{}@{}:{}/{}",
        conn.user, conn.password, conn.host, conn.port, conn.database
    )
}

fn row_to_map(columns: &[impl Column], values: Vec<Value>) -> Map<String, Value> {
    let mut map = Map::new();
    for (col, value) in columns.iter().zip(values) {
        map.insert(col.name().to_string(), value);
    }
    map
}

/// Polls a database trigger: validates identifiers, builds a
/// parameterized query ordered by watermark, and returns new events in
/// ascending-watermark order without mutating the trigger's stored
/// watermark (the caller persists the max after a successful poll, per
/// spec.md §4.8).
pub async fn poll(cfg: &DatabaseTriggerConfig, conn: &DbConnection) -> Result<(PollOutcome, Option<String>)> {
    validate_identifier(&cfg.table)?;
    validate_identifier(&cfg.watermark_column)?;

    let selection = cfg
        .selection
        .clone()
        .map(|cols| {
            cols.iter().try_for_each(|c| validate_identifier(c))?;
            Ok::<_, FlowsmithError>(cols.join(", "))
        })
        .transpose()?
        .unwrap_or_else(|| "*".to_string());

    let mut sql = format!(
        "SELECT {selection} FROM {} WHERE {} > ?",
        cfg.table, cfg.watermark_column
    );
    if let Some(extra) = &cfg.extra_where {
        sql.push_str(&format!(" AND {extra}"));
    }
    sql.push_str(&format!(" ORDER BY {} ASC LIMIT {}", cfg.watermark_column, cfg.batch_size));

    let last_watermark = cfg.last_watermark.clone().unwrap_or_else(|| match cfg.watermark_type {
        WatermarkType::Int => "0".to_string(),
        WatermarkType::Timestamp => "1970-01-01T00:00:00Z".to_string(),
    });

    let pool = probe_pool(conn).await?;
    let mut events = Vec::new();
    let mut max_watermark = last_watermark.clone();

    match pool {
        ProbePool::Postgres(pool) => {
            let pg_sql = rebind_postgres(&sql);
            let rows = sqlx::query(&pg_sql).bind(&last_watermark).fetch_all(&pool).await?;
            for row in &rows {
                let mut values = Vec::with_capacity(row.columns().len());
                for col in row.columns() {
                    values.push(pg_value_as_json(row, col));
                }
                let map = row_to_map(row.columns(), values);
                if let Some(wm) = map.get(&cfg.watermark_column) {
                    max_watermark = max_watermark_str(&max_watermark, wm);
                }
                events.push(Value::Object(map));
            }
        }
        ProbePool::Mysql(pool) => {
            let rows = sqlx::query(&sql).bind(&last_watermark).fetch_all(&pool).await?;
            for row in &rows {
                let mut values = Vec::with_capacity(row.columns().len());
                for col in row.columns() {
                    values.push(mysql_value_as_json(row, col));
                }
                let map = row_to_map(row.columns(), values);
                if let Some(wm) = map.get(&cfg.watermark_column) {
                    max_watermark = max_watermark_str(&max_watermark, wm);
                }
                events.push(Value::Object(map));
            }
        }
        ProbePool::Sqlserver(mut client) => {
            let ms_sql = rebind_sqlserver(&sql);
            let stream = client
                .query(&ms_sql, &[&last_watermark.as_str()])
                .await?;
            let rows = stream.into_first_result().await?;
            for row in &rows {
                let map = sqlserver_row_to_map(row);
                if let Some(wm) = map.get(&cfg.watermark_column) {
                    max_watermark = max_watermark_str(&max_watermark, wm);
                }
                events.push(Value::Object(map));
            }
        }
    }

    let new_watermark = if max_watermark == last_watermark {
        None
    } else {
        Some(max_watermark)
    };

    Ok((PollOutcome { events }, new_watermark))
}

/// Primes a database trigger's watermark on activation (spec.md §4.8
/// "Activation hooks"). Priming failure is the caller's concern to
/// treat as non-fatal.
pub async fn prime(cfg: &DatabaseTriggerConfig, conn: &DbConnection) -> Result<Option<String>> {
    validate_identifier(&cfg.table)?;
    validate_identifier(&cfg.watermark_column)?;
    let sql = format!("SELECT MAX({}) FROM {}", cfg.watermark_column, cfg.table);
    let pool = probe_pool(conn).await?;
    match pool {
        ProbePool::Postgres(pool) => {
            let row = sqlx::query(&sql).fetch_one(&pool).await?;
            Ok(pg_scalar_as_string(&row))
        }
        ProbePool::Mysql(pool) => {
            let row = sqlx::query(&sql).fetch_one(&pool).await?;
            Ok(mysql_scalar_as_string(&row))
        }
        ProbePool::Sqlserver(mut client) => {
            let params: &[&dyn tiberius::ToSql] = &[];
            let stream = client.query(&sql, params).await?;
            let row = stream.into_row().await?;
            Ok(row.as_ref().and_then(sqlserver_scalar_as_string))
        }
    }
}

fn max_watermark_str(current: &str, candidate: &Value) -> String {
    let candidate_str = match candidate {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return current.to_string(),
    };
    if let (Ok(a), Ok(b)) = (current.parse::<f64>(), candidate_str.parse::<f64>()) {
        return if b > a { candidate_str } else { current.to_string() };
    }
    if candidate_str.as_str() > current {
        candidate_str
    } else {
        current.to_string()
    }
}

/// Postgres placeholders are `$N`; the stored SQL template uses `?`
/// for readability and is rebound here for the dialect (spec.md §8
/// property 6 covers the data-path insert dialects; this mirrors the
/// same convention for the trigger's probe query).
fn rebind_postgres(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut n = 0;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push_str(&format!("${n}"));
        } else {
            out.push(ch);
        }
    }
    out
}

/// SQL Server placeholders are `@p1, @p2, ...`; rebound from the
/// stored `?` template like the Postgres dialect above.
fn rebind_sqlserver(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut n = 0;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push_str(&format!("@p{n}"));
        } else {
            out.push(ch);
        }
    }
    out
}

fn sqlserver_row_to_map(row: &tiberius::Row) -> Map<String, Value> {
    let mut map = Map::new();
    for (idx, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), sqlserver_value_as_json(row, idx));
    }
    map
}

fn sqlserver_value_as_json(row: &tiberius::Row, idx: usize) -> Value {
    if let Ok(Some(v)) = row.try_get::<i64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(idx) {
        return Value::from(v);
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(Some(v)) = row.try_get::<bool, _>(idx) {
        return Value::from(v);
    }
    if let Ok(Some(v)) = row.try_get::<&str, _>(idx) {
        return Value::from(v);
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
        return Value::from(v.and_utc().to_rfc3339());
    }
    Value::Null
}

fn sqlserver_scalar_as_string(row: &tiberius::Row) -> Option<String> {
    if let Ok(Some(v)) = row.try_get::<i64, _>(0) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(0) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(0) {
        return Some(v.and_utc().to_rfc3339());
    }
    None
}

fn pg_value_as_json(row: &sqlx::postgres::PgRow, col: &sqlx::postgres::PgColumn) -> Value {
    let idx = col.ordinal();
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
        return Value::from(v.to_rfc3339());
    }
    Value::Null
}

fn mysql_value_as_json(row: &sqlx::mysql::MySqlRow, col: &sqlx::mysql::MySqlColumn) -> Value {
    let idx = col.ordinal();
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Value::from(v);
    }
    Value::Null
}

fn pg_scalar_as_string(row: &sqlx::postgres::PgRow) -> Option<String> {
    if let Ok(v) = row.try_get::<i64, _>(0) {
        return Some(v.to_string());
    }
    if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(0) {
        return Some(v.to_rfc3339());
    }
    None
}

fn mysql_scalar_as_string(row: &sqlx::mysql::MySqlRow) -> Option<String> {
    if let Ok(v) = row.try_get::<i64, _>(0) {
        return Some(v.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_watermark_prefers_numeric_comparison() {
        assert_eq!(max_watermark_str("5", &Value::from(12)), "12");
        assert_eq!(max_watermark_str("20", &Value::from(5)), "20");
    }

    #[test]
    fn postgres_rebind_produces_sequential_placeholders() {
        assert_eq!(rebind_postgres("a = ? AND b = ?"), "a = $1 AND b = $2");
    }

    #[test]
    fn sqlserver_rebind_produces_sequential_placeholders() {
        assert_eq!(rebind_sqlserver("a = ? AND b = ?"), "a = @p1 AND b = @p2");
    }
}
