//! SQLite persistence.
//!
//! Tables are created from the first batch written to them and widened with
//! `ALTER TABLE ... ADD COLUMN` when later rows carry new keys. Rows are upserted on
//! their primary key and never deleted. Each batch is one transaction.

use serde_json::Value;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqlitePool,
    SqlitePoolOptions,
};
use sqlx::query::Query;
use sqlx::Row as _;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::constants::{ID, SCHEMA_VERSION};
use crate::error::{ClickUpError, Result};
use crate::models::Row;

pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Opens (creating when missing) a database file.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        info!("Opening SQLite database: {}", path.display());
        Self::connect(options, true).await
    }

    /// Opens an existing database for reading. The schema version is checked but
    /// never stamped.
    pub async fn open_read_only(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        info!("Opening SQLite database read-only: {}", path.display());
        Self::connect(options, false).await
    }

    /// Private in-memory database, gone when the sink is dropped.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(SqliteConnectOptions::from_str("sqlite::memory:")?, true).await
    }

    async fn connect(options: SqliteConnectOptions, stamp: bool) -> Result<Self> {
        // One connection: writes are serial and an in-memory database lives with it
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let sink = Self { pool };
        sink.check_schema_version(stamp).await?;
        Ok(sink)
    }

    async fn check_schema_version(&self, stamp: bool) -> Result<()> {
        let version = self.schema_version().await?;

        if version > SCHEMA_VERSION {
            return Err(ClickUpError::Persistence(format!(
                "database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }
        if stamp && version < SCHEMA_VERSION {
            debug!("Stamping schema version {} (was {})", SCHEMA_VERSION, version);
            sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn schema_version(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Inserts or replaces `rows` in `table` keyed on `primary_key`, returning the
    /// number of rows written. All or nothing.
    pub async fn upsert(&self, table: &str, rows: &[Row], primary_key: &str) -> Result<usize> {
        if table.is_empty() {
            return Err(ClickUpError::Persistence("empty table name".to_string()));
        }
        if rows.is_empty() {
            return Ok(0);
        }
        for (index, row) in rows.iter().enumerate() {
            if matches!(row.get(primary_key), None | Some(Value::Null)) {
                return Err(ClickUpError::Persistence(format!(
                    "row {} for table {} has no '{}' value",
                    index, table, primary_key
                )));
            }
        }

        let batch = batch_columns(rows, primary_key);

        let mut tx = self.pool.begin().await?;

        let mut columns = table_columns(&mut tx, table).await?;
        if columns.is_empty() {
            let definitions: Vec<String> = batch
                .iter()
                .map(|column| {
                    let mut definition = format!("{} {}", quote(column), affinity(rows, column));
                    if column == primary_key {
                        definition.push_str(" PRIMARY KEY");
                    }
                    definition
                })
                .collect();
            let sql = format!("CREATE TABLE {} ({})", quote(table), definitions.join(", "));
            debug!("{}", sql);
            sqlx::query(&sql).execute(&mut *tx).await?;
            columns = batch;
        } else {
            let known: HashSet<String> = columns.iter().map(|c| c.to_ascii_lowercase()).collect();
            for column in batch {
                if known.contains(&column.to_ascii_lowercase()) {
                    continue;
                }
                let sql = format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote(table),
                    quote(&column),
                    affinity(rows, &column)
                );
                debug!("{}", sql);
                sqlx::query(&sql).execute(&mut *tx).await?;
                columns.push(column);
            }
        }

        // Every column of the table is written, so keys a row lacks become NULL
        let sql = upsert_sql(table, &columns, primary_key);
        for row in rows {
            let mut query = sqlx::query(&sql);
            for column in &columns {
                query = bind_value(query, lookup(row, column));
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(rows.len())
    }

    /// Primary key values of `table` in insertion order; empty when the table does
    /// not exist yet.
    pub async fn ids(&self, table: &str) -> Result<Vec<String>> {
        if !self.has_table(table).await? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT CAST({pk} AS TEXT) FROM {table} WHERE {pk} IS NOT NULL ORDER BY rowid",
            pk = quote(ID),
            table = quote(table)
        );
        Ok(sqlx::query_scalar(&sql).fetch_all(&self.pool).await?)
    }

    /// Row count of `table`, 0 when the table does not exist.
    pub async fn count(&self, table: &str) -> Result<i64> {
        if !self.has_table(table).await? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", quote(table));
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    pub async fn tables(&self) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn has_table(&self, table: &str) -> Result<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Column names of `table` in declaration order.
    pub async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        table_columns(&mut conn, table).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Column names in declaration order, empty when the table does not exist.
async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", quote(table)))
        .fetch_all(&mut *conn)
        .await?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        columns.push(row.try_get::<String, _>("name")?);
    }
    Ok(columns)
}

/// Union of the batch's keys in first-seen order, primary key first. SQLite
/// compares identifiers case-insensitively, so keys differing only in case collapse.
fn batch_columns(rows: &[Row], primary_key: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = vec![primary_key.to_string()];
    seen.insert(primary_key.to_ascii_lowercase());
    for row in rows {
        for key in row.keys() {
            if seen.insert(key.to_ascii_lowercase()) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Column affinity from the first non-null value in the batch.
fn affinity(rows: &[Row], column: &str) -> &'static str {
    let first = rows
        .iter()
        .filter_map(|row| lookup(row, column))
        .find(|value| !value.is_null());
    match first {
        Some(Value::Bool(_)) => "INTEGER",
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => "INTEGER",
        Some(Value::Number(_)) => "REAL",
        _ => "TEXT",
    }
}

/// Value of `column` in `row`, matching the key the way SQLite matches identifiers.
fn lookup<'r>(row: &'r Row, column: &str) -> Option<&'r Value> {
    row.get(column).or_else(|| {
        row.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    })
}

fn upsert_sql(table: &str, columns: &[String], primary_key: &str) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != primary_key)
        .map(|c| format!("{0} = excluded.{0}", quote(c)))
        .collect();

    let conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        quote(table),
        names.join(", "),
        placeholders,
        quote(primary_key),
        conflict
    )
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Option<&Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        None | Some(Value::Null) => query.bind(Option::<String>::None),
        Some(Value::Bool(b)) => query.bind(*b),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Some(Value::String(s)) => query.bind(s.clone()),
        // Nested objects and arrays are kept as JSON text
        Some(other) => query.bind(other.to_string()),
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
