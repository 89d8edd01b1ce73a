//! MySQL implementation of the staging store.
//!
//! Statements bind every value as a parameter. Table and column names are
//! interpolated only as validated [`Identifier`]s, quoted with backticks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Conn, Params, Pool, Row, TxOpts, Value};
use sync_core::{Cell, Identifier, StagedRow, TableData, TIMESTAMP_COLUMN, UNIQUE_ID_COLUMN};
use tracing::{debug, warn};

use crate::{StagingStore, SyncMetadata, TableSummary};

/// Default number of rows per INSERT statement.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Prepared statements carry at most this many `?` placeholders.
const MAX_PLACEHOLDERS: usize = 65_535;

/// Rows per INSERT so that `rows * columns` stays within [`MAX_PLACEHOLDERS`].
fn rows_per_statement(batch_size: usize, columns: usize) -> usize {
    (MAX_PLACEHOLDERS / columns.max(1)).min(batch_size).max(1)
}

/// Staging store backed by a MySQL database.
pub struct MySqlStagingStore {
    pool: Pool,
    metadata_table: Identifier,
    batch_size: usize,
}

impl MySqlStagingStore {
    pub fn new(pool: Pool, metadata_table: Identifier) -> Self {
        Self {
            pool,
            metadata_table,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Check that the staging database accepts connections.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: Option<i32> = conn.query_first("SELECT 1").await?;
        Ok(())
    }

    /// Close every pooled connection.
    pub async fn disconnect(self) -> Result<()> {
        self.pool.disconnect().await?;
        Ok(())
    }

    async fn conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .context("Failed to get MySQL staging connection")
    }

    async fn insert_batches<Q: Queryable>(
        &self,
        conn: &mut Q,
        table: &Identifier,
        columns: &[Identifier],
        rows: impl Iterator<Item = Vec<Value>>,
    ) -> Result<()> {
        let rows: Vec<Vec<Value>> = rows.collect();
        let column_list = columns
            .iter()
            .map(Identifier::mysql)
            .collect::<Vec<_>>()
            .join(", ");
        let row_template = format!("({})", vec!["?"; columns.len()].join(", "));

        let chunk_size = rows_per_statement(self.batch_size, columns.len());
        if chunk_size < self.batch_size {
            debug!(
                "{}: {} columns, inserting {} rows per statement",
                table,
                columns.len(),
                chunk_size
            );
        }
        for chunk in rows.chunks(chunk_size) {
            let sql = format!(
                "INSERT INTO {} ({column_list}) VALUES {}",
                table.mysql(),
                vec![row_template.as_str(); chunk.len()].join(", ")
            );
            let params: Vec<Value> = chunk.iter().flatten().cloned().collect();
            conn.exec_drop(sql, Params::Positional(params)).await?;
        }
        Ok(())
    }
}

async fn table_exists(conn: &mut Conn, table: &Identifier) -> Result<bool> {
    let found: Option<i32> = conn
        .exec_first(
            "SELECT 1 FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?",
            (table.as_str(),),
        )
        .await?;
    Ok(found.is_some())
}

/// First column of the first row, as a raw value.
async fn first_value(conn: &mut Conn, sql: String) -> Result<Option<Value>> {
    let row: Option<Row> = conn.exec_first(sql, ()).await?;
    Ok(row.and_then(|r| r.get::<Value, _>(0)))
}

fn datetime_value(ts: NaiveDateTime) -> Value {
    Value::Date(
        ts.year() as u16,
        ts.month() as u8,
        ts.day() as u8,
        ts.hour() as u8,
        ts.minute() as u8,
        ts.second() as u8,
        ts.nanosecond() / 1_000,
    )
}

fn date_value(date: NaiveDate) -> Value {
    Value::Date(
        date.year() as u16,
        date.month() as u8,
        date.day() as u8,
        0,
        0,
        0,
        0,
    )
}

fn value_to_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = NaiveDate::from_ymd_opt(*year as i32, *month as u32, *day as u32)?;
            let time = NaiveTime::from_hms_micro_opt(*hour as u32, *min as u32, *sec as u32, *micro)?;
            Some(NaiveDateTime::new(date, time))
        }
        Value::Bytes(b) => {
            let s = std::str::from_utf8(b).ok()?;
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
        }
        _ => None,
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::UInt(v) => i64::try_from(*v).ok(),
        Value::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_cell(value: Value, column_type: ColumnType) -> Cell {
    match value {
        Value::NULL => Cell::Null,
        Value::Int(v) => Cell::Int(v),
        Value::UInt(v) => i64::try_from(v).map_or(Cell::Float(v as f64), Cell::Int),
        Value::Float(v) => Cell::Float(v as f64),
        Value::Double(v) => Cell::Float(v),
        Value::Date(..) => value_to_datetime(&value).map_or(Cell::Null, Cell::Timestamp),
        Value::Time(..) => Cell::Null,
        Value::Bytes(ref b) => match column_type {
            ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
            | ColumnType::MYSQL_TYPE_DOUBLE
            | ColumnType::MYSQL_TYPE_FLOAT => std::str::from_utf8(b)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .map_or(Cell::Null, Cell::Float),
            ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_DATE => {
                value_to_datetime(&value).map_or(Cell::Null, Cell::Timestamp)
            }
            _ => Cell::Text(String::from_utf8_lossy(b).into_owned()),
        },
    }
}

fn cell_to_value(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::NULL,
        Cell::Int(v) => Value::Int(*v),
        Cell::Float(v) => Value::Double(*v),
        Cell::Timestamp(ts) => datetime_value(*ts),
        Cell::Text(s) => Value::Bytes(s.clone().into_bytes()),
    }
}

/// SQL type for a joined-table column, from its first non-null cell or,
/// failing that, its name.
fn column_sql_type(data: &TableData, idx: usize) -> &'static str {
    let first = data.rows.iter().map(|row| &row[idx]).find(|c| !c.is_null());
    match first {
        Some(Cell::Int(_)) => "BIGINT",
        Some(Cell::Float(_)) => "DOUBLE",
        Some(Cell::Timestamp(_)) => "DATETIME",
        Some(Cell::Text(_)) => "TEXT",
        Some(Cell::Null) | None => {
            let name = data.columns[idx].to_lowercase();
            if name == UNIQUE_ID_COLUMN {
                "BIGINT"
            } else if name.starts_with(TIMESTAMP_COLUMN) {
                "DATETIME"
            } else {
                "DOUBLE"
            }
        }
    }
}

#[async_trait]
impl StagingStore for MySqlStagingStore {
    async fn metadata_last_used_id(&self, table: &Identifier) -> Result<Option<i64>> {
        let mut conn = self.conn().await?;
        if !table_exists(&mut conn, &self.metadata_table).await? {
            return Ok(None);
        }
        let row: Option<Row> = conn
            .exec_first(
                format!(
                    "SELECT last_used_id FROM {} WHERE table_name = ?",
                    self.metadata_table.mysql()
                ),
                (table.as_str().to_lowercase(),),
            )
            .await?;
        Ok(row
            .and_then(|r| r.get::<Value, _>(0))
            .and_then(|v| value_to_i64(&v)))
    }

    async fn max_unique_id(&self, table: &Identifier) -> Result<Option<i64>> {
        let mut conn = self.conn().await?;
        if !table_exists(&mut conn, table).await? {
            return Ok(None);
        }
        let value = first_value(
            &mut conn,
            format!("SELECT MAX(`{UNIQUE_ID_COLUMN}`) FROM {}", table.mysql()),
        )
        .await?;
        Ok(value.as_ref().and_then(value_to_i64))
    }

    async fn max_timestamp(&self, table: &Identifier) -> Result<Option<NaiveDateTime>> {
        let mut conn = self.conn().await?;
        if !table_exists(&mut conn, table).await? {
            return Ok(None);
        }
        let value = first_value(
            &mut conn,
            format!("SELECT MAX(`{TIMESTAMP_COLUMN}`) FROM {}", table.mysql()),
        )
        .await?;
        Ok(value.as_ref().and_then(value_to_datetime))
    }

    async fn append_rows(
        &self,
        table: &Identifier,
        value_column: &Identifier,
        rows: &[StagedRow],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;

        conn.query_drop(format!(
            "CREATE TABLE IF NOT EXISTS {} (
                `{UNIQUE_ID_COLUMN}` BIGINT NOT NULL PRIMARY KEY,
                `{TIMESTAMP_COLUMN}` DATETIME NOT NULL,
                {} DOUBLE NULL,
                INDEX (`{TIMESTAMP_COLUMN}`)
            )",
            table.mysql(),
            value_column.mysql()
        ))
        .await
        .with_context(|| format!("Failed to create staging table {table}"))?;

        let columns = [
            Identifier::new(UNIQUE_ID_COLUMN)?,
            Identifier::new(TIMESTAMP_COLUMN)?,
            value_column.clone(),
        ];
        let values = rows.iter().map(|r| {
            vec![
                Value::Int(r.unique_id),
                datetime_value(r.timestamp),
                r.value.map_or(Value::NULL, Value::Double),
            ]
        });

        let mut tx = conn.start_transaction(TxOpts::default()).await?;
        self.insert_batches(&mut tx, table, &columns, values).await?;
        tx.commit().await?;

        debug!("Appended {} rows to {}", rows.len(), table);
        Ok(rows.len() as u64)
    }

    async fn purge_older_than(&self, table: &Identifier, cutoff: NaiveDateTime) -> Result<u64> {
        let mut conn = self.conn().await?;
        if !table_exists(&mut conn, table).await? {
            return Ok(0);
        }
        conn.exec_drop(
            format!(
                "DELETE FROM {} WHERE `{TIMESTAMP_COLUMN}` < ?",
                table.mysql()
            ),
            (datetime_value(cutoff),),
        )
        .await?;
        Ok(conn.affected_rows())
    }

    async fn upsert_metadata(&self, metadata: &SyncMetadata) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.query_drop(format!(
            "CREATE TABLE IF NOT EXISTS {} (
                table_name VARCHAR(255) PRIMARY KEY,
                last_run_date DATE,
                last_run_timestamp DATETIME,
                last_used_id BIGINT
            )",
            self.metadata_table.mysql()
        ))
        .await
        .context("Failed to create metadata table")?;

        conn.exec_drop(
            format!(
                "INSERT INTO {} (table_name, last_run_date, last_run_timestamp, last_used_id)
                 VALUES (?, ?, ?, ?)
                 ON DUPLICATE KEY UPDATE
                    last_run_date = VALUES(last_run_date),
                    last_run_timestamp = VALUES(last_run_timestamp),
                    last_used_id = VALUES(last_used_id)",
                self.metadata_table.mysql()
            ),
            (
                metadata.table_name.to_lowercase(),
                date_value(metadata.last_run_date),
                datetime_value(metadata.last_run_timestamp),
                metadata.last_used_id,
            ),
        )
        .await?;
        Ok(())
    }

    async fn list_metadata(&self) -> Result<Vec<SyncMetadata>> {
        let mut conn = self.conn().await?;
        if !table_exists(&mut conn, &self.metadata_table).await? {
            return Ok(Vec::new());
        }
        let rows: Vec<Row> = conn
            .exec(
                format!(
                    "SELECT table_name, last_run_date, last_run_timestamp, last_used_id
                     FROM {} ORDER BY last_run_timestamp DESC",
                    self.metadata_table.mysql()
                ),
                (),
            )
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let table_name: Option<String> = row.get(0);
            let date = row.get::<Value, _>(1).as_ref().and_then(value_to_datetime);
            let timestamp = row.get::<Value, _>(2).as_ref().and_then(value_to_datetime);
            let last_used_id = row.get::<Value, _>(3).as_ref().and_then(value_to_i64);
            match (table_name, date, timestamp, last_used_id) {
                (Some(table_name), Some(date), Some(timestamp), Some(last_used_id)) => {
                    out.push(SyncMetadata {
                        table_name,
                        last_run_date: date.date(),
                        last_run_timestamp: timestamp,
                        last_used_id,
                    })
                }
                (name, ..) => warn!("Skipping incomplete metadata row for {:?}", name),
            }
        }
        Ok(out)
    }

    async fn table_columns(&self, table: &Identifier) -> Result<Option<Vec<String>>> {
        let mut conn = self.conn().await?;
        let columns: Vec<String> = conn
            .exec(
                "SELECT COLUMN_NAME FROM information_schema.columns
                 WHERE table_schema = DATABASE() AND table_name = ?
                 ORDER BY ORDINAL_POSITION",
                (table.as_str(),),
            )
            .await?;
        Ok(if columns.is_empty() {
            None
        } else {
            Some(columns)
        })
    }

    async fn read_table(&self, table: &Identifier) -> Result<Option<TableData>> {
        let Some(columns) = self.table_columns(table).await? else {
            return Ok(None);
        };
        let mut conn = self.conn().await?;
        let rows: Vec<Row> = conn
            .exec(format!("SELECT * FROM {}", table.mysql()), ())
            .await?;

        let mut data = TableData::new(columns);
        for mut row in rows {
            let types: Vec<ColumnType> = row
                .columns_ref()
                .iter()
                .map(|c| c.column_type())
                .collect();
            let cells = types
                .into_iter()
                .enumerate()
                .map(|(idx, column_type)| {
                    let value = row.take::<Value, usize>(idx).unwrap_or(Value::NULL);
                    value_to_cell(value, column_type)
                })
                .collect();
            data.rows.push(cells);
        }
        Ok(Some(data))
    }

    async fn replace_table(&self, table: &Identifier, data: &TableData) -> Result<()> {
        let staging_name = Identifier::new(&format!("{table}__new"))?;
        let retired_name = Identifier::new(&format!("{table}__old"))?;
        let columns = data
            .columns
            .iter()
            .map(|c| Identifier::new(c))
            .collect::<Result<Vec<_>, _>>()?;

        let column_defs = columns
            .iter()
            .enumerate()
            .map(|(idx, col)| format!("{} {} NULL", col.mysql(), column_sql_type(data, idx)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut conn = self.conn().await?;
        conn.query_drop(format!("DROP TABLE IF EXISTS {}", staging_name.mysql()))
            .await?;
        conn.query_drop(format!(
            "CREATE TABLE {} ({column_defs})",
            staging_name.mysql()
        ))
        .await?;

        let mut tx = conn.start_transaction(TxOpts::default()).await?;
        self.insert_batches(
            &mut tx,
            &staging_name,
            &columns,
            data.rows.iter().map(|row| row.iter().map(cell_to_value).collect()),
        )
        .await?;
        tx.commit().await?;

        if table_exists(&mut conn, table).await? {
            conn.query_drop(format!("DROP TABLE IF EXISTS {}", retired_name.mysql()))
                .await?;
            conn.query_drop(format!(
                "RENAME TABLE {table_q} TO {retired}, {staging} TO {table_q}",
                table_q = table.mysql(),
                retired = retired_name.mysql(),
                staging = staging_name.mysql()
            ))
            .await?;
            conn.query_drop(format!("DROP TABLE {}", retired_name.mysql()))
                .await?;
        } else {
            conn.query_drop(format!(
                "RENAME TABLE {} TO {}",
                staging_name.mysql(),
                table.mysql()
            ))
            .await?;
        }
        Ok(())
    }

    async fn table_summary(
        &self,
        table: &Identifier,
        timestamp_column: Option<&Identifier>,
    ) -> Result<Option<TableSummary>> {
        let mut conn = self.conn().await?;
        if !table_exists(&mut conn, table).await? {
            return Ok(None);
        }
        let sql = match timestamp_column {
            Some(col) => format!(
                "SELECT COUNT(*), MIN({col}), MAX({col}) FROM {}",
                table.mysql(),
                col = col.mysql()
            ),
            None => format!("SELECT COUNT(*), NULL, NULL FROM {}", table.mysql()),
        };
        let row: Option<Row> = conn.exec_first(sql, ()).await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let row_count = row
            .get::<Value, _>(0)
            .as_ref()
            .and_then(value_to_i64)
            .unwrap_or(0);
        Ok(Some(TableSummary {
            table: table.as_str().to_string(),
            row_count: row_count.max(0) as u64,
            earliest: row.get::<Value, _>(1).as_ref().and_then(value_to_datetime),
            latest: row.get::<Value, _>(2).as_ref().and_then(value_to_datetime),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 16)
            .unwrap()
            .and_hms_micro_opt(8, 30, 15, 250)
            .unwrap()
    }

    #[test]
    fn test_wide_tables_stay_under_placeholder_limit() {
        // A joined table with 80 value columns plus unique_id
        assert_eq!(rows_per_statement(1000, 81), 809);
        assert!(rows_per_statement(1000, 81) * 81 <= MAX_PLACEHOLDERS);
        assert_eq!(rows_per_statement(5000, 3), 5000);
        assert_eq!(rows_per_statement(1000, 3), 1000);
        assert_eq!(rows_per_statement(1000, 70_000), 1);
        assert_eq!(rows_per_statement(1000, 0), 1000);
    }

    #[test]
    fn test_datetime_value_roundtrip() {
        let value = datetime_value(ts());
        assert_eq!(value, Value::Date(2025, 10, 16, 8, 30, 15, 250));
        assert_eq!(value_to_datetime(&value), Some(ts()));
    }

    #[test]
    fn test_text_protocol_datetime() {
        let value = Value::Bytes(b"2025-10-16 08:30:15".to_vec());
        assert_eq!(
            value_to_datetime(&value),
            NaiveDate::from_ymd_opt(2025, 10, 16)
                .unwrap()
                .and_hms_opt(8, 30, 15)
        );
    }

    #[test]
    fn test_value_to_cell() {
        assert_eq!(
            value_to_cell(Value::Int(3), ColumnType::MYSQL_TYPE_LONGLONG),
            Cell::Int(3)
        );
        assert_eq!(
            value_to_cell(Value::NULL, ColumnType::MYSQL_TYPE_DOUBLE),
            Cell::Null
        );
        assert_eq!(
            value_to_cell(
                Value::Bytes(b"21.55".to_vec()),
                ColumnType::MYSQL_TYPE_NEWDECIMAL
            ),
            Cell::Float(21.55)
        );
        assert_eq!(
            value_to_cell(Value::Bytes(b"abc".to_vec()), ColumnType::MYSQL_TYPE_VAR_STRING),
            Cell::Text("abc".into())
        );
    }

    #[test]
    fn test_column_sql_type() {
        let data = TableData {
            columns: vec![
                "unique_id".into(),
                "timestamp_co2".into(),
                "co2".into(),
                "note".into(),
            ],
            rows: vec![
                vec![Cell::Int(1), Cell::Null, Cell::Null, Cell::Text("x".into())],
                vec![Cell::Int(2), Cell::Null, Cell::Float(1.5), Cell::Null],
            ],
        };
        assert_eq!(column_sql_type(&data, 0), "BIGINT");
        assert_eq!(column_sql_type(&data, 1), "DATETIME");
        assert_eq!(column_sql_type(&data, 2), "DOUBLE");
        assert_eq!(column_sql_type(&data, 3), "TEXT");
    }
}
