// src/storage/persistence.rs
use crate::domain::errors::{StorageError, StorageResult};
use crate::domain::models::{AssetClass, FlowRecord, PricePoint, RegionalPoint};
use chrono::{DateTime, NaiveDate, Utc};
use duckdb::{params, Connection};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub const DATABASE_FILE: &str = "money_flow.duckdb";
pub const METADATA_FILE: &str = "data_metadata.json";
pub const LAST_REFRESH_FILE: &str = "last_refresh.txt";

pub const ASSET_PRICES_TABLE: &str = "asset_prices_latest";
pub const REGIONAL_DATA_TABLE: &str = "regional_data_latest";
pub const FLOW_DATA_TABLE: &str = "flow_data_latest";

/// Summary written after every successful refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshMetadata {
    pub refresh_time: DateTime<Utc>,
    pub price_records: usize,
    pub regional_records: usize,
    pub flow_records: usize,
}

/// Columnar storage of the latest tables in a DuckDB file under the data directory.
///
/// Clones share one connection; every save and load holds its lock for the
/// whole statement or transaction.
#[derive(Clone)]
pub struct DataPersistence {
    data_dir: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl fmt::Debug for DataPersistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPersistence")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

/// Rows of the three latest tables as read in one go
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestTables {
    pub asset_prices: Option<Vec<PricePoint>>,
    pub regional_data: Option<Vec<RegionalPoint>>,
    pub flow_data: Option<Vec<FlowRecord>>,
}

impl DataPersistence {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> StorageResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        let connection = Connection::open(data_dir.join(DATABASE_FILE))?;
        log::info!("DataPersistence initialized with data_dir={}", data_dir.display());
        Ok(Self {
            data_dir,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Run `work` inside one transaction on the shared connection
    fn in_transaction<T>(&self, work: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let connection = self.connection.lock();
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = work(&*connection);
        finalize_transaction(&*connection, result)
    }

    pub fn save_asset_prices(&self, rows: &[PricePoint]) -> StorageResult<usize> {
        self.in_transaction(|connection| write_asset_prices(connection, rows))
    }

    pub fn save_regional_data(&self, rows: &[RegionalPoint]) -> StorageResult<usize> {
        self.in_transaction(|connection| write_regional_data(connection, rows))
    }

    pub fn save_flow_data(&self, rows: &[FlowRecord]) -> StorageResult<usize> {
        self.in_transaction(|connection| write_flow_data(connection, rows))
    }

    /// Replace all three tables in a single transaction
    pub fn save_latest_tables(
        &self,
        asset_prices: &[PricePoint],
        regional_data: &[RegionalPoint],
        flow_data: &[FlowRecord],
    ) -> StorageResult<()> {
        self.in_transaction(|connection| {
            write_asset_prices(connection, asset_prices)?;
            write_regional_data(connection, regional_data)?;
            write_flow_data(connection, flow_data)?;
            Ok(())
        })
    }

    pub fn load_asset_prices(&self) -> StorageResult<Option<Vec<PricePoint>>> {
        read_asset_prices(&self.connection.lock())
    }

    pub fn load_regional_data(&self) -> StorageResult<Option<Vec<RegionalPoint>>> {
        read_regional_data(&self.connection.lock())
    }

    pub fn load_flow_data(&self) -> StorageResult<Option<Vec<FlowRecord>>> {
        read_flow_data(&self.connection.lock())
    }

    /// Read all three tables in one transaction
    pub fn load_latest_tables(&self) -> StorageResult<LatestTables> {
        self.in_transaction(|connection| {
            Ok(LatestTables {
                asset_prices: read_asset_prices(connection)?,
                regional_data: read_regional_data(connection)?,
                flow_data: read_flow_data(connection)?,
            })
        })
    }

    pub fn save_metadata(&self, metadata: &RefreshMetadata) -> StorageResult<()> {
        let contents = serde_json::to_string_pretty(metadata)?;
        fs::write(self.data_dir.join(METADATA_FILE), contents)?;
        Ok(())
    }

    pub fn load_metadata(&self) -> StorageResult<Option<RefreshMetadata>> {
        let path = self.data_dir.join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Time of the last successful refresh; unreadable contents count as never refreshed
    pub fn last_refresh_time(&self) -> Option<DateTime<Utc>> {
        let path = self.data_dir.join(LAST_REFRESH_FILE);
        let contents = fs::read_to_string(path).ok()?;
        match DateTime::parse_from_rfc3339(contents.trim()) {
            Ok(timestamp) => Some(timestamp.with_timezone(&Utc)),
            Err(e) => {
                log::error!("Error reading last refresh time: {}", e);
                None
            }
        }
    }

    pub fn save_last_refresh_time(&self, timestamp: DateTime<Utc>) -> StorageResult<()> {
        fs::write(self.data_dir.join(LAST_REFRESH_FILE), timestamp.to_rfc3339())?;
        log::info!("Saved last refresh time: {}", timestamp);
        Ok(())
    }

    /// Delete files under the data directory last modified more than `days` ago.
    /// The open database file is never removed.
    pub fn cleanup_old_files(&self, days: u64) -> StorageResult<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(days * 24 * 60 * 60))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let removed = remove_files_older_than(&self.data_dir, cutoff)?;
        if removed > 0 {
            log::info!("Cleaned up {} old files", removed);
        }
        Ok(removed)
    }
}

fn remove_files_older_than(dir: &Path, cutoff: SystemTime) -> StorageResult<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_database = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(DATABASE_FILE));
        if is_database {
            continue;
        }
        if path.is_dir() {
            removed += remove_files_older_than(&path, cutoff)?;
        } else if fs::metadata(&path)?.modified()? < cutoff {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn table_exists(connection: &Connection, table: &str) -> StorageResult<bool> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
        params![table],
        |row| row.get(0),
    )?;
    if count == 0 {
        log::warn!("Table not found: {}", table);
    }
    Ok(count > 0)
}

/// Drop and recreate `table` with `rows`; the caller owns the transaction
fn replace_table<T>(
    connection: &Connection,
    table: &str,
    columns: &str,
    insert_sql: &str,
    rows: &[T],
    insert: impl Fn(&mut duckdb::Statement<'_>, &T) -> duckdb::Result<usize>,
) -> StorageResult<usize> {
    connection.execute_batch(&format!("DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});"))?;
    let mut statement = connection.prepare(insert_sql)?;
    for row in rows {
        insert(&mut statement, row)?;
    }
    log::info!("Saved {} rows to {}", rows.len(), table);
    Ok(rows.len())
}

fn write_asset_prices(connection: &Connection, rows: &[PricePoint]) -> StorageResult<usize> {
    replace_table(
        connection,
        ASSET_PRICES_TABLE,
        "date DATE, asset_id VARCHAR, price DOUBLE, volume DOUBLE",
        &format!("INSERT INTO {ASSET_PRICES_TABLE} VALUES (CAST(? AS DATE), ?, ?, ?)"),
        rows,
        |statement, row| statement.execute(params![date_param(row.date), row.asset_id, row.price, row.volume]),
    )
}

fn write_regional_data(connection: &Connection, rows: &[RegionalPoint]) -> StorageResult<usize> {
    replace_table(
        connection,
        REGIONAL_DATA_TABLE,
        "date DATE, region_id VARCHAR, stock_index DOUBLE, currency_strength DOUBLE, bond_yield DOUBLE",
        &format!("INSERT INTO {REGIONAL_DATA_TABLE} VALUES (CAST(? AS DATE), ?, ?, ?, ?)"),
        rows,
        |statement, row| {
            statement.execute(params![
                date_param(row.date),
                row.region_id,
                row.stock_index,
                row.currency_strength,
                row.bond_yield
            ])
        },
    )
}

fn write_flow_data(connection: &Connection, rows: &[FlowRecord]) -> StorageResult<usize> {
    replace_table(
        connection,
        FLOW_DATA_TABLE,
        "date DATE, source VARCHAR, target VARCHAR, amount DOUBLE, asset_type VARCHAR",
        &format!("INSERT INTO {FLOW_DATA_TABLE} VALUES (CAST(? AS DATE), ?, ?, ?, ?)"),
        rows,
        |statement, row| {
            statement.execute(params![
                date_param(row.date),
                row.source,
                row.target,
                row.amount,
                row.asset_class.as_str()
            ])
        },
    )
}

fn read_asset_prices(connection: &Connection) -> StorageResult<Option<Vec<PricePoint>>> {
    if !table_exists(connection, ASSET_PRICES_TABLE)? {
        return Ok(None);
    }
    let mut statement = connection.prepare(&format!(
        "SELECT CAST(date AS VARCHAR), asset_id, price, volume FROM {ASSET_PRICES_TABLE} ORDER BY date, rowid"
    ))?;
    let raw = statement
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?, row.get::<_, f64>(3)?))
        })?
        .collect::<duckdb::Result<Vec<_>>>()?;

    let rows = raw
        .into_iter()
        .map(|(date, asset_id, price, volume)| {
            Ok(PricePoint {
                date: parse_date(&date)?,
                asset_id,
                price,
                volume,
            })
        })
        .collect::<StorageResult<Vec<_>>>()?;
    log::info!("Loaded {} asset price records", rows.len());
    Ok(Some(rows))
}

fn read_regional_data(connection: &Connection) -> StorageResult<Option<Vec<RegionalPoint>>> {
    if !table_exists(connection, REGIONAL_DATA_TABLE)? {
        return Ok(None);
    }
    let mut statement = connection.prepare(&format!(
        "SELECT CAST(date AS VARCHAR), region_id, stock_index, currency_strength, bond_yield \
         FROM {REGIONAL_DATA_TABLE} ORDER BY date, rowid"
    ))?;
    let raw = statement
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?
        .collect::<duckdb::Result<Vec<_>>>()?;

    let rows = raw
        .into_iter()
        .map(|(date, region_id, stock_index, currency_strength, bond_yield)| {
            Ok(RegionalPoint {
                date: parse_date(&date)?,
                region_id,
                stock_index,
                currency_strength,
                bond_yield,
            })
        })
        .collect::<StorageResult<Vec<_>>>()?;
    log::info!("Loaded {} regional data records", rows.len());
    Ok(Some(rows))
}

fn read_flow_data(connection: &Connection) -> StorageResult<Option<Vec<FlowRecord>>> {
    if !table_exists(connection, FLOW_DATA_TABLE)? {
        return Ok(None);
    }
    let mut statement = connection.prepare(&format!(
        "SELECT CAST(date AS VARCHAR), source, target, amount, asset_type FROM {FLOW_DATA_TABLE} ORDER BY date, rowid"
    ))?;
    let raw = statement
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<duckdb::Result<Vec<_>>>()?;

    let rows = raw
        .into_iter()
        .map(|(date, source, target, amount, asset_type)| {
            Ok(FlowRecord {
                date: parse_date(&date)?,
                source,
                target,
                asset_class: AssetClass::parse_or_default(&asset_type),
                amount,
            })
        })
        .collect::<StorageResult<Vec<_>>>()?;
    log::info!("Loaded {} flow data records", rows.len());
    Ok(Some(rows))
}

fn finalize_transaction<T>(connection: &Connection, result: StorageResult<T>) -> StorageResult<T> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(value: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| StorageError::InvalidData(format!("bad date '{}': {}", value, e)))
}
