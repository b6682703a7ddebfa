//! Destinations for logged samples.

use crate::types::Sample;

use chrono::{DateTime, Local};

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One logged measurement
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    /// wall clock time the sample was taken
    pub timestamp: DateTime<Local>,
    /// temperature in the unit the logger was configured with
    pub temperature: f32,
    /// relative humidity in percent
    pub humidity: f32,
}
impl LogRecord {
    /// Record for a sample taken at `timestamp`
    pub fn new(sample: &Sample, timestamp: DateTime<Local>) -> Self {
        Self { timestamp, temperature: sample.temperature(), humidity: sample.humidity_percent }
    }

    /// `time,temperature,humidity` line without the newline
    pub fn to_csv(&self) -> String {
        format!("{},{:.3},{:.3}", self.timestamp.format(TIME_FORMAT), self.temperature, self.humidity)
    }
}

/// Failure to persist a record
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// file could not be opened or written
    #[error("log file: {0}")]
    Io(#[from] io::Error),
    /// the database rejected the statement or the connection failed
    #[error("database: {0}")]
    Database(String),
    /// table name is not a plain SQL identifier
    #[error("invalid table name {0:?}")]
    InvalidTableName(String),
}

/// Append-only destination for log records
pub trait Sink {
    /// Persist one record
    fn append(&mut self, record: &LogRecord) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn append(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }
}

/// Appends one CSV line per record to a file, creating it on first write
///
/// The file is reopened for every record so external rotation is picked up.
#[derive(Clone, Debug)]
pub struct FileSink {
    path: PathBuf,
}
impl FileSink {
    /// Sink writing to `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
impl Sink for FileSink {
    fn append(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", record.to_csv())?;
        Ok(())
    }
}

/// Statement execution on an established database connection
///
/// Implement this over the client library of your database; credentials stay with it.
pub trait SqlConnection {
    /// Driver error
    type Error: fmt::Display;
    /// Execute a statement that returns no rows
    fn execute(&mut self, statement: &str) -> Result<(), Self::Error>;
}

/// Where the SQL sink writes
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SqlTarget {
    /// database host
    pub host: String,
    /// database port
    pub port: u16,
    /// database name
    pub database: String,
    /// table receiving `(time, temp, rh)` rows
    pub table: String,
}
impl Default for SqlTarget {
    fn default() -> Self {
        Self { host: String::from("localhost"), port: 3306, database: String::new(), table: String::new() }
    }
}
impl SqlTarget {
    /// Open a connection with `connect` and wrap it in a sink for this target's table
    pub fn connect<C, F>(&self, connect: F) -> Result<SqlSink<C>, SinkError>
    where
        C: SqlConnection,
        F: FnOnce(&SqlTarget) -> Result<C, C::Error>,
    {
        validate_table(&self.table)?;
        let connection = connect(self).map_err(|e| SinkError::Database(e.to_string()))?;
        SqlSink::new(connection, self.table.clone())
    }
}

fn validate_table(table: &str) -> Result<(), SinkError> {
    let valid_part = |part: &str| {
        part.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match table.split_once('.') {
        Some((schema, name)) if valid_part(schema) && valid_part(name) => Ok(()),
        None if valid_part(table) => Ok(()),
        _ => Err(SinkError::InvalidTableName(table.to_string())),
    }
}

/// Inserts one `(time, temp, rh)` row per record
#[derive(Debug)]
pub struct SqlSink<C> {
    connection: C,
    table: String,
}
impl<C: SqlConnection> SqlSink<C> {
    /// Sink over an open connection; `table` must be a plain, optionally schema-qualified name
    pub fn new(connection: C, table: impl Into<String>) -> Result<Self, SinkError> {
        let table = table.into();
        validate_table(&table)?;
        Ok(Self { connection, table })
    }

    /// Release the connection
    pub fn into_inner(self) -> C {
        self.connection
    }

    pub(crate) fn insert_statement(&self, record: &LogRecord) -> String {
        format!(
            "INSERT INTO {} (time, temp, rh) VALUES ('{}',{:.3},{:.3})",
            self.table,
            record.timestamp.format(TIME_FORMAT),
            record.temperature,
            record.humidity
        )
    }
}
impl<C: SqlConnection> Sink for SqlSink<C> {
    fn append(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        let statement = self.insert_statement(record);
        self.connection.execute(&statement).map_err(|e| SinkError::Database(e.to_string()))
    }
}
