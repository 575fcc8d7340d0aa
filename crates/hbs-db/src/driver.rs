//! Database capability traits and the PostgreSQL driver
//!
//! The gateway consumes the database through [`Driver`] /
//! [`DriverConnection`] so engine code and tests share one seam.
//! [`PgDriver`] is the production implementation over a single sqlx
//! `PgConnection`, mapping native errors into [`DbErrorKind`]s.

use async_trait::async_trait;
use hbs_common::config::DbProfile;
use sqlx::postgres::PgRow;
use sqlx::{Column, Connection, PgConnection, Row as SqlxRow, TypeInfo};
use tracing::debug;

use crate::error::{DbError, DbErrorKind};
use crate::value::{Row, SqlValue};

/// Opens connections for the gateway
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, profile: &DbProfile) -> Result<Box<dyn DriverConnection>, DbError>;
}

/// One live database connection
#[async_trait]
pub trait DriverConnection: Send {
    /// Run a statement with `$n` placeholders, binding `params` in order
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError>;
}

/// PostgreSQL driver over sqlx
pub struct PgDriver;

#[async_trait]
impl Driver for PgDriver {
    async fn connect(&self, profile: &DbProfile) -> Result<Box<dyn DriverConnection>, DbError> {
        debug!(
            "Connecting to database {} at {}:{}",
            profile.database, profile.host, profile.port
        );
        let conn = PgConnection::connect(&profile.connection_url())
            .await
            .map_err(map_sqlx_error)?;
        Ok(Box::new(PgDriverConnection { conn }))
    }
}

struct PgDriverConnection {
    conn: PgConnection,
}

#[async_trait]
impl DriverConnection for PgDriverConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                SqlValue::Null => query.bind(Option::<String>::None),
                SqlValue::Bool(v) => query.bind(*v),
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::Float(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.clone()),
                SqlValue::Date(v) => query.bind(*v),
            };
        }

        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &PgRow) -> Result<Row, DbError> {
    let mut columns = Vec::with_capacity(row.columns().len());
    let mut values = Vec::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, idx, column.type_info().name())?);
    }
    Ok(Row::new(columns, values))
}

fn decode_value(row: &PgRow, idx: usize, type_name: &str) -> Result<SqlValue, DbError> {
    let value = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .map_err(map_sqlx_error)?
            .map(SqlValue::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map_err(map_sqlx_error)?
            .map(|v| SqlValue::Int(i64::from(v))),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map_err(map_sqlx_error)?
            .map(|v| SqlValue::Int(i64::from(v))),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .map_err(map_sqlx_error)?
            .map(SqlValue::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map_err(map_sqlx_error)?
            .map(|v| SqlValue::Float(f64::from(v))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .map_err(map_sqlx_error)?
            .map(SqlValue::Float),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .map_err(map_sqlx_error)?
            .map(SqlValue::Date),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .map_err(map_sqlx_error)?
            .map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Map a native sqlx error into the structured classification
///
/// SQLSTATE classes: 08xxx connection exceptions, 28xxx authentication,
/// 57P01-57P03 shutdown/crash, 57014 statement timeout.
fn map_sqlx_error(err: sqlx::Error) -> DbError {
    let kind = match &err {
        sqlx::Error::Io(_) | sqlx::Error::Protocol(_) => DbErrorKind::ConnectionReset,
        sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed | sqlx::Error::PoolClosed => {
            DbErrorKind::ConnectionClosed
        },
        sqlx::Error::PoolTimedOut => DbErrorKind::Timeout,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(code) if code.starts_with("28") => DbErrorKind::LoginFailed,
            Some(code) if code.starts_with("08") => DbErrorKind::ConnectionClosed,
            Some("57P01") | Some("57P02") | Some("57P03") => DbErrorKind::ConnectionClosed,
            Some("57014") => DbErrorKind::Timeout,
            _ => DbErrorKind::Query,
        },
        sqlx::Error::RowNotFound => DbErrorKind::Query,
        _ => DbErrorKind::Other,
    };
    DbError::driver(kind, err.to_string())
}
