//! Positional values and row sets shared by the gateway and its callers

use chrono::NaiveDate;

use crate::error::DbError;

/// A value bound to a positional placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row, column names paired with decoded values
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Raw value of a column, if present
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, DbError> {
        match self.get(column) {
            Some(SqlValue::Int(v)) => Ok(*v),
            _ => Err(DbError::ColumnType {
                column: column.to_string(),
            }),
        }
    }

    pub fn get_str(&self, column: &str) -> Result<&str, DbError> {
        match self.get(column) {
            Some(SqlValue::Text(v)) => Ok(v),
            _ => Err(DbError::ColumnType {
                column: column.to_string(),
            }),
        }
    }

    pub fn get_bool(&self, column: &str) -> Result<bool, DbError> {
        match self.get(column) {
            Some(SqlValue::Bool(v)) => Ok(*v),
            _ => Err(DbError::ColumnType {
                column: column.to_string(),
            }),
        }
    }

    /// Text value, or `None` when the column is SQL NULL
    pub fn get_opt_str(&self, column: &str) -> Result<Option<&str>, DbError> {
        match self.get(column) {
            Some(SqlValue::Text(v)) => Ok(Some(v)),
            Some(SqlValue::Null) => Ok(None),
            _ => Err(DbError::ColumnType {
                column: column.to_string(),
            }),
        }
    }
}
