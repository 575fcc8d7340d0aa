//! Database gateway
//!
//! A construct-once, pass-down handle around a single cached connection.
//! Statements use `?` positional markers which are translated left to right
//! into `$1..$n` before execution. A connection-class failure triggers one
//! reconnect with the last-used profile and one re-issue of the identical
//! statement and bindings; a second failure propagates.

use hbs_common::config::DbProfile;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::driver::{Driver, DriverConnection};
use crate::error::DbError;
use crate::value::{Row, SqlValue};

struct GatewayState {
    conn: Option<Box<dyn DriverConnection>>,
    profile: Option<DbProfile>,
}

/// Shared database gateway
///
/// Only one logical connection exists at a time. All execution goes through
/// an async mutex, so a reconnect fully replaces the shared handle before
/// any retried query is issued; concurrent callers never observe a
/// half-closed connection.
pub struct DbGateway {
    driver: Arc<dyn Driver>,
    state: Mutex<GatewayState>,
}

impl DbGateway {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            state: Mutex::new(GatewayState {
                conn: None,
                profile: None,
            }),
        }
    }

    /// Establish (or reuse) the cached connection for `profile`
    ///
    /// The cached handle is reused when the logical profile is unchanged;
    /// a different profile (e.g. an override to a secondary database)
    /// forces a fresh connection.
    pub async fn connect(&self, profile: &DbProfile) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        if state.conn.is_some() && state.profile.as_ref() == Some(profile) {
            debug!("Reusing cached connection to {}", profile.database);
            return Ok(());
        }

        info!(
            "Opening connection to {} at {}:{}",
            profile.database, profile.host, profile.port
        );
        let conn = self.driver.connect(profile).await?;
        state.conn = Some(conn);
        state.profile = Some(profile.clone());
        Ok(())
    }

    /// Execute a statement with positional `?` markers
    pub async fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        self.execute_with_retry(statement, params, true).await
    }

    /// Execute, optionally allowing the single reconnect-and-retry
    pub async fn execute_with_retry(
        &self,
        statement: &str,
        params: &[SqlValue],
        allow_retry: bool,
    ) -> Result<Vec<Row>, DbError> {
        let sql = translate_placeholders(statement);
        let expects_rows = has_returning_clause(statement);

        let mut state = self.state.lock().await;
        let mut retried = false;

        loop {
            let conn = state.conn.as_mut().ok_or(DbError::NotConnected)?;
            debug!(retried, "Executing: {}", sql);

            match conn.query(&sql, params).await {
                Ok(rows) => {
                    debug!("Statement returned {} row(s)", rows.len());
                    // An OUTPUT/RETURNING statement yielding nothing means a
                    // misconfigured identity clause, not a success.
                    if expects_rows && rows.is_empty() {
                        return Err(DbError::NoRowsReturned);
                    }
                    return Ok(rows);
                },
                Err(e) => {
                    warn!("Statement failed ({:?}): {}", e.kind(), e);
                    if allow_retry && !retried && e.kind().is_connection() {
                        retried = true;
                        let profile = state.profile.clone().ok_or(DbError::NotConnected)?;
                        // Discard the half-closed handle before reconnecting
                        // with the last-used profile, overrides included.
                        state.conn = None;
                        info!("Reconnecting after connection-class failure");
                        let conn = self.driver.connect(&profile).await?;
                        state.conn = Some(conn);
                        continue;
                    }
                    return Err(e);
                },
            }
        }
    }
}

/// Translate `?` markers into `$1..$n`, left to right
///
/// Markers inside single-quoted string literals are left untouched.
pub fn translate_placeholders(statement: &str) -> String {
    let mut out = String::with_capacity(statement.len() + 8);
    let mut index = 0usize;
    let mut in_literal = false;

    for ch in statement.chars() {
        match ch {
            '\'' => {
                in_literal = !in_literal;
                out.push(ch);
            },
            '?' if !in_literal => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            },
            _ => out.push(ch),
        }
    }

    out
}

fn has_returning_clause(statement: &str) -> bool {
    statement
        .split_whitespace()
        .any(|word| word.eq_ignore_ascii_case("RETURNING"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use crate::error::DbErrorKind;

    fn profile(database: &str) -> DbProfile {
        DbProfile {
            host: "localhost".to_string(),
            port: 5432,
            database: database.to_string(),
            username: "hbs".to_string(),
            password: "secret".to_string(),
        }
    }

    type Scripted = Result<Vec<Row>, DbError>;

    /// Driver whose connections pop pre-scripted results and record every
    /// statement they were asked to run.
    struct FakeDriver {
        script: Arc<StdMutex<VecDeque<Scripted>>>,
        executed: Arc<StdMutex<Vec<(String, Vec<SqlValue>)>>>,
        connects: Arc<AtomicUsize>,
    }

    impl FakeDriver {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Arc::new(StdMutex::new(script.into())),
                executed: Arc::new(StdMutex::new(Vec::new())),
                connects: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    struct FakeConnection {
        script: Arc<StdMutex<VecDeque<Scripted>>>,
        executed: Arc<StdMutex<Vec<(String, Vec<SqlValue>)>>>,
    }

    #[async_trait]
    impl Driver for FakeDriver {
        async fn connect(&self, _profile: &DbProfile) -> Result<Box<dyn DriverConnection>, DbError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeConnection {
                script: Arc::clone(&self.script),
                executed: Arc::clone(&self.executed),
            }))
        }
    }

    #[async_trait]
    impl DriverConnection for FakeConnection {
        async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
            self.executed
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn conn_err() -> DbError {
        DbError::driver(DbErrorKind::ConnectionReset, "connection reset by peer")
    }

    fn id_row(id: i64) -> Row {
        Row::new(vec!["id".into()], vec![SqlValue::Int(id)])
    }

    #[test]
    fn test_translate_three_markers() {
        assert_eq!(
            translate_placeholders("INSERT INTO t (a, b, c) VALUES (?, ?, ?)"),
            "INSERT INTO t (a, b, c) VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn test_translate_skips_quoted_literals() {
        assert_eq!(
            translate_placeholders("SELECT '?' AS q, a FROM t WHERE b = ?"),
            "SELECT '?' AS q, a FROM t WHERE b = $1"
        );
    }

    #[test]
    fn test_translate_no_markers() {
        assert_eq!(translate_placeholders("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_has_returning_clause() {
        assert!(has_returning_clause("INSERT INTO t (a) VALUES (?) RETURNING id"));
        assert!(has_returning_clause("insert into t (a) values (?) returning id"));
        assert!(!has_returning_clause("SELECT returning_stats FROM t"));
    }

    #[tokio::test]
    async fn test_markers_bind_positionally() {
        let driver = FakeDriver::new(vec![Ok(vec![])]);
        let executed = Arc::clone(&driver.executed);
        let gateway = DbGateway::new(Arc::new(driver));
        gateway.connect(&profile("bookings")).await.unwrap();

        let params = vec![
            SqlValue::Int(1),
            SqlValue::Text("two".into()),
            SqlValue::Bool(true),
        ];
        gateway
            .execute("INSERT INTO t (a, b, c) VALUES (?, ?, ?)", &params)
            .await
            .unwrap();

        let executed = executed.lock().unwrap();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].0, "INSERT INTO t (a, b, c) VALUES ($1, $2, $3)");
        assert_eq!(executed[0].1, params);
    }

    #[tokio::test]
    async fn test_connection_failure_retries_exactly_once_then_succeeds() {
        let driver = FakeDriver::new(vec![Err(conn_err()), Ok(vec![id_row(5)])]);
        let executed = Arc::clone(&driver.executed);
        let connects = Arc::clone(&driver.connects);
        let gateway = DbGateway::new(Arc::new(driver));
        gateway.connect(&profile("bookings")).await.unwrap();

        let rows = gateway
            .execute("SELECT id FROM t WHERE a = ?", &[SqlValue::Int(1)])
            .await
            .unwrap();
        assert_eq!(rows[0].get_i64("id").unwrap(), 5);

        // One initial connect, one reconnect; same statement both times.
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        let executed = executed.lock().unwrap();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0], executed[1]);
    }

    #[tokio::test]
    async fn test_second_connection_failure_propagates() {
        let driver = FakeDriver::new(vec![Err(conn_err()), Err(conn_err()), Ok(vec![])]);
        let executed = Arc::clone(&driver.executed);
        let gateway = DbGateway::new(Arc::new(driver));
        gateway.connect(&profile("bookings")).await.unwrap();

        let err = gateway.execute("SELECT 1", &[]).await.unwrap_err();
        assert!(err.kind().is_connection());
        // Retried at most once: the third scripted result stays unused.
        assert_eq!(executed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_query_error_is_not_retried() {
        let driver = FakeDriver::new(vec![
            Err(DbError::driver(DbErrorKind::Query, "syntax error")),
            Ok(vec![]),
        ]);
        let executed = Arc::clone(&driver.executed);
        let gateway = DbGateway::new(Arc::new(driver));
        gateway.connect(&profile("bookings")).await.unwrap();

        let err = gateway.execute("SELEC 1", &[]).await.unwrap_err();
        assert_eq!(err.kind(), DbErrorKind::Query);
        assert_eq!(executed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_can_be_disabled() {
        let driver = FakeDriver::new(vec![Err(conn_err()), Ok(vec![])]);
        let executed = Arc::clone(&driver.executed);
        let gateway = DbGateway::new(Arc::new(driver));
        gateway.connect(&profile("bookings")).await.unwrap();

        let err = gateway
            .execute_with_retry("SELECT 1", &[], false)
            .await
            .unwrap_err();
        assert!(err.kind().is_connection());
        assert_eq!(executed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_returning_with_zero_rows_is_an_error() {
        let driver = FakeDriver::new(vec![Ok(vec![])]);
        let gateway = DbGateway::new(Arc::new(driver));
        gateway.connect(&profile("bookings")).await.unwrap();

        let err = gateway
            .execute("INSERT INTO t (a) VALUES (?) RETURNING id", &[SqlValue::Int(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NoRowsReturned));
    }

    #[tokio::test]
    async fn test_same_profile_reuses_cached_connection() {
        let driver = FakeDriver::new(vec![]);
        let connects = Arc::clone(&driver.connects);
        let gateway = DbGateway::new(Arc::new(driver));

        gateway.connect(&profile("bookings")).await.unwrap();
        gateway.connect(&profile("bookings")).await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_profile_override_forces_fresh_connection() {
        let driver = FakeDriver::new(vec![]);
        let connects = Arc::clone(&driver.connects);
        let gateway = DbGateway::new(Arc::new(driver));

        gateway.connect(&profile("bookings")).await.unwrap();
        gateway.connect(&profile("reports")).await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_execute_without_connect_fails() {
        let driver = FakeDriver::new(vec![]);
        let gateway = DbGateway::new(Arc::new(driver));
        let err = gateway.execute("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::NotConnected));
    }
}
