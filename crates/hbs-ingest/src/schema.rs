//! Target schema
//!
//! Five tables: the enquiries parent (unique natural key) and four children
//! keyed by enquiry id. Children are exclusively owned by their enquiry and
//! cascade-deleted with it. All statements are idempotent so the migration
//! step can run on every startup.

use hbs_db::{DbError, DbGateway};
use tracing::debug;

/// Idempotent schema statements, executed in order
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS enquiries (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        source_booking_id TEXT NOT NULL UNIQUE,
        departure_date DATE,
        create_date DATE,
        status TEXT,
        is_quote_only BOOLEAN NOT NULL DEFAULT FALSE,
        destination_name TEXT,
        destination_country TEXT,
        airport TEXT,
        source_type TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS trip_details (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        enquiry_id BIGINT NOT NULL UNIQUE REFERENCES enquiries(id) ON DELETE CASCADE,
        nights BIGINT,
        board TEXT,
        adults BIGINT,
        children BIGINT,
        budget_from DOUBLE PRECISION,
        budget_to DOUBLE PRECISION
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS customer_contacts (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        enquiry_id BIGINT NOT NULL UNIQUE REFERENCES enquiries(id) ON DELETE CASCADE,
        title TEXT,
        first_name TEXT,
        surname TEXT,
        email TEXT,
        phone TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS marketing (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        enquiry_id BIGINT NOT NULL UNIQUE REFERENCES enquiries(id) ON DELETE CASCADE,
        source TEXT,
        campaign TEXT,
        opt_in BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS passengers (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        enquiry_id BIGINT NOT NULL REFERENCES enquiries(id) ON DELETE CASCADE,
        given_name TEXT NOT NULL,
        surname TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_passengers_enquiry_id ON passengers (enquiry_id)",
];

/// Create the five tables and supporting index if absent
pub async fn ensure_schema(gateway: &DbGateway) -> Result<(), DbError> {
    for statement in SCHEMA_STATEMENTS {
        gateway.execute(statement, &[]).await?;
    }
    debug!("Schema is present");
    Ok(())
}
