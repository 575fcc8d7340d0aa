//! Ingestion engine
//!
//! Reconciles one parsed enquiry against existing storage: exactly-once
//! creation of the parent keyed by source booking id, update-or-insert for
//! the one-to-one children, and insert-only-if-absent for passengers.
//!
//! `ingest` fails closed: any parse or database error yields `false` and a
//! log line so a caller processing a batch of files can continue. Partial
//! writes are not rolled back here; the natural-key lookups make a rerun
//! safe.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use hbs_common::format::format_duration;
use hbs_db::{DbGateway, SqlValue};

use crate::models::{CustomerContact, EnquiryRecord, Marketing, Passenger, TripDetails};
use crate::parser::parse_enquiry;
use crate::schema;

/// Longest error text emitted to the log channel
const MAX_ERROR_LEN: usize = 300;

/// XML-to-relational ingestion engine
pub struct IngestEngine {
    gateway: Arc<DbGateway>,
    schema_ready: AtomicBool,
}

impl IngestEngine {
    pub fn new(gateway: Arc<DbGateway>) -> Self {
        Self {
            gateway,
            schema_ready: AtomicBool::new(false),
        }
    }

    /// Ingest one XML payload
    ///
    /// Returns whether the parent enquiry was newly created — the caller's
    /// proxy for "this file represents a new business event". Never raises;
    /// a failure is logged and reported as `false`.
    pub async fn ingest(&self, xml: &str, source_file_name: &str) -> bool {
        let started = Instant::now();
        match self.ingest_inner(xml).await {
            Ok(newly_created) => {
                info!(
                    "Ingested {} in {} ({})",
                    source_file_name,
                    format_duration(started.elapsed()),
                    if newly_created { "new enquiry" } else { "existing enquiry" }
                );
                newly_created
            },
            Err(e) => {
                error!(
                    "Ingestion of {} failed after {}: {}",
                    source_file_name,
                    format_duration(started.elapsed()),
                    truncate_error(&format!("{e:#}"))
                );
                false
            },
        }
    }

    async fn ingest_inner(&self, xml: &str) -> Result<bool> {
        let record = parse_enquiry(xml)?;
        self.ensure_schema().await?;

        let (enquiry_id, newly_created) = self.upsert_enquiry(&record).await?;
        self.upsert_trip_details(enquiry_id, &record.trip).await?;
        self.upsert_contact(enquiry_id, &record.contact).await?;
        self.upsert_marketing(enquiry_id, &record.marketing).await?;
        self.insert_new_passengers(enquiry_id, &record.passengers)
            .await?;

        Ok(newly_created)
    }

    /// Create the schema once per engine lifetime; later calls are no-ops
    async fn ensure_schema(&self) -> Result<()> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        schema::ensure_schema(&self.gateway)
            .await
            .context("Failed to ensure target schema")?;
        self.schema_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Look up the enquiry by natural key, inserting it when absent
    ///
    /// Returns the enquiry id and whether this call created it.
    async fn upsert_enquiry(&self, record: &EnquiryRecord) -> Result<(i64, bool)> {
        let existing = self
            .gateway
            .execute(
                "SELECT id FROM enquiries WHERE source_booking_id = ?",
                &[SqlValue::from(record.source_booking_id.as_str())],
            )
            .await?;

        if let Some(row) = existing.first() {
            return Ok((row.get_i64("id")?, false));
        }

        let rows = self
            .gateway
            .execute(
                "INSERT INTO enquiries (source_booking_id, departure_date, create_date, \
                 status, is_quote_only, destination_name, destination_country, airport, \
                 source_type) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
                &[
                    SqlValue::from(record.source_booking_id.as_str()),
                    SqlValue::from(record.departure_date),
                    SqlValue::from(record.create_date),
                    SqlValue::from(record.status.clone()),
                    SqlValue::from(record.is_quote_only),
                    SqlValue::from(record.destination_name.clone()),
                    SqlValue::from(record.destination_country.clone()),
                    SqlValue::from(record.airport.clone()),
                    SqlValue::from(record.source_type.clone()),
                ],
            )
            .await?;

        let id = rows
            .first()
            .context("Enquiry insert returned no identity row")?
            .get_i64("id")?;
        Ok((id, true))
    }

    async fn upsert_trip_details(&self, enquiry_id: i64, trip: &TripDetails) -> Result<()> {
        let values = [
            SqlValue::from(trip.nights),
            SqlValue::from(trip.board.clone()),
            SqlValue::from(trip.adults),
            SqlValue::from(trip.children),
            SqlValue::from(trip.budget_from),
            SqlValue::from(trip.budget_to),
        ];
        self.upsert_child(
            enquiry_id,
            "SELECT id FROM trip_details WHERE enquiry_id = ?",
            "UPDATE trip_details SET nights = ?, board = ?, adults = ?, children = ?, \
             budget_from = ?, budget_to = ? WHERE enquiry_id = ?",
            "INSERT INTO trip_details (enquiry_id, nights, board, adults, children, \
             budget_from, budget_to) VALUES (?, ?, ?, ?, ?, ?, ?)",
            &values,
        )
        .await
    }

    async fn upsert_contact(&self, enquiry_id: i64, contact: &CustomerContact) -> Result<()> {
        let values = [
            SqlValue::from(contact.title.clone()),
            SqlValue::from(contact.first_name.clone()),
            SqlValue::from(contact.surname.clone()),
            SqlValue::from(contact.email.clone()),
            SqlValue::from(contact.phone.clone()),
        ];
        self.upsert_child(
            enquiry_id,
            "SELECT id FROM customer_contacts WHERE enquiry_id = ?",
            "UPDATE customer_contacts SET title = ?, first_name = ?, surname = ?, \
             email = ?, phone = ? WHERE enquiry_id = ?",
            "INSERT INTO customer_contacts (enquiry_id, title, first_name, surname, \
             email, phone) VALUES (?, ?, ?, ?, ?, ?)",
            &values,
        )
        .await
    }

    async fn upsert_marketing(&self, enquiry_id: i64, marketing: &Marketing) -> Result<()> {
        let values = [
            SqlValue::from(marketing.source.clone()),
            SqlValue::from(marketing.campaign.clone()),
            SqlValue::from(marketing.opt_in),
        ];
        self.upsert_child(
            enquiry_id,
            "SELECT id FROM marketing WHERE enquiry_id = ?",
            "UPDATE marketing SET source = ?, campaign = ?, opt_in = ? WHERE enquiry_id = ?",
            "INSERT INTO marketing (enquiry_id, source, campaign, opt_in) VALUES (?, ?, ?, ?)",
            &values,
        )
        .await
    }

    /// Update a one-to-one child if a row exists for the enquiry, else insert
    ///
    /// The update statement binds `values` then the enquiry id; the insert
    /// binds the enquiry id then `values`.
    async fn upsert_child(
        &self,
        enquiry_id: i64,
        select_sql: &str,
        update_sql: &str,
        insert_sql: &str,
        values: &[SqlValue],
    ) -> Result<()> {
        let existing = self
            .gateway
            .execute(select_sql, &[SqlValue::Int(enquiry_id)])
            .await?;

        if existing.is_empty() {
            let mut params = vec![SqlValue::Int(enquiry_id)];
            params.extend_from_slice(values);
            self.gateway.execute(insert_sql, &params).await?;
        } else {
            let mut params = values.to_vec();
            params.push(SqlValue::Int(enquiry_id));
            self.gateway.execute(update_sql, &params).await?;
        }
        Ok(())
    }

    /// Insert only passengers whose lower-cased name pair is not yet present
    ///
    /// Existing passengers are never updated or removed.
    async fn insert_new_passengers(
        &self,
        enquiry_id: i64,
        passengers: &[Passenger],
    ) -> Result<()> {
        let rows = self
            .gateway
            .execute(
                "SELECT given_name, surname FROM passengers WHERE enquiry_id = ?",
                &[SqlValue::Int(enquiry_id)],
            )
            .await?;

        let mut known: HashSet<(String, String)> = rows
            .iter()
            .filter_map(|row| {
                let given = row.get_str("given_name").ok()?;
                let surname = row.get_str("surname").ok()?;
                Some((given.to_lowercase(), surname.to_lowercase()))
            })
            .collect();

        for passenger in passengers {
            if !known.insert(passenger.natural_key()) {
                continue;
            }
            self.gateway
                .execute(
                    "INSERT INTO passengers (enquiry_id, given_name, surname) VALUES (?, ?, ?)",
                    &[
                        SqlValue::Int(enquiry_id),
                        SqlValue::from(passenger.given_name.as_str()),
                        SqlValue::from(passenger.surname.as_str()),
                    ],
                )
                .await?;
        }
        Ok(())
    }
}

fn truncate_error(text: &str) -> String {
    if text.len() <= MAX_ERROR_LEN {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .take_while(|(i, _)| *i < MAX_ERROR_LEN)
        .last()
        .map_or(0, |(i, c)| i + c.len_utf8());
    format!("{}...", &text[..cut])
}
