//! Ingestion of booking enquiry XML payloads
//!
//! Parses one XML payload into a normalized enquiry record graph (header,
//! trip details, contact, marketing, passenger list) and reconciles it
//! against the relational store using natural keys: exactly-once creation
//! of the parent enquiry, upsert for one-to-one children, additive-only
//! inserts for passengers.

pub mod engine;
pub mod models;
pub mod parser;
pub mod schema;

pub use engine::IngestEngine;
pub use models::{CustomerContact, EnquiryRecord, Marketing, Passenger, TripDetails};
pub use parser::parse_enquiry;
