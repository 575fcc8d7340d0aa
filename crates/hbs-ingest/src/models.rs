//! Normalized enquiry record graph
//!
//! One parsed XML payload becomes an [`EnquiryRecord`]: the parent header
//! plus its one-to-one children and the passenger list. The enquiry is the
//! aggregate root; child rows are owned by it and cascade-deleted with it
//! by the storage layer.

use chrono::NaiveDate;

/// Parent entity, keyed by the natural key `source_booking_id`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnquiryRecord {
    /// Natural key from the source system; unique, created exactly once
    pub source_booking_id: String,
    pub departure_date: Option<NaiveDate>,
    pub create_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub is_quote_only: bool,
    pub destination_name: Option<String>,
    pub destination_country: Option<String>,
    pub airport: Option<String>,
    pub source_type: Option<String>,

    pub trip: TripDetails,
    pub contact: CustomerContact,
    pub marketing: Marketing,
    pub passengers: Vec<Passenger>,
}

/// One-to-one child: trip facts extracted from the free-text comment
///
/// Numeric sub-fields that fail to parse are absent, never zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripDetails {
    pub nights: Option<i64>,
    pub board: Option<String>,
    pub adults: Option<i64>,
    pub children: Option<i64>,
    pub budget_from: Option<f64>,
    pub budget_to: Option<f64>,
}

/// One-to-one child: who raised the enquiry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerContact {
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// One-to-one child: attribution data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Marketing {
    pub source: Option<String>,
    pub campaign: Option<String>,
    pub opt_in: bool,
}

/// One-to-many child, identified within an enquiry by the lower-cased
/// (given name, surname) pair
#[derive(Debug, Clone, PartialEq)]
pub struct Passenger {
    pub given_name: String,
    pub surname: String,
}

impl Passenger {
    /// The composite natural key used for additive-only reconciliation
    pub fn natural_key(&self) -> (String, String) {
        (
            self.given_name.to_lowercase(),
            self.surname.to_lowercase(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passenger_natural_key_is_lowercased() {
        let p = Passenger {
            given_name: "JOHN".to_string(),
            surname: "McAllister".to_string(),
        };
        assert_eq!(
            p.natural_key(),
            ("john".to_string(), "mcallister".to_string())
        );
    }
}
