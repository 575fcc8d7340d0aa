//! Enquiry XML payload parser
//!
//! Decodes the fixed payload shape with quick-xml/serde, then post-processes
//! the free-text comment field: pipe-delimited `key: value` or `key value`
//! pairs become a lower-cased-key lookup (last duplicate wins, values
//! HTML-entity-decoded), and a dedicated regex pulls the from-to budget
//! range out of the raw text independently of the key/value pass.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::models::{CustomerContact, EnquiryRecord, Marketing, Passenger, TripDetails};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEnquiry {
    booking_id: String,
    departure_date: Option<String>,
    create_date: Option<String>,
    status: Option<String>,
    quote_only: Option<String>,
    destination: Option<RawDestination>,
    source_type: Option<String>,
    comment: Option<String>,
    contact: Option<RawContact>,
    marketing: Option<RawMarketing>,
    passengers: Option<RawPassengers>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDestination {
    name: Option<String>,
    country: Option<String>,
    airport: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawContact {
    title: Option<String>,
    first_name: Option<String>,
    surname: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMarketing {
    source: Option<String>,
    campaign: Option<String>,
    opt_in: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPassengers {
    #[serde(default)]
    passenger: Vec<RawPassenger>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPassenger {
    first_name: Option<String>,
    surname: Option<String>,
}

/// Parse one XML payload into a normalized enquiry record
pub fn parse_enquiry(xml: &str) -> Result<EnquiryRecord> {
    let raw: RawEnquiry = quick_xml::de::from_str(xml).context("Failed to decode enquiry XML")?;

    if raw.booking_id.trim().is_empty() {
        anyhow::bail!("Enquiry payload has an empty BookingId");
    }

    let comment = raw.comment.as_deref().unwrap_or("");
    let fields = parse_comment_fields(comment);
    let (budget_from, budget_to) = extract_budget_range(comment);

    let trip = TripDetails {
        nights: parse_number(&fields, "nights"),
        board: fields.get("board").cloned(),
        adults: parse_number(&fields, "adults"),
        children: parse_number(&fields, "children"),
        budget_from,
        budget_to,
    };

    let contact = raw
        .contact
        .map(|c| CustomerContact {
            title: c.title,
            first_name: c.first_name,
            surname: c.surname,
            email: c.email,
            phone: c.phone,
        })
        .unwrap_or_default();

    let marketing = raw
        .marketing
        .map(|m| Marketing {
            source: m.source,
            campaign: m.campaign,
            opt_in: m.opt_in.as_deref().is_some_and(parse_flag),
        })
        .unwrap_or_default();

    let passengers = raw
        .passengers
        .map(|p| p.passenger)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| match (p.first_name, p.surname) {
            (Some(given_name), Some(surname))
                if !given_name.trim().is_empty() && !surname.trim().is_empty() =>
            {
                Some(Passenger {
                    given_name: given_name.trim().to_string(),
                    surname: surname.trim().to_string(),
                })
            },
            _ => None,
        })
        .collect();

    let (destination_name, destination_country, airport) = match raw.destination {
        Some(d) => (d.name, d.country, d.airport),
        None => (None, None, None),
    };

    Ok(EnquiryRecord {
        source_booking_id: raw.booking_id.trim().to_string(),
        departure_date: raw.departure_date.as_deref().and_then(parse_date),
        create_date: raw.create_date.as_deref().and_then(parse_date),
        status: raw.status,
        is_quote_only: raw.quote_only.as_deref().is_some_and(parse_flag),
        destination_name,
        destination_country,
        airport,
        source_type: raw.source_type,
        trip,
        contact,
        marketing,
        passengers,
    })
}

/// Break the pipe-delimited free text into a key lookup
///
/// Each segment is `key: value` or `key value`. Keys are lower-cased,
/// values HTML-entity-decoded. The last occurrence of a duplicate key wins.
pub fn parse_comment_fields(comment: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();

    for segment in comment.split('|') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (key, value) = match segment.split_once(':') {
            Some((key, value)) => (key, value),
            None => segment.split_once(char::is_whitespace).unwrap_or((segment, "")),
        };

        let key = key.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        let value = decode_entities(value.trim());
        fields.insert(key, value);
    }

    fields
}

/// Extract a "from-to" budget range from the raw free text
///
/// Accepts `1500 to 2000`, `1,500 - 2,000` and currency-prefixed forms.
/// Runs on the whole comment, independent of the key/value pass.
pub fn extract_budget_range(comment: &str) -> (Option<f64>, Option<f64>) {
    static BUDGET_RE: OnceLock<Regex> = OnceLock::new();
    let re = BUDGET_RE.get_or_init(|| {
        Regex::new(r"(?i)[£$€]?\s*(\d[\d,]*(?:\.\d+)?)\s*(?:-|–|to)\s*[£$€]?\s*(\d[\d,]*(?:\.\d+)?)")
            .expect("budget range regex is valid")
    });

    match re.captures(comment) {
        Some(caps) => (parse_amount(&caps[1]), parse_amount(&caps[2])),
        None => (None, None),
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

fn parse_number(fields: &HashMap<String, String>, key: &str) -> Option<i64> {
    fields.get(key).and_then(|v| v.trim().parse().ok())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "yes" | "1" | "y"
    )
}

fn decode_entities(value: &str) -> String {
    match quick_xml::escape::unescape(value) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <Enquiry>
            <BookingId>WEB-10042</BookingId>
            <DepartureDate>2026-09-15</DepartureDate>
            <CreateDate>2026-08-01</CreateDate>
            <Status>Open</Status>
            <QuoteOnly>false</QuoteOnly>
            <Destination>
                <Name>Algarve</Name>
                <Country>Portugal</Country>
                <Airport>FAO</Airport>
            </Destination>
            <SourceType>web</SourceType>
            <Comment>nights: 7 | board: all inclusive | budget: 1500 to 2000 | adults 2 | children 1</Comment>
            <Contact>
                <Title>Mrs</Title>
                <FirstName>Sarah</FirstName>
                <Surname>Hughes</Surname>
                <Email>sarah@example.com</Email>
                <Phone>07700 900123</Phone>
            </Contact>
            <Marketing>
                <Source>newsletter</Source>
                <Campaign>summer-26</Campaign>
                <OptIn>true</OptIn>
            </Marketing>
            <Passengers>
                <Passenger><FirstName>Sarah</FirstName><Surname>Hughes</Surname></Passenger>
                <Passenger><FirstName>Tom</FirstName><Surname>Hughes</Surname></Passenger>
            </Passengers>
        </Enquiry>"#;

    #[test]
    fn test_parse_full_payload() {
        let record = parse_enquiry(SAMPLE).unwrap();
        assert_eq!(record.source_booking_id, "WEB-10042");
        assert_eq!(
            record.departure_date,
            NaiveDate::from_ymd_opt(2026, 9, 15)
        );
        assert_eq!(record.status.as_deref(), Some("Open"));
        assert!(!record.is_quote_only);
        assert_eq!(record.destination_name.as_deref(), Some("Algarve"));
        assert_eq!(record.destination_country.as_deref(), Some("Portugal"));
        assert_eq!(record.airport.as_deref(), Some("FAO"));
        assert_eq!(record.source_type.as_deref(), Some("web"));

        assert_eq!(record.trip.nights, Some(7));
        assert_eq!(record.trip.board.as_deref(), Some("all inclusive"));
        assert_eq!(record.trip.adults, Some(2));
        assert_eq!(record.trip.children, Some(1));
        assert_eq!(record.trip.budget_from, Some(1500.0));
        assert_eq!(record.trip.budget_to, Some(2000.0));

        assert_eq!(record.contact.first_name.as_deref(), Some("Sarah"));
        assert_eq!(record.marketing.campaign.as_deref(), Some("summer-26"));
        assert!(record.marketing.opt_in);

        assert_eq!(record.passengers.len(), 2);
        assert_eq!(record.passengers[1].given_name, "Tom");
    }

    #[test]
    fn test_minimal_payload() {
        let record =
            parse_enquiry("<Enquiry><BookingId>X-1</BookingId></Enquiry>").unwrap();
        assert_eq!(record.source_booking_id, "X-1");
        assert_eq!(record.departure_date, None);
        assert_eq!(record.trip, TripDetails::default());
        assert!(record.passengers.is_empty());
    }

    #[test]
    fn test_empty_booking_id_is_an_error() {
        assert!(parse_enquiry("<Enquiry><BookingId>  </BookingId></Enquiry>").is_err());
        assert!(parse_enquiry("not xml at all").is_err());
    }

    #[test]
    fn test_comment_fields_colon_and_space_forms() {
        let fields = parse_comment_fields("Nights: 10 | adults 4 | Board:half board");
        assert_eq!(fields.get("nights").map(String::as_str), Some("10"));
        assert_eq!(fields.get("adults").map(String::as_str), Some("4"));
        assert_eq!(fields.get("board").map(String::as_str), Some("half board"));
    }

    #[test]
    fn test_comment_fields_duplicate_key_last_wins() {
        let fields = parse_comment_fields("nights: 7 | nights: 14");
        assert_eq!(fields.get("nights").map(String::as_str), Some("14"));
    }

    #[test]
    fn test_comment_fields_entity_decoding() {
        let fields = parse_comment_fields("hotel: Smith &amp; Jones Resort");
        assert_eq!(
            fields.get("hotel").map(String::as_str),
            Some("Smith & Jones Resort")
        );
    }

    #[test]
    fn test_unparseable_number_becomes_absent_not_zero() {
        let record = parse_enquiry(
            "<Enquiry><BookingId>X-2</BookingId><Comment>nights: a week | adults 2</Comment></Enquiry>",
        )
        .unwrap();
        assert_eq!(record.trip.nights, None);
        assert_eq!(record.trip.adults, Some(2));
    }

    #[test]
    fn test_budget_range_variants() {
        assert_eq!(
            extract_budget_range("budget: 1500 to 2000"),
            (Some(1500.0), Some(2000.0))
        );
        assert_eq!(
            extract_budget_range("spend £1,500 - £2,000 total"),
            (Some(1500.0), Some(2000.0))
        );
        assert_eq!(
            extract_budget_range("around 950.50-1200"),
            (Some(950.5), Some(1200.0))
        );
        assert_eq!(extract_budget_range("no numbers here"), (None, None));
    }

    #[test]
    fn test_budget_range_independent_of_key_value_pass() {
        // No "budget" key at all; the range still comes out of the raw text.
        let record = parse_enquiry(
            "<Enquiry><BookingId>X-3</BookingId><Comment>happy to pay 800 to 900</Comment></Enquiry>",
        )
        .unwrap();
        assert_eq!(record.trip.budget_from, Some(800.0));
        assert_eq!(record.trip.budget_to, Some(900.0));
    }

    #[test]
    fn test_passengers_with_missing_names_are_dropped() {
        let record = parse_enquiry(
            r#"<Enquiry><BookingId>X-4</BookingId><Passengers>
                <Passenger><FirstName>Ann</FirstName><Surname>Lee</Surname></Passenger>
                <Passenger><FirstName></FirstName><Surname>Ghost</Surname></Passenger>
            </Passengers></Enquiry>"#,
        )
        .unwrap();
        assert_eq!(record.passengers.len(), 1);
        assert_eq!(record.passengers[0].surname, "Lee");
    }
}
