//! Raw lead → canonical row normalisation.
//!
//! `full_name` and `email` fill their own columns (the last occurrence wins);
//! every other field is rendered as `"name: value"` in source order, without
//! deduplication by name.

use crate::types::{CanonicalRow, LeadRecord};

const NAME_FIELD: &str = "full_name";
const EMAIL_FIELD: &str = "email";

/// Normalise a batch of leads, one row per record, preserving order.
pub fn normalize(records: &[LeadRecord]) -> Vec<CanonicalRow> {
    records.iter().map(CanonicalRow::from).collect()
}

impl From<&LeadRecord> for CanonicalRow {
    fn from(record: &LeadRecord) -> Self {
        let mut row = CanonicalRow {
            date: record.created_time.clone(),
            ..CanonicalRow::default()
        };
        for field in &record.field_data {
            let value = field.first_value();
            match field.name.as_str() {
                NAME_FIELD => row.name = value.to_string(),
                EMAIL_FIELD => row.email = value.to_string(),
                other => row.other_fields.push(format!("{other}: {value}")),
            }
        }
        row
    }
}
