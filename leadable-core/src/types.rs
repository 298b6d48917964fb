//! Domain types for lead synchronisation.
//!
//! Credentials are opaque strings. The `Debug` impls of the settings structs
//! redact them so they never reach a log line.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Header written to an empty destination sheet.
pub const SHEET_HEADER: [&str; 4] = ["Date", "Name", "Email", "Other Fields"];

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a sync, unique within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncName(pub String);

impl fmt::Display for SyncName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SyncName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SyncName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Interval between poll cycles, in whole minutes. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Frequency(u32);

impl Frequency {
    /// Preset labels offered to users, in display order.
    pub const PRESETS: [(&'static str, u32); 8] = [
        ("5 minutes", 5),
        ("10 minutes", 10),
        ("30 minutes", 30),
        ("1 hour", 60),
        ("2 hours", 120),
        ("6 hours", 360),
        ("12 hours", 720),
        ("1 day", 1440),
    ];

    pub fn from_minutes(minutes: u32) -> Result<Self, ValidationError> {
        if minutes == 0 {
            return Err(ValidationError::ZeroFrequency);
        }
        Ok(Self(minutes))
    }

    /// Resolve a preset label (`"1 hour"`) or a bare number of minutes (`"45"`).
    pub fn from_label(label: &str) -> Result<Self, ValidationError> {
        let trimmed = label.trim();
        if let Some((_, minutes)) = Self::PRESETS
            .iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(trimmed))
        {
            return Ok(Self(*minutes));
        }
        match trimmed.parse::<u32>() {
            Ok(minutes) => Self::from_minutes(minutes),
            Err(_) => Err(ValidationError::UnknownFrequency(label.to_string())),
        }
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn as_secs(self) -> u64 {
        u64::from(self.0) * 60
    }

    /// Preset label when one matches, otherwise `"<n> min"`.
    pub fn label(self) -> String {
        Self::PRESETS
            .iter()
            .find(|(_, minutes)| *minutes == self.0)
            .map(|(label, _)| (*label).to_string())
            .unwrap_or_else(|| format!("{} min", self.0))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for Frequency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
    }
}

impl TryFrom<u32> for Frequency {
    type Error = ValidationError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::from_minutes(minutes)
    }
}

impl From<Frequency> for u32 {
    fn from(f: Frequency) -> Self {
        f.0
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Where leads are read from.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    pub access_token: String,
    pub account_id: String,
    pub form_id: String,
}

impl fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSettings")
            .field("access_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("form_id", &self.form_id)
            .finish()
    }
}

/// Where rows are written to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSettings {
    pub sheet_id: String,
    pub access_token: String,
}

impl fmt::Debug for DestinationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationSettings")
            .field("sheet_id", &self.sheet_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Immutable identity and endpoints of one registered sync.
///
/// The frequency and run state are mutable and live with the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub name: SyncName,
    pub source: SourceSettings,
    pub destination: DestinationSettings,
}

/// A create request as it arrives from a presentation layer.
///
/// Every field is a raw string; [`SyncSpec::validate`] turns it into a
/// [`ValidSpec`] or rejects it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source_token: String,
    pub account_id: String,
    pub form_id: String,
    pub sheet_id: String,
    pub frequency: String,
    pub google_token: String,
}

/// A create request whose fields are all present and well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSpec {
    /// `None` when the registry should pick a name.
    pub name: Option<SyncName>,
    pub frequency: Frequency,
    pub source: SourceSettings,
    pub destination: DestinationSettings,
}

impl ValidSpec {
    pub fn into_settings(self, name: SyncName) -> SyncSettings {
        SyncSettings {
            name,
            source: self.source,
            destination: self.destination,
        }
    }
}

impl SyncSpec {
    /// Check required fields in the order a user fills them in: lead source
    /// first, then the spreadsheet login, then the sheet itself.
    pub fn validate(self) -> Result<ValidSpec, ValidationError> {
        let source_token = required(self.source_token, "source_token")?;
        let account_id = required(self.account_id, "account_id")?;
        let form_id = required(self.form_id, "form_id")?;
        let google_token = required(self.google_token, "google_token")?;
        let sheet_id = required(self.sheet_id, "sheet_id")?;
        let frequency = Frequency::from_label(&self.frequency)?;

        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .map(SyncName::from);

        Ok(ValidSpec {
            name,
            frequency,
            source: SourceSettings {
                access_token: source_token,
                account_id,
                form_id,
            },
            destination: DestinationSettings {
                sheet_id,
                access_token: google_token,
            },
        })
    }
}

fn required(value: String, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One named field of a lead. The source models every field as multi-valued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadField {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl LeadField {
    /// First listed value, or `""` when the field carries none.
    pub fn first_value(&self) -> &str {
        self.values.first().map(String::as_str).unwrap_or("")
    }
}

/// A raw lead as returned by the ad platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub created_time: String,
    #[serde(default)]
    pub field_data: Vec<LeadField>,
}

/// A lead in destination shape. `date` is the dedupe key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub date: String,
    pub name: String,
    pub email: String,
    pub other_fields: Vec<String>,
}

impl CanonicalRow {
    /// The four destination cells: date, name, email, `"; "`-joined extras.
    pub fn cells(&self) -> [String; 4] {
        [
            self.date.clone(),
            self.name.clone(),
            self.email.clone(),
            self.other_fields.join("; "),
        ]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn spec() -> SyncSpec {
        SyncSpec {
            name: Some("Clinic".to_string()),
            source_token: "fb-token".to_string(),
            account_id: "act_1".to_string(),
            form_id: "form_1".to_string(),
            sheet_id: "sheet_1".to_string(),
            frequency: "1 hour".to_string(),
            google_token: "g-token".to_string(),
        }
    }

    #[rstest]
    #[case("5 minutes", 5)]
    #[case("1 hour", 60)]
    #[case("1 day", 1440)]
    #[case("  2 HOURS ", 120)]
    #[case("45", 45)]
    fn frequency_from_label(#[case] label: &str, #[case] minutes: u32) {
        assert_eq!(Frequency::from_label(label).unwrap().minutes(), minutes);
    }

    #[test]
    fn frequency_rejects_zero_and_garbage() {
        assert_eq!(Frequency::from_label("0"), Err(ValidationError::ZeroFrequency));
        assert!(matches!(
            Frequency::from_label("fortnightly"),
            Err(ValidationError::UnknownFrequency(_))
        ));
    }

    #[test]
    fn frequency_label_prefers_preset() {
        assert_eq!(Frequency::from_minutes(720).unwrap().label(), "12 hours");
        assert_eq!(Frequency::from_minutes(7).unwrap().label(), "7 min");
        assert_eq!(Frequency::from_minutes(10).unwrap().as_secs(), 600);
    }

    #[test]
    fn frequency_deserialize_rejects_zero() {
        assert!(serde_yaml::from_str::<Frequency>("0").is_err());
        let f: Frequency = serde_yaml::from_str("30").expect("deserialize");
        assert_eq!(f.minutes(), 30);
    }

    #[test]
    fn validate_accepts_complete_spec() {
        let valid = spec().validate().expect("valid");
        assert_eq!(valid.name, Some(SyncName::from("Clinic")));
        assert_eq!(valid.frequency.minutes(), 60);
        assert_eq!(valid.source.form_id, "form_1");
        assert_eq!(valid.destination.sheet_id, "sheet_1");
    }

    #[test]
    fn validate_blank_name_means_generated() {
        let mut s = spec();
        s.name = Some("   ".to_string());
        assert_eq!(s.validate().unwrap().name, None);
    }

    #[rstest]
    #[case::source_token(|s: &mut SyncSpec| s.source_token.clear(), "source_token")]
    #[case::account(|s: &mut SyncSpec| s.account_id = " ".into(), "account_id")]
    #[case::form(|s: &mut SyncSpec| s.form_id.clear(), "form_id")]
    #[case::sheet(|s: &mut SyncSpec| s.sheet_id.clear(), "sheet_id")]
    #[case::google(|s: &mut SyncSpec| s.google_token.clear(), "google_token")]
    fn validate_reports_missing_field(
        #[case] blank: fn(&mut SyncSpec),
        #[case] field: &'static str,
    ) {
        let mut s = spec();
        blank(&mut s);
        assert_eq!(s.validate(), Err(ValidationError::MissingField(field)));
    }

    #[test]
    fn settings_debug_redacts_tokens() {
        let valid = spec().validate().unwrap();
        let rendered = format!("{:?}", valid.into_settings(SyncName::from("Clinic")));
        assert!(!rendered.contains("fb-token"));
        assert!(!rendered.contains("g-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn lead_record_deserializes_graph_shape() {
        let record: LeadRecord = serde_yaml::from_str(
            "created_time: '2024-01-01T00:00:00+0000'\nfield_data:\n  - name: email\n    values: [a@x.com]\n",
        )
        .expect("deserialize");
        assert_eq!(record.field_data[0].first_value(), "a@x.com");
    }

    #[test]
    fn canonical_row_cells_join_other_fields() {
        let row = CanonicalRow {
            date: "d".into(),
            name: "n".into(),
            email: "e".into(),
            other_fields: vec!["city: Lisbon".into(), "phone: 1".into()],
        };
        assert_eq!(row.cells()[3], "city: Lisbon; phone: 1");
        assert_eq!(CanonicalRow::default().cells()[3], "");
    }
}
