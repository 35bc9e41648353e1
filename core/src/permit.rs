//! Permit record schema, permit-type catalog and creation validation.
//!
//! A [`Permit`] is the unit persisted locally, published to the remote sheet
//! and projected into the CSV export. Records arrive from two directions:
//! - [`Permit::new`] builds one from a validated [`PermitDraft`] (form input).
//! - [`Permit::from_remote_row`] maps a loosely-typed sheet row read back
//!   from the remote authority.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::remote::RemoteRow;

/// Column headings shared by the remote sheet and the CSV export, in order.
pub const SHEET_COLUMNS: [&str; 13] = [
    "Date",
    "Time",
    "Permit Type",
    "Location",
    "Contractor",
    "Supervisor",
    "Work Description",
    "Hazards",
    "Control Measures",
    "Permit Issuer",
    "Valid From",
    "Valid To",
    "Status",
];

// ── Permit type catalog ──────────────────────────────────────────────────

/// Fixed catalog of permit forms.
///
/// The mapping between tag, display name and form code is spelled out in
/// one place so lookups work in both directions without string heuristics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PermitType {
    ConfinedSpace,
    Excavation,
    WorkHeight,
    Lifting,
}

impl PermitType {
    pub const ALL: [PermitType; 4] = [
        PermitType::ConfinedSpace,
        PermitType::Excavation,
        PermitType::WorkHeight,
        PermitType::Lifting,
    ];

    /// Stable tag stored in local records and the publish body.
    pub fn id(self) -> &'static str {
        match self {
            PermitType::ConfinedSpace => "confined-space",
            PermitType::Excavation => "excavation",
            PermitType::WorkHeight => "work-height",
            PermitType::Lifting => "lifting",
        }
    }

    /// Form code printed on the paper permit (`SOF-3542-*`).
    pub fn form_code(self) -> &'static str {
        match self {
            PermitType::ConfinedSpace => "SOF-3542-I",
            PermitType::Excavation => "SOF-3542-H",
            PermitType::WorkHeight => "SOF-3542-E",
            PermitType::Lifting => "SOF-3542-C",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            PermitType::ConfinedSpace => "Confined Space Entry",
            PermitType::Excavation => "Excavation",
            PermitType::WorkHeight => "Work at Height",
            PermitType::Lifting => "Lifting Operation",
        }
    }

    /// Display label written to the sheet, e.g. `SOF-3542-H Excavation`.
    pub fn display_name(self) -> &'static str {
        match self {
            PermitType::ConfinedSpace => "SOF-3542-I Confined Space Entry",
            PermitType::Excavation => "SOF-3542-H Excavation",
            PermitType::WorkHeight => "SOF-3542-E Work at Height",
            PermitType::Lifting => "SOF-3542-C Lifting Operation",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    /// Reverse lookup from a sheet label.
    ///
    /// Exact display names win; otherwise the label's leading token is
    /// matched against the form codes so relabelled titles still resolve.
    pub fn from_display_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(found) = Self::ALL.into_iter().find(|t| t.display_name() == name) {
            return Some(found);
        }
        let code = name.split_whitespace().next()?;
        Self::ALL.into_iter().find(|t| t.form_code() == code)
    }
}

impl fmt::Display for PermitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for PermitType {
    type Err = UnknownPermitType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| UnknownPermitType(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown permit type '{0}' (expected one of: confined-space, excavation, work-height, lifting)")]
pub struct UnknownPermitType(pub String);

/// Permit type as carried on a stored record.
///
/// Rows read back from the sheet only carry the display label; when that
/// label matches nothing in the catalog the tag is `Unknown` (stored as an
/// empty string).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermitTypeTag {
    Known(PermitType),
    #[default]
    Unknown,
}

impl PermitTypeTag {
    pub fn known(self) -> Option<PermitType> {
        match self {
            PermitTypeTag::Known(t) => Some(t),
            PermitTypeTag::Unknown => None,
        }
    }
}

impl From<String> for PermitTypeTag {
    fn from(value: String) -> Self {
        PermitType::from_id(&value).map_or(PermitTypeTag::Unknown, PermitTypeTag::Known)
    }
}

impl From<PermitTypeTag> for String {
    fn from(value: PermitTypeTag) -> Self {
        match value {
            PermitTypeTag::Known(t) => t.id().to_string(),
            PermitTypeTag::Unknown => String::new(),
        }
    }
}

// ── Status ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermitStatus {
    #[default]
    Active,
    Closed,
    Suspended,
}

impl PermitStatus {
    pub const ALL: [PermitStatus; 3] = [
        PermitStatus::Active,
        PermitStatus::Closed,
        PermitStatus::Suspended,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PermitStatus::Active => "Active",
            PermitStatus::Closed => "Closed",
            PermitStatus::Suspended => "Suspended",
        }
    }

    /// Lenient parse used for stored and remote text: blank and
    /// unrecognised values fall back to `Active`.
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return PermitStatus::Active;
        }
        text.parse().unwrap_or_else(|_| {
            tracing::warn!("Unrecognised permit status '{text}', treating as Active");
            PermitStatus::Active
        })
    }
}

impl fmt::Display for PermitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermitStatus {
    type Err = UnknownPermitStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPermitStatus(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown permit status '{0}' (expected Active, Closed or Suspended)")]
pub struct UnknownPermitStatus(pub String);

impl From<String> for PermitStatus {
    fn from(value: String) -> Self {
        PermitStatus::from_text(&value)
    }
}

impl From<PermitStatus> for String {
    fn from(value: PermitStatus) -> Self {
        value.as_str().to_string()
    }
}

// ── Validation ───────────────────────────────────────────────────────────

/// Fields a draft must carry before it can become a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    PermitType,
    Date,
    Location,
    Contractor,
    Supervisor,
}

impl RequiredField {
    pub fn label(self) -> &'static str {
        match self {
            RequiredField::PermitType => "permit type",
            RequiredField::Date => "date",
            RequiredField::Location => "location",
            RequiredField::Contractor => "contractor",
            RequiredField::Supervisor => "supervisor",
        }
    }
}

fn join_labels(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field(s): {}", join_labels(.fields))]
    MissingRequiredField { fields: Vec<RequiredField> },
}

// ── Draft ────────────────────────────────────────────────────────────────

/// Form input for a new permit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermitDraft {
    pub permit_type: Option<PermitType>,
    pub date: String,
    pub time: String,
    pub location: String,
    pub contractor: String,
    pub supervisor: String,
    pub work_description: String,
    pub hazards: String,
    pub control_measures: String,
    pub permit_issuer: String,
    pub valid_from: String,
    pub valid_to: String,
    pub status: PermitStatus,
}

impl PermitDraft {
    /// Blank draft stamped with today's date (`YYYY-MM-DD`) and the current
    /// local time (`HH:MM`).
    pub fn for_now() -> Self {
        let now = Local::now();
        Self {
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M").to_string(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let blank = |value: &str| value.trim().is_empty();

        let mut missing = Vec::new();
        if self.permit_type.is_none() {
            missing.push(RequiredField::PermitType);
        }
        if blank(&self.date) {
            missing.push(RequiredField::Date);
        }
        if blank(&self.location) {
            missing.push(RequiredField::Location);
        }
        if blank(&self.contractor) {
            missing.push(RequiredField::Contractor);
        }
        if blank(&self.supervisor) {
            missing.push(RequiredField::Supervisor);
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingRequiredField { fields: missing })
        }
    }
}

// ── Permit ───────────────────────────────────────────────────────────────

/// A logged work permit.
///
/// Serialised with camelCase keys; the same shape is stored locally and sent
/// as the publish body. Missing keys deserialise to empty values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Permit {
    pub project: String,
    pub id: String,
    pub permit_type: PermitTypeTag,
    pub permit_type_name: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub contractor: String,
    pub supervisor: String,
    pub work_description: String,
    pub hazards: String,
    pub control_measures: String,
    pub permit_issuer: String,
    pub valid_from: String,
    pub valid_to: String,
    pub status: PermitStatus,
    /// RFC3339 creation time. Absent on rows read back from the sheet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Permit {
    /// Validate `draft` and stamp it with a fresh identity and creation time.
    pub fn new(project: impl Into<String>, draft: PermitDraft) -> Result<Self, ValidationError> {
        draft.validate()?;

        let permit_type = match draft.permit_type {
            Some(t) => PermitTypeTag::Known(t),
            None => PermitTypeTag::Unknown,
        };
        let permit_type_name = draft
            .permit_type
            .map(|t| t.display_name().to_string())
            .unwrap_or_default();

        Ok(Self {
            project: project.into(),
            id: Uuid::new_v4().to_string(),
            permit_type,
            permit_type_name,
            date: draft.date,
            time: draft.time,
            location: draft.location,
            contractor: draft.contractor,
            supervisor: draft.supervisor,
            work_description: draft.work_description,
            hazards: draft.hazards,
            control_measures: draft.control_measures,
            permit_issuer: draft.permit_issuer,
            valid_from: draft.valid_from,
            valid_to: draft.valid_to,
            status: draft.status,
            created_at: Some(Utc::now().to_rfc3339()),
        })
    }

    /// Map a sheet row into a record for `project`.
    ///
    /// The id is derived from the project, row position and row content so
    /// that reloading an unchanged sheet reproduces the same set.
    pub fn from_remote_row(project: &str, index: usize, row: &RemoteRow) -> Self {
        let permit_type_name = row.text("Permit Type");
        let permit_type = PermitType::from_display_name(&permit_type_name)
            .map_or(PermitTypeTag::Unknown, PermitTypeTag::Known);

        let fingerprint = format!("{project}\u{1f}{index}\u{1f}{}", row.fingerprint());
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, fingerprint.as_bytes()).to_string();

        Self {
            project: project.to_string(),
            id,
            permit_type,
            permit_type_name,
            date: row.text("Date"),
            time: row.text("Time"),
            location: row.text("Location"),
            contractor: row.text("Contractor"),
            supervisor: row.text("Supervisor"),
            work_description: row.text("Work Description"),
            hazards: row.text("Hazards"),
            control_measures: row.text("Control Measures"),
            permit_issuer: row.text("Permit Issuer"),
            valid_from: row.text("Valid From"),
            valid_to: row.text("Valid To"),
            status: PermitStatus::from_text(&row.text("Status")),
            created_at: None,
        }
    }

    /// Cell values in [`SHEET_COLUMNS`] order.
    pub fn sheet_row(&self) -> [&str; 13] {
        [
            self.date.as_str(),
            self.time.as_str(),
            self.permit_type_name.as_str(),
            self.location.as_str(),
            self.contractor.as_str(),
            self.supervisor.as_str(),
            self.work_description.as_str(),
            self.hazards.as_str(),
            self.control_measures.as_str(),
            self.permit_issuer.as_str(),
            self.valid_from.as_str(),
            self.valid_to.as_str(),
            self.status.as_str(),
        ]
    }
}

/// Number of permits per catalog type, in catalog order. Records whose type
/// is not in the catalog are not counted.
pub fn counts_by_type(permits: &[Permit]) -> [(PermitType, usize); 4] {
    PermitType::ALL.map(|t| {
        let count = permits
            .iter()
            .filter(|p| p.permit_type == PermitTypeTag::Known(t))
            .count();
        (t, count)
    })
}
