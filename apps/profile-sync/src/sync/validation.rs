//! Pre-flight checks.
//!
//! `check_draft` guards invariants every save relies on. `validate_for_finalize`
//! is the strict mandatory-field pass run only before finalizing; it collects
//! every problem instead of stopping at the first.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;
use crate::models::attachment::AttachmentKind;
use crate::models::profile::ProfileDraft;
use crate::models::records::{Award, Career, Certification, Education, Language, Record};
use crate::sync::policy::{AttachmentStorage, SyncPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// e.g. `careers[2].startDate`
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.errors.push(FieldError {
            path: path.into(),
            reason: reason.into(),
        });
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{} {}", e.path, e.reason))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Invariants checked before every save, in both modes.
pub fn check_draft(draft: &ProfileDraft, policy: &SyncPolicy) -> Result<(), SyncError> {
    let mut seen = HashSet::new();
    for link in &draft.links {
        if !seen.insert(link.link_type.as_str()) {
            return Err(SyncError::InvalidDraft(format!(
                "duplicate link type '{}'",
                link.link_type
            )));
        }
        if policy.attachment_storage == AttachmentStorage::LinkMap
            && AttachmentKind::ALL
                .iter()
                .any(|k| k.link_type() == link.link_type)
        {
            return Err(SyncError::InvalidDraft(format!(
                "link type '{}' is reserved for attachments",
                link.link_type
            )));
        }
    }
    Ok(())
}

/// Mandatory-field validation for finalize.
pub fn validate_for_finalize(draft: &ProfileDraft) -> ValidationReport {
    let mut report = ValidationReport::default();

    let header = &draft.header;
    for (name, value) in [
        ("displayName", &header.display_name),
        ("headline", &header.headline),
        ("introduction", &header.introduction),
    ] {
        if is_blank(value.as_deref()) {
            report.push(name, "is required");
        }
    }

    validate_records::<Education>(draft, &mut report);
    validate_records::<Career>(draft, &mut report);
    validate_records::<Language>(draft, &mut report);
    validate_records::<Certification>(draft, &mut report);
    validate_records::<Award>(draft, &mut report);

    for (i, link) in draft.links.iter().enumerate() {
        if let Some(url) = link.url.as_deref().filter(|u| !u.trim().is_empty()) {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                report.push(format!("links[{i}].url"), "must be an http(s) URL");
            }
        }
    }

    report
}

fn validate_records<T: Record>(draft: &ProfileDraft, report: &mut ValidationReport) {
    let collection = T::COLLECTION;
    for (i, entry) in T::entries(draft).iter().enumerate() {
        // placeholder rows are never sent, so they are never checked
        if entry.fields.is_blank() {
            continue;
        }
        for &field in T::REQUIRED_FIELDS {
            if is_blank(entry.fields.field(field)) {
                report.push(format!("{collection}[{i}].{field}"), "is required");
            }
        }
        for &field in T::DATE_FIELDS {
            if let Some(value) = entry.fields.field(field).filter(|v| !v.trim().is_empty()) {
                if parse_date(value).is_none() {
                    report.push(
                        format!("{collection}[{i}].{field}"),
                        "must be a date (YYYY-MM-DD or YYYY-MM)",
                    );
                }
            }
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Accepts `YYYY-MM-DD` and month precision `YYYY-MM`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d"))
        .ok()
}
