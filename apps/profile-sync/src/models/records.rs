use std::collections::BTreeSet;
use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::models::profile::{Collection, ProfileDraft};

/// Server-assigned identifier of a collection item.
pub type ItemId = i64;

/// One row of an id-keyed collection.
///
/// `id` is absent until a create response has been merged back. `touched`
/// is editor bookkeeping: it is never serialized and never written by the
/// merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    #[serde(flatten)]
    pub fields: T,
    #[serde(skip)]
    pub touched: BTreeSet<String>,
}

impl<T> Entry<T> {
    /// A fresh row from an "add row" action.
    pub fn new(fields: T) -> Self {
        Self {
            id: None,
            fields,
            touched: BTreeSet::new(),
        }
    }

    pub fn persisted(id: ItemId, fields: T) -> Self {
        Self {
            id: Some(id),
            fields,
            touched: BTreeSet::new(),
        }
    }

    pub fn touch(&mut self, field: &str) {
        self.touched.insert(field.to_string());
    }

    pub fn is_touched(&self, field: &str) -> bool {
        self.touched.contains(field)
    }
}

/// A record stored in one of the id-keyed collections.
///
/// `fields` lists every declared domain field; classification, blank-row
/// detection and finalize validation all work from it.
pub trait Record:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const COLLECTION: Collection;
    /// Fields that must be filled on a non-blank row before finalizing.
    const REQUIRED_FIELDS: &'static [&'static str];
    /// Fields holding `YYYY-MM-DD` / `YYYY-MM` dates.
    const DATE_FIELDS: &'static [&'static str];

    fn fields(&self) -> Vec<(&'static str, Option<&str>)>;

    fn entries(profile: &ProfileDraft) -> &[Entry<Self>];

    fn entries_mut(profile: &mut ProfileDraft) -> &mut Vec<Entry<Self>>;

    fn field(&self, name: &str) -> Option<&str> {
        self.fields()
            .into_iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| v)
    }

    /// Every declared field is absent or whitespace.
    fn is_blank(&self) -> bool {
        self.fields()
            .iter()
            .all(|(_, v)| v.map_or(true, |s| s.trim().is_empty()))
    }

    /// Shallow per-field comparison. Absent and empty compare equal.
    fn same_fields(&self, other: &Self) -> bool {
        fn normalize(v: Option<&str>) -> Option<&str> {
            v.filter(|s| !s.is_empty())
        }
        self.fields()
            .iter()
            .zip(other.fields().iter())
            .all(|((_, a), (_, b))| normalize(*a) == normalize(*b))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graduation_status: Option<String>,
}

impl Record for Education {
    const COLLECTION: Collection = Collection::Educations;
    const REQUIRED_FIELDS: &'static [&'static str] = &["school"];
    const DATE_FIELDS: &'static [&'static str] = &["startDate", "endDate"];

    fn fields(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("school", self.school.as_deref()),
            ("major", self.major.as_deref()),
            ("degree", self.degree.as_deref()),
            ("startDate", self.start_date.as_deref()),
            ("endDate", self.end_date.as_deref()),
            ("graduationStatus", self.graduation_status.as_deref()),
        ]
    }

    fn entries(profile: &ProfileDraft) -> &[Entry<Self>] {
        &profile.educations
    }

    fn entries_mut(profile: &mut ProfileDraft) -> &mut Vec<Entry<Self>> {
        &mut profile.educations
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Career {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Record for Career {
    const COLLECTION: Collection = Collection::Careers;
    const REQUIRED_FIELDS: &'static [&'static str] = &["company", "startDate"];
    const DATE_FIELDS: &'static [&'static str] = &["startDate", "endDate"];

    fn fields(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("company", self.company.as_deref()),
            ("position", self.position.as_deref()),
            ("department", self.department.as_deref()),
            ("startDate", self.start_date.as_deref()),
            ("endDate", self.end_date.as_deref()),
            // unchecked and unset are the same state in the editor
            ("isCurrent", self.is_current.filter(|c| *c).map(|_| "true")),
            ("description", self.description.as_deref()),
        ]
    }

    fn entries(profile: &ProfileDraft) -> &[Entry<Self>] {
        &profile.careers
    }

    fn entries_mut(profile: &mut ProfileDraft) -> &mut Vec<Entry<Self>> {
        &mut profile.careers
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proficiency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquired_date: Option<String>,
}

impl Record for Language {
    const COLLECTION: Collection = Collection::Languages;
    const REQUIRED_FIELDS: &'static [&'static str] = &["language"];
    const DATE_FIELDS: &'static [&'static str] = &["acquiredDate"];

    fn fields(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("language", self.language.as_deref()),
            ("proficiency", self.proficiency.as_deref()),
            ("testName", self.test_name.as_deref()),
            ("score", self.score.as_deref()),
            ("acquiredDate", self.acquired_date.as_deref()),
        ]
    }

    fn entries(profile: &ProfileDraft) -> &[Entry<Self>] {
        &profile.languages
    }

    fn entries_mut(profile: &mut ProfileDraft) -> &mut Vec<Entry<Self>> {
        &mut profile.languages
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquired_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
}

impl Record for Certification {
    const COLLECTION: Collection = Collection::Certifications;
    const REQUIRED_FIELDS: &'static [&'static str] = &["name"];
    const DATE_FIELDS: &'static [&'static str] = &["acquiredDate"];

    fn fields(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("name", self.name.as_deref()),
            ("issuer", self.issuer.as_deref()),
            ("acquiredDate", self.acquired_date.as_deref()),
            ("credentialId", self.credential_id.as_deref()),
        ]
    }

    fn entries(profile: &ProfileDraft) -> &[Entry<Self>] {
        &profile.certifications
    }

    fn entries_mut(profile: &mut ProfileDraft) -> &mut Vec<Entry<Self>> {
        &mut profile.certifications
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Award {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awarded_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Record for Award {
    const COLLECTION: Collection = Collection::Awards;
    const REQUIRED_FIELDS: &'static [&'static str] = &["title"];
    const DATE_FIELDS: &'static [&'static str] = &["awardedDate"];

    fn fields(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("title", self.title.as_deref()),
            ("issuer", self.issuer.as_deref()),
            ("awardedDate", self.awarded_date.as_deref()),
            ("description", self.description.as_deref()),
        ]
    }

    fn entries(profile: &ProfileDraft) -> &[Entry<Self>] {
        &profile.awards
    }

    fn entries_mut(profile: &mut ProfileDraft) -> &mut Vec<Entry<Self>> {
        &mut profile.awards
    }
}
