use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::attachment::{AttachmentKind, AttachmentSlot, RemoteFile};
use crate::models::records::{Award, Career, Certification, Education, Entry, Language};

pub type ProfileId = i64;

/// Lifecycle status written with every header save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileStatus {
    #[default]
    Draft,
    Complete,
}

/// Every REST resource the pipeline writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Educations,
    Careers,
    Languages,
    Certifications,
    Awards,
    Links,
    Skills,
    JobTags,
    ExperienceTags,
}

impl Collection {
    /// Path segment under the profile resource.
    pub fn resource(&self) -> &'static str {
        match self {
            Collection::Educations => "educations",
            Collection::Careers => "careers",
            Collection::Languages => "languages",
            Collection::Certifications => "certifications",
            Collection::Awards => "awards",
            Collection::Links => "links",
            Collection::Skills => "skills",
            Collection::JobTags => "job-tags",
            Collection::ExperienceTags => "experience-tags",
        }
    }

    pub fn is_id_keyed(&self) -> bool {
        matches!(
            self,
            Collection::Educations
                | Collection::Careers
                | Collection::Languages
                | Collection::Certifications
                | Collection::Awards
        )
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

/// Header fields of a profile: everything that is not a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introduction: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_code: Option<String>,
    #[serde(default)]
    pub status: ProfileStatus,
}

/// A type-keyed link. The backend stores links as a map keyed by `link_type`,
/// so there is no server id and every write is an upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkItem {
    #[serde(rename = "type")]
    pub link_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl LinkItem {
    pub fn new(link_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            link_type: link_type.into(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn is_blank(&self) -> bool {
        self.url.as_deref().map_or(true, |u| u.trim().is_empty())
    }
}

/// Flat-set collections: no per-item identity, always replaced whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatSet {
    Skills,
    JobTags,
    ExperienceTags,
}

impl FlatSet {
    pub fn collection(&self) -> Collection {
        match self {
            FlatSet::Skills => Collection::Skills,
            FlatSet::JobTags => Collection::JobTags,
            FlatSet::ExperienceTags => Collection::ExperienceTags,
        }
    }
}

/// Membership of a flat set. Skills are free text, tags are catalogue ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlatSetValues {
    Ids(Vec<i64>),
    Names(Vec<String>),
}

impl FlatSetValues {
    pub fn len(&self) -> usize {
        match self {
            FlatSetValues::Ids(ids) => ids.len(),
            FlatSetValues::Names(names) => names.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty list deserializes as `Ids`, so both accessors accept it.
    pub fn into_names(self) -> Option<Vec<String>> {
        match self {
            FlatSetValues::Names(names) => Some(names),
            FlatSetValues::Ids(ids) if ids.is_empty() => Some(Vec::new()),
            FlatSetValues::Ids(_) => None,
        }
    }

    pub fn into_ids(self) -> Option<Vec<i64>> {
        match self {
            FlatSetValues::Ids(ids) => Some(ids),
            FlatSetValues::Names(names) if names.is_empty() => Some(Vec::new()),
            FlatSetValues::Names(_) => None,
        }
    }
}

/// The full editable profile. Used both as the live Draft and, wrapped in
/// `Baseline`, as the last server-confirmed state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ProfileId>,
    #[serde(flatten)]
    pub header: ProfileHeader,
    #[serde(default)]
    pub educations: Vec<Entry<Education>>,
    #[serde(default)]
    pub careers: Vec<Entry<Career>>,
    #[serde(default)]
    pub languages: Vec<Entry<Language>>,
    #[serde(default)]
    pub certifications: Vec<Entry<Certification>>,
    #[serde(default)]
    pub awards: Vec<Entry<Award>>,
    #[serde(default)]
    pub links: Vec<LinkItem>,
    /// `None` means the editor never loaded the section; `Some(vec![])` is an
    /// intentional clear-out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_tags: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_tags: Option<Vec<i64>>,
    #[serde(default)]
    pub profile_image: AttachmentSlot,
    #[serde(default)]
    pub portfolio: AttachmentSlot,
    /// Header fields the user has edited.
    #[serde(skip)]
    pub touched: BTreeSet<String>,
}

impl ProfileDraft {
    pub fn touch(&mut self, field: &str) {
        self.touched.insert(field.to_string());
    }

    pub fn is_touched(&self, field: &str) -> bool {
        self.touched.contains(field)
    }

    pub fn link(&self, link_type: &str) -> Option<&LinkItem> {
        self.links.iter().find(|l| l.link_type == link_type)
    }

    /// Inserts or replaces the link with the same type tag.
    pub fn upsert_link(&mut self, link: LinkItem) {
        match self.links.iter_mut().find(|l| l.link_type == link.link_type) {
            Some(existing) => *existing = link,
            None => self.links.push(link),
        }
    }

    pub fn attachment(&self, kind: AttachmentKind) -> &AttachmentSlot {
        match kind {
            AttachmentKind::ProfileImage => &self.profile_image,
            AttachmentKind::Portfolio => &self.portfolio,
        }
    }

    pub fn attachment_mut(&mut self, kind: AttachmentKind) -> &mut AttachmentSlot {
        match kind {
            AttachmentKind::ProfileImage => &mut self.profile_image,
            AttachmentKind::Portfolio => &mut self.portfolio,
        }
    }

    /// Moves links carrying attachment references out of `links` and into
    /// their slots. A slot that already has a remote reference keeps it.
    pub fn lift_attachment_links(&mut self) {
        for kind in AttachmentKind::ALL {
            let pos = match self.links.iter().position(|l| l.link_type == kind.link_type()) {
                Some(pos) => pos,
                None => continue,
            };
            let link = self.links.remove(pos);
            let slot = self.attachment_mut(kind);
            if slot.remote.is_some() {
                continue;
            }
            if let Some(url) = link.url {
                slot.remote = Some(RemoteFile {
                    url,
                    file_name: link.file_name,
                    content_type: link.content_type,
                    size: link.size,
                });
            }
        }
    }
}

/// Read-only view of the last server-confirmed profile.
///
/// Only the merger (through `Baseline::new` and the crate-private `patch`) ever
/// replaces or modifies it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baseline(ProfileDraft);

impl Baseline {
    pub fn new(profile: ProfileDraft) -> Self {
        Self(profile.without_pending())
    }

    pub fn profile(&self) -> &ProfileDraft {
        &self.0
    }

    pub(crate) fn patch(&mut self) -> &mut ProfileDraft {
        &mut self.0
    }
}

impl ProfileDraft {
    /// Copy with pending attachment bytes and editor bookkeeping dropped.
    pub(crate) fn without_pending(mut self) -> Self {
        self.profile_image.pending = None;
        self.portfolio.pending = None;
        self.touched.clear();
        for e in &mut self.educations {
            e.touched.clear();
        }
        for e in &mut self.careers {
            e.touched.clear();
        }
        for e in &mut self.languages {
            e.touched.clear();
        }
        for e in &mut self.certifications {
            e.touched.clear();
        }
        for e in &mut self.awards {
            e.touched.clear();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(ProfileStatus::Complete).unwrap(),
            serde_json::json!("COMPLETE")
        );
    }

    #[test]
    fn test_empty_flat_set_accepted_as_either_kind() {
        let values: FlatSetValues = serde_json::from_str("[]").unwrap();
        assert_eq!(values.clone().into_names(), Some(Vec::new()));
        assert_eq!(values.into_ids(), Some(Vec::new()));
    }

    #[test]
    fn test_upsert_link_replaces_same_type() {
        let mut draft = ProfileDraft::default();
        draft.upsert_link(LinkItem::new("primary-link", "https://a.example"));
        draft.upsert_link(LinkItem::new("primary-link", "https://b.example"));
        assert_eq!(draft.links.len(), 1);
        assert_eq!(
            draft.link("primary-link").and_then(|l| l.url.as_deref()),
            Some("https://b.example")
        );
    }

    #[test]
    fn test_attachment_links_lifted_into_slots() {
        let mut draft = ProfileDraft {
            links: vec![
                LinkItem::new("primary-link", "https://ada.dev"),
                LinkItem {
                    link_type: "portfolio".to_string(),
                    url: Some("https://cdn.example/cv.pdf".to_string()),
                    file_name: Some("cv.pdf".to_string()),
                    content_type: Some("application/pdf".to_string()),
                    size: Some(4),
                },
                LinkItem::new("profile-image", "https://cdn.example/stale.png"),
            ],
            ..Default::default()
        };
        draft.profile_image.remote = Some(RemoteFile {
            url: "https://cdn.example/me.png".to_string(),
            file_name: None,
            content_type: None,
            size: None,
        });

        draft.lift_attachment_links();

        assert_eq!(draft.links, vec![LinkItem::new("primary-link", "https://ada.dev")]);
        let portfolio = draft.portfolio.remote.as_ref().unwrap();
        assert_eq!(portfolio.url, "https://cdn.example/cv.pdf");
        assert_eq!(portfolio.size, Some(4));
        assert_eq!(draft.profile_image.url(), Some("https://cdn.example/me.png"));
    }

    #[test]
    fn test_draft_deserializes_flattened_header() {
        let draft: ProfileDraft = serde_json::from_value(serde_json::json!({
            "id": 7,
            "displayName": "Ada",
            "status": "DRAFT",
            "careers": [{ "id": 5, "company": "Y" }],
            "skills": ["rust"]
        }))
        .unwrap();
        assert_eq!(draft.id, Some(7));
        assert_eq!(draft.header.display_name.as_deref(), Some("Ada"));
        assert_eq!(draft.careers[0].id, Some(5));
        assert_eq!(draft.skills, Some(vec!["rust".to_string()]));
        assert!(draft.job_tags.is_none());
    }
}
