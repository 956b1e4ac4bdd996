//! Bucket catalog.
//!
//! A bucket is one category of job-search query the crawler runs as a single
//! unit of work. The catalog is the fixed list offered for selection; the
//! backend accepts any bucket id, so ids outside the catalog (ad hoc company
//! tags) are still valid selections.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a crawl bucket, e.g. `"fresher"` or `"cloud"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(String);

impl BucketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BucketId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BucketId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Grouping used when presenting the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    /// Experience level (fresher, internship, ...)
    Experience,
    /// Role or technology family
    Role,
    /// Company-specific careers feed
    Company,
}

impl BucketKind {
    pub fn label(self) -> &'static str {
        match self {
            BucketKind::Experience => "Experience level",
            BucketKind::Role => "Role",
            BucketKind::Company => "Company",
        }
    }
}

/// A selectable bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub kind: BucketKind,
}

const fn bucket(id: &'static str, label: &'static str, kind: BucketKind) -> BucketInfo {
    BucketInfo { id, label, kind }
}

/// Every bucket offered for selection, in display order.
pub const CATALOG: &[BucketInfo] = &[
    bucket("fresher", "Freshers / entry level", BucketKind::Experience),
    bucket("internship", "Internships", BucketKind::Experience),
    bucket("experienced", "Experienced hires", BucketKind::Experience),
    bucket("software-engineer", "Software engineering", BucketKind::Role),
    bucket("frontend", "Frontend", BucketKind::Role),
    bucket("backend", "Backend", BucketKind::Role),
    bucket("fullstack", "Full stack", BucketKind::Role),
    bucket("mobile", "Mobile", BucketKind::Role),
    bucket("data", "Data engineering & analytics", BucketKind::Role),
    bucket("ml-ai", "Machine learning & AI", BucketKind::Role),
    bucket("cloud", "Cloud", BucketKind::Role),
    bucket("devops", "DevOps & SRE", BucketKind::Role),
    bucket("security", "Security", BucketKind::Role),
    bucket("qa", "QA & testing", BucketKind::Role),
    bucket("google", "Google", BucketKind::Company),
    bucket("microsoft", "Microsoft", BucketKind::Company),
    bucket("amazon", "Amazon", BucketKind::Company),
    bucket("flipkart", "Flipkart", BucketKind::Company),
    bucket("infosys", "Infosys", BucketKind::Company),
    bucket("tcs", "Tata Consultancy Services", BucketKind::Company),
];

/// Look up a catalog entry by id.
pub fn find(id: &str) -> Option<&'static BucketInfo> {
    CATALOG.iter().find(|b| b.id == id)
}

pub fn is_known(id: &BucketId) -> bool {
    find(id.as_str()).is_some()
}

/// Catalog entries of one kind, in display order.
pub fn by_kind(kind: BucketKind) -> impl Iterator<Item = &'static BucketInfo> {
    CATALOG.iter().filter(move |b| b.kind == kind)
}

/// Every catalog id as a [`BucketId`].
pub fn all_ids() -> Vec<BucketId> {
    CATALOG.iter().map(|b| BucketId::new(b.id)).collect()
}
