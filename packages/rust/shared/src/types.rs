//! Core domain types for the Repodex catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RepodexError, Result};

/// Maximum allowed category level. Levels 0, 1, 2 give three tiers total;
/// this is a hard business rule, not runtime-configurable.
pub const MAX_CATEGORY_LEVEL: i64 = 2;

// ---------------------------------------------------------------------------
// Persisted entities
// ---------------------------------------------------------------------------

/// A node in the category tree. `level` always equals the number of
/// ancestors, with roots at level 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub level: i64,
    pub created_at: DateTime<Utc>,
}

/// A cataloged external repository, linked to exactly one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    /// Globally unique across the catalog.
    pub github_url: String,
    /// Derived from `github_url`, never user-supplied.
    pub owner: String,
    pub repo_name: String,
    pub category_id: i64,
    pub description: Option<String>,
    pub added_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An administrator account.
#[derive(Debug, Clone)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A key/value configuration entry (holds the enrichment credentials,
/// among others).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Option<String>,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// One step in a repository's ancestor category path (root→leaf).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPathEntry {
    pub id: i64,
    pub name: String,
    pub level: i64,
}

/// A repository projected for API responses: the entity plus its full
/// category path and the live "currently enriching" flag.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryView {
    pub id: i64,
    pub name: String,
    pub owner: String,
    pub repo_name: String,
    pub github_url: String,
    pub category_id: i64,
    pub category_name: Option<String>,
    /// Ancestor path ordered root→leaf.
    pub category_path: Vec<CategoryPathEntry>,
    /// Info-card image link derived from the configured card base URL;
    /// null when no base is configured.
    pub card_url: Option<String>,
    pub description: Option<String>,
    pub is_processing: bool,
    pub added_at: DateTime<Utc>,
}

/// A rendered node of the category tree, annotated with its direct
/// repository names and counts.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    pub id: i64,
    pub name: String,
    /// Direct repositories only (no subtree aggregation).
    pub repositories: Vec<RepositoryName>,
    pub repo_count: usize,
    pub child_count: usize,
    pub children: Vec<CategoryNode>,
}

/// Name-only repository reference embedded in tree nodes.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryName {
    pub name: String,
}

/// One page of a listing, with the total row count and a continuation flag.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

// ---------------------------------------------------------------------------
// GitHub URL parsing
// ---------------------------------------------------------------------------

/// Parse a GitHub repository URL into `(owner, repo_name)`.
///
/// The host must be github.com and the path must carry at least two
/// non-empty segments; the last two are taken as owner and repo name, so
/// trailing slashes are tolerated.
pub fn parse_github_url(raw: &str) -> Result<(String, String)> {
    let url = Url::parse(raw.trim())
        .map_err(|_| RepodexError::validation("invalid GitHub URL format"))?;

    let host = url.host_str().unwrap_or("");
    if !host.ends_with("github.com") {
        return Err(RepodexError::validation(
            "a valid github.com URL is required",
        ));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if segments.len() < 2 {
        return Err(RepodexError::validation("invalid GitHub URL"));
    }

    let owner = segments[segments.len() - 2].to_string();
    let repo_name = segments[segments.len() - 1].to_string();
    Ok((owner, repo_name))
}
