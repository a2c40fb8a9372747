//! Catalog management: the bounded category tree and the repository
//! directory built on top of it.
//!
//! All tree invariants live here, not in SQL: levels always equal ancestor
//! counts, the tree never exceeds three tiers, and reparenting cascades
//! level changes to every descendant atomically.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;

use repodex_shared::types::RepositoryName;
use repodex_shared::{
    Category, CategoryNode, CategoryPathEntry, MAX_CATEGORY_LEVEL, Page, RepodexError, Repository,
    RepositoryView, Result, parse_github_url,
};
use repodex_storage::Storage;

use crate::enrichment::EnrichmentCoordinator;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCategory {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRepository {
    pub name: String,
    pub github_url: String,
    pub category_id: i64,
    #[serde(default)]
    pub description: Option<String>,
    /// When set, a missing description defaults to the URL and a background
    /// enrichment job is queued after the insert.
    #[serde(default, rename = "auto_llm_summary")]
    pub auto_summary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRepository {
    pub name: String,
    pub github_url: String,
    pub category_id: i64,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Catalog operations over storage, wired to the enrichment coordinator for
/// auto-summary hand-off and in-progress reporting.
pub struct CatalogService {
    storage: Arc<Storage>,
    enrichment: Arc<EnrichmentCoordinator>,
    /// Base URL for derived info-card links, without a trailing slash.
    card_base_url: Option<String>,
}

impl CatalogService {
    pub fn new(
        storage: Arc<Storage>,
        enrichment: Arc<EnrichmentCoordinator>,
        card_base_url: Option<String>,
    ) -> Self {
        Self {
            storage,
            enrichment,
            card_base_url: card_base_url.map(|base| base.trim_end_matches('/').to_string()),
        }
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    /// Create a category under an optional parent. Level is derived from the
    /// parent, never accepted from the caller.
    pub async fn create_category(&self, input: NewCategory) -> Result<Category> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(RepodexError::validation("category name cannot be empty"));
        }

        let level = match input.parent_id {
            Some(parent_id) => {
                let parent = self
                    .storage
                    .get_category(parent_id)
                    .await?
                    .ok_or_else(|| RepodexError::validation("parent category does not exist"))?;
                parent.level + 1
            }
            None => 0,
        };

        if level > MAX_CATEGORY_LEVEL {
            return Err(RepodexError::validation(
                "categories are limited to three levels",
            ));
        }

        self.storage.insert_category(name, input.parent_id, level).await
    }

    /// Rename and/or reparent a category. A parent change re-derives the
    /// level and shifts every descendant by the same delta in one
    /// transaction; cycles and over-deep results are rejected before any
    /// write.
    #[instrument(skip_all, fields(category_id = id))]
    pub async fn update_category(&self, id: i64, input: UpdateCategory) -> Result<Category> {
        let category = self
            .storage
            .get_category(id)
            .await?
            .ok_or_else(|| RepodexError::not_found("category not found"))?;

        let name = input.name.trim();
        if name.is_empty() {
            return Err(RepodexError::validation("category name cannot be empty"));
        }

        if input.parent_id == category.parent_id {
            // Rename only, level untouched.
            self.storage
                .update_category_tree(id, name, category.parent_id, category.level, &[])
                .await?;
        } else {
            if input.parent_id == Some(id) {
                return Err(RepodexError::validation(
                    "a category cannot be its own parent",
                ));
            }

            let all = self.storage.list_categories().await?;
            let children_of = children_index(&all);
            let descendants = collect_descendants(id, &children_of);

            if let Some(new_parent) = input.parent_id {
                if descendants.iter().any(|d| d.id == new_parent) {
                    return Err(RepodexError::validation(
                        "a category cannot be moved under its own descendant",
                    ));
                }
            }

            let new_level = match input.parent_id {
                Some(parent_id) => {
                    let parent = self
                        .storage
                        .get_category(parent_id)
                        .await?
                        .ok_or_else(|| {
                            RepodexError::validation("parent category does not exist")
                        })?;
                    parent.level + 1
                }
                None => 0,
            };

            if new_level > MAX_CATEGORY_LEVEL {
                return Err(RepodexError::validation(
                    "categories are limited to three levels",
                ));
            }
            if new_level + subtree_depth(id, &children_of) > MAX_CATEGORY_LEVEL {
                return Err(RepodexError::validation(
                    "moving here would push subcategories past the three-level limit",
                ));
            }

            let level_diff = new_level - category.level;
            let descendant_levels: Vec<(i64, i64)> = descendants
                .iter()
                .map(|d| (d.id, d.level + level_diff))
                .collect();

            self.storage
                .update_category_tree(id, name, input.parent_id, new_level, &descendant_levels)
                .await?;
        }

        self.storage
            .get_category(id)
            .await?
            .ok_or_else(|| RepodexError::not_found("category not found"))
    }

    /// Delete a category. Blocked while it has children or repositories.
    pub async fn delete_category(&self, id: i64) -> Result<()> {
        if self.storage.get_category(id).await?.is_none() {
            return Err(RepodexError::not_found("category not found"));
        }
        if self.storage.count_children(id).await? > 0 {
            return Err(RepodexError::conflict(
                "category still has subcategories and cannot be deleted",
            ));
        }
        if self.storage.count_repositories_in_category(id).await? > 0 {
            return Err(RepodexError::conflict(
                "category still has repositories and cannot be deleted",
            ));
        }

        self.storage.delete_category(id).await
    }

    /// Build the category forest. The public variant drops every subtree
    /// with no repositories anywhere beneath it, while keeping empty
    /// intermediate nodes that connect an ancestor to a populated
    /// descendant.
    pub async fn category_tree(&self, public_only: bool) -> Result<Vec<CategoryNode>> {
        let categories = self.storage.list_categories().await?;
        let children_of = children_index(&categories);

        let mut repos_by_category: HashMap<i64, Vec<String>> = HashMap::new();
        for (category_id, name) in self.storage.repository_names_by_category().await? {
            repos_by_category.entry(category_id).or_default().push(name);
        }

        Ok(categories
            .iter()
            .filter(|c| c.parent_id.is_none())
            .filter_map(|root| build_node(root, &children_of, &repos_by_category, public_only))
            .collect())
    }

    /// Flat category list for pickers.
    pub async fn flat_categories(&self) -> Result<Vec<Category>> {
        self.storage.list_categories().await
    }

    // -----------------------------------------------------------------------
    // Repositories
    // -----------------------------------------------------------------------

    /// Catalog a new repository. With `auto_summary`, a blank description
    /// falls back to the URL as a visible placeholder and a background
    /// enrichment job is queued; the caller never waits on it.
    #[instrument(skip_all, fields(url = %input.github_url))]
    pub async fn create_repository(&self, input: NewRepository) -> Result<Repository> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(RepodexError::validation("repository name cannot be empty"));
        }

        let github_url = input.github_url.trim().to_string();
        let description = input
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let description = if input.auto_summary {
            description.unwrap_or_else(|| github_url.clone())
        } else {
            description.ok_or_else(|| {
                RepodexError::validation("repository description cannot be empty")
            })?
        };

        let (owner, repo_name) = parse_github_url(&github_url)?;

        if self.storage.get_category(input.category_id).await?.is_none() {
            return Err(RepodexError::validation("category does not exist"));
        }
        if self.storage.get_repository_by_url(&github_url).await?.is_some() {
            return Err(RepodexError::conflict(
                "this repository is already cataloged",
            ));
        }

        let repo = self
            .storage
            .insert_repository(
                name,
                &github_url,
                &owner,
                &repo_name,
                input.category_id,
                Some(&description),
            )
            .await?;

        if input.auto_summary {
            self.enrichment.spawn(repo.id, repo.github_url.clone());
        }

        Ok(repo)
    }

    /// Update a repository in place. Enrichment is not re-triggered.
    pub async fn update_repository(&self, id: i64, input: UpdateRepository) -> Result<Repository> {
        if self.storage.get_repository(id).await?.is_none() {
            return Err(RepodexError::not_found("repository not found"));
        }

        let name = input.name.trim();
        if name.is_empty() {
            return Err(RepodexError::validation("repository name cannot be empty"));
        }
        let description = input
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| RepodexError::validation("repository description cannot be empty"))?;

        let github_url = input.github_url.trim().to_string();
        let (owner, repo_name) = parse_github_url(&github_url)?;

        if self.storage.get_category(input.category_id).await?.is_none() {
            return Err(RepodexError::validation("category does not exist"));
        }
        if let Some(existing) = self.storage.get_repository_by_url(&github_url).await? {
            if existing.id != id {
                return Err(RepodexError::conflict(
                    "another repository already uses this URL",
                ));
            }
        }

        self.storage
            .update_repository(
                id,
                name,
                &github_url,
                &owner,
                &repo_name,
                input.category_id,
                Some(description),
            )
            .await?;

        self.storage
            .get_repository(id)
            .await?
            .ok_or_else(|| RepodexError::not_found("repository not found"))
    }

    /// Delete a repository.
    pub async fn delete_repository(&self, id: i64) -> Result<()> {
        if self.storage.get_repository(id).await?.is_none() {
            return Err(RepodexError::not_found("repository not found"));
        }
        self.storage.delete_repository(id).await
    }

    /// Paginated repository listing, newest first, projected with category
    /// paths and live processing flags.
    pub async fn list_repositories(
        &self,
        query: Option<&str>,
        category_id: Option<i64>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<RepositoryView>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let query = query.map(str::trim).filter(|q| !q.is_empty());

        let total = self.storage.count_repositories(query, category_id).await?;
        let offset = u64::from(page - 1) * u64::from(page_size);
        let rows = self
            .storage
            .list_repositories(query, category_id, offset, u64::from(page_size))
            .await?;

        let categories: HashMap<i64, Category> = self
            .storage
            .list_categories()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let items = rows
            .into_iter()
            .map(|repo| self.project(repo, &categories))
            .collect();

        Ok(Page {
            items,
            total,
            page,
            page_size,
            has_more: u64::from(page) * u64::from(page_size) < total,
        })
    }

    /// Project a repository row into its API view, resolving the ancestor
    /// path root-first.
    fn project(&self, repo: Repository, categories: &HashMap<i64, Category>) -> RepositoryView {
        let mut path = Vec::new();
        let mut cursor = categories.get(&repo.category_id);
        while let Some(category) = cursor {
            path.push(CategoryPathEntry {
                id: category.id,
                name: category.name.clone(),
                level: category.level,
            });
            cursor = category.parent_id.and_then(|pid| categories.get(&pid));
        }
        path.reverse();

        let card_url = self
            .card_base_url
            .as_deref()
            .map(|base| format!("{base}/github/{}/{}", repo.owner, repo.repo_name));

        RepositoryView {
            id: repo.id,
            name: repo.name,
            owner: repo.owner,
            repo_name: repo.repo_name,
            github_url: repo.github_url,
            category_id: repo.category_id,
            category_name: categories.get(&repo.category_id).map(|c| c.name.clone()),
            category_path: path,
            card_url,
            description: repo.description,
            is_processing: self.enrichment.is_in_progress(repo.id),
            added_at: repo.added_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

/// Index categories by parent id.
fn children_index(categories: &[Category]) -> HashMap<i64, Vec<&Category>> {
    let mut index: HashMap<i64, Vec<&Category>> = HashMap::new();
    for category in categories {
        if let Some(parent_id) = category.parent_id {
            index.entry(parent_id).or_default().push(category);
        }
    }
    index
}

/// Collect every descendant of a category, depth-first.
fn collect_descendants(id: i64, children_of: &HashMap<i64, Vec<&Category>>) -> Vec<Category> {
    let mut out = Vec::new();
    if let Some(children) = children_of.get(&id) {
        for child in children {
            out.push((*child).clone());
            out.extend(collect_descendants(child.id, children_of));
        }
    }
    out
}

/// Depth of the subtree below a category (0 for a leaf).
fn subtree_depth(id: i64, children_of: &HashMap<i64, Vec<&Category>>) -> i64 {
    children_of
        .get(&id)
        .map(|children| {
            children
                .iter()
                .map(|child| 1 + subtree_depth(child.id, children_of))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

/// Build one rendered tree node. Returns `None` when pruning for the public
/// view and no repository exists anywhere in the subtree.
fn build_node(
    category: &Category,
    children_of: &HashMap<i64, Vec<&Category>>,
    repos_by_category: &HashMap<i64, Vec<String>>,
    public_only: bool,
) -> Option<CategoryNode> {
    let repositories: Vec<RepositoryName> = repos_by_category
        .get(&category.id)
        .map(|names| {
            names
                .iter()
                .map(|name| RepositoryName { name: name.clone() })
                .collect()
        })
        .unwrap_or_default();

    let mut children = Vec::new();
    if let Some(kids) = children_of.get(&category.id) {
        for kid in kids {
            if let Some(node) = build_node(kid, children_of, repos_by_category, public_only) {
                children.push(node);
            }
        }
    }

    if public_only && repositories.is_empty() && children.is_empty() {
        return None;
    }

    Some(CategoryNode {
        id: category.id,
        name: category.name.clone(),
        repo_count: repositories.len(),
        child_count: children.len(),
        repositories,
        children,
    })
}
