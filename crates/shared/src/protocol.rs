use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ArticleId, CategoryId, CommentId, TagId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSummary {
    pub tag_id: TagId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category_id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub article_id: ArticleId,
    pub title: String,
    pub author_id: UserId,
    pub author_username: String,
    pub category: CategorySummary,
    pub tags: Vec<TagSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentPayload {
    pub comment_id: CommentId,
    pub author_id: UserId,
    pub author_username: String,
    pub content: String,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDetail {
    pub article_id: ArticleId,
    pub title: String,
    pub content: String,
    pub author_id: UserId,
    pub author_username: String,
    pub category: CategorySummary,
    pub tags: Vec<TagSummary>,
    pub comments: Vec<CommentPayload>,
    pub created_at: DateTime<Utc>,
}

/// Form payload for the create/edit views: current field values plus the
/// category list the form renders, with the tag set flattened back to the
/// free-text string the user edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleForm {
    pub article_id: Option<ArticleId>,
    pub title: String,
    pub content: String,
    pub category_id: Option<CategoryId>,
    pub tags: String,
    pub categories: Vec<CategorySummary>,
}

/// A validated create/update submission. `tags` is the raw free-text tag
/// string; reconciliation happens server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    pub content: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub tags: String,
}
