use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{ArticleId, CategoryId, CommentId, Role, TagId, UserId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// A fully materialized article row: author username and category name are
/// resolved at query time so callers never depend on follow-up fetches.
#[derive(Debug, Clone)]
pub struct StoredArticle {
    pub article_id: ArticleId,
    pub title: String,
    pub content: String,
    pub author_id: UserId,
    pub author_username: String,
    pub category_id: CategoryId,
    pub category_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTag {
    pub tag_id: TagId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct StoredCategory {
    pub category_id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct StoredComment {
    pub comment_id: CommentId,
    pub author_id: UserId,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Splits free-text tag input on commas and spaces, lower-cases each
/// fragment, and drops duplicates keeping first occurrence. Empty fragments
/// from consecutive separators are discarded; fragments are not trimmed
/// beyond the split itself.
pub fn normalize_tag_input(raw: &str) -> Vec<String> {
    let mut names = Vec::new();
    for fragment in raw.split([',', ' ']) {
        if fragment.is_empty() {
            continue;
        }
        let name = fragment.to_lowercase();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username) VALUES (?)
             ON CONFLICT(username) DO UPDATE SET username=excluded.username
             RETURNING id",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn username_for_user(&self, user_id: UserId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT username FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn user_role(&self, user_id: UserId) -> Result<Option<Role>> {
        let row = sqlx::query("SELECT role FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| role_from_str(&r.get::<String, _>(0))))
    }

    pub async fn set_user_role(&self, user_id: UserId, role: Role) -> Result<()> {
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_category(&self, name: &str) -> Result<CategoryId> {
        let rec = sqlx::query(
            "INSERT INTO categories (name) VALUES (?)
             ON CONFLICT(name) DO UPDATE SET name=excluded.name
             RETURNING id",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(CategoryId(rec.get::<i64, _>(0)))
    }

    pub async fn list_categories(&self) -> Result<Vec<StoredCategory>> {
        let rows = sqlx::query("SELECT id, name FROM categories ORDER BY lower(name) ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| StoredCategory {
                category_id: CategoryId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
            })
            .collect())
    }

    pub async fn category_exists(&self, category_id: CategoryId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM categories WHERE id = ?")
            .bind(category_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn insert_article(
        &self,
        author_id: UserId,
        title: &str,
        content: &str,
        category_id: CategoryId,
    ) -> Result<ArticleId> {
        let rec = sqlx::query(
            "INSERT INTO articles (author_user_id, category_id, title, content)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(author_id.0)
        .bind(category_id.0)
        .bind(title)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(ArticleId(rec.get::<i64, _>(0)))
    }

    pub async fn load_article(&self, article_id: ArticleId) -> Result<Option<StoredArticle>> {
        let row = sqlx::query(
            "SELECT a.id, a.title, a.content, a.author_user_id, u.username,
                    a.category_id, c.name, a.created_at
             FROM articles a
             INNER JOIN users u ON u.id = a.author_user_id
             INNER JOIN categories c ON c.id = a.category_id
             WHERE a.id = ?",
        )
        .bind(article_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(stored_article_from_row))
    }

    pub async fn list_articles(&self) -> Result<Vec<StoredArticle>> {
        let rows = sqlx::query(
            "SELECT a.id, a.title, a.content, a.author_user_id, u.username,
                    a.category_id, c.name, a.created_at
             FROM articles a
             INNER JOIN users u ON u.id = a.author_user_id
             INNER JOIN categories c ON c.id = a.category_id
             ORDER BY a.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(stored_article_from_row).collect())
    }

    /// Cheap authorship lookup for the authorization predicate; avoids
    /// materializing the whole article just to check ownership.
    pub async fn article_author(&self, article_id: ArticleId) -> Result<Option<UserId>> {
        let row = sqlx::query("SELECT author_user_id FROM articles WHERE id = ?")
            .bind(article_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserId(r.get::<i64, _>(0))))
    }

    /// Overwrites title, content, and category. The author column is
    /// deliberately untouched; authorship never changes after creation.
    pub async fn update_article(
        &self,
        article_id: ArticleId,
        title: &str,
        content: &str,
        category_id: CategoryId,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE articles SET title = ?, content = ?, category_id = ? WHERE id = ?",
        )
        .bind(title)
        .bind(content)
        .bind(category_id.0)
        .bind(article_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    pub async fn delete_article(&self, article_id: ArticleId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(article_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn find_tag(&self, name: &str) -> Result<Option<StoredTag>> {
        let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| StoredTag {
            tag_id: TagId(r.get::<i64, _>(0)),
            name: r.get::<String, _>(1),
        }))
    }

    pub async fn tags_for_article(&self, article_id: ArticleId) -> Result<Vec<StoredTag>> {
        let rows = sqlx::query(
            "SELECT t.id, t.name
             FROM article_tags at
             INNER JOIN tags t ON t.id = at.tag_id
             WHERE at.article_id = ?
             ORDER BY t.name ASC",
        )
        .bind(article_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| StoredTag {
                tag_id: TagId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
            })
            .collect())
    }

    /// Replaces the article's entire tag association with the given
    /// normalized names, creating tags that do not exist yet.
    ///
    /// Each name is upserted against the UNIQUE constraint, so two requests
    /// introducing the same new name concurrently both resolve to the same
    /// row instead of one of them failing. The old links are dropped and the
    /// new set written inside one transaction: a full overwrite, never a
    /// union with the previous set.
    pub async fn set_article_tags(
        &self,
        article_id: ArticleId,
        names: &[String],
    ) -> Result<Vec<StoredTag>> {
        let mut tx = self.pool.begin().await?;

        let mut tags = Vec::with_capacity(names.len());
        for name in names {
            let rec = sqlx::query(
                "INSERT INTO tags (name) VALUES (?)
                 ON CONFLICT(name) DO UPDATE SET name=excluded.name
                 RETURNING id, name",
            )
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;
            tags.push(StoredTag {
                tag_id: TagId(rec.get::<i64, _>(0)),
                name: rec.get::<String, _>(1),
            });
        }

        sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
            .bind(article_id.0)
            .execute(&mut *tx)
            .await?;

        for tag in &tags {
            sqlx::query("INSERT INTO article_tags (article_id, tag_id) VALUES (?, ?)")
                .bind(article_id.0)
                .bind(tag.tag_id.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(tags)
    }

    pub async fn insert_comment(
        &self,
        article_id: ArticleId,
        author_id: UserId,
        content: &str,
    ) -> Result<CommentId> {
        let rec = sqlx::query(
            "INSERT INTO comments (article_id, author_user_id, content)
             VALUES (?, ?, ?)
             RETURNING id",
        )
        .bind(article_id.0)
        .bind(author_id.0)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(CommentId(rec.get::<i64, _>(0)))
    }

    pub async fn comments_for_article(&self, article_id: ArticleId) -> Result<Vec<StoredComment>> {
        let rows = sqlx::query(
            "SELECT c.id, c.author_user_id, u.username, c.content, c.created_at
             FROM comments c
             INNER JOIN users u ON u.id = c.author_user_id
             WHERE c.article_id = ?
             ORDER BY c.id ASC",
        )
        .bind(article_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| StoredComment {
                comment_id: CommentId(r.get::<i64, _>(0)),
                author_id: UserId(r.get::<i64, _>(1)),
                author_username: r.get::<String, _>(2),
                content: r.get::<String, _>(3),
                created_at: r.get::<DateTime<Utc>, _>(4),
            })
            .collect())
    }
}

fn stored_article_from_row(r: sqlx::sqlite::SqliteRow) -> StoredArticle {
    StoredArticle {
        article_id: ArticleId(r.get::<i64, _>(0)),
        title: r.get::<String, _>(1),
        content: r.get::<String, _>(2),
        author_id: UserId(r.get::<i64, _>(3)),
        author_username: r.get::<String, _>(4),
        category_id: CategoryId(r.get::<i64, _>(5)),
        category_name: r.get::<String, _>(6),
        created_at: r.get::<DateTime<Utc>, _>(7),
    }
}

fn role_from_str(raw: &str) -> Role {
    match raw {
        "admin" => Role::Admin,
        _ => Role::Member,
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
