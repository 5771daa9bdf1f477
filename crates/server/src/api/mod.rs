use shared::{
    domain::{ArticleId, CommentId, Role, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        ArticleDetail, ArticleDraft, ArticleForm, ArticleSummary, CategorySummary, CommentPayload,
        TagSummary,
    },
};
use storage::{normalize_tag_input, Storage, StoredArticle, StoredTag};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// The authorization predicate gating edit and delete: admins may modify
/// anything, authors may always modify their own articles.
pub fn can_modify_article(role: Role, author_id: UserId, user_id: UserId) -> bool {
    role == Role::Admin || user_id == author_id
}

pub async fn list_articles(ctx: &ApiContext) -> Result<Vec<ArticleSummary>, ApiError> {
    let articles = ctx.storage.list_articles().await.map_err(internal)?;

    let mut summaries = Vec::with_capacity(articles.len());
    for article in articles {
        let tags = ctx
            .storage
            .tags_for_article(article.article_id)
            .await
            .map_err(internal)?;
        summaries.push(ArticleSummary {
            article_id: article.article_id,
            title: article.title,
            author_id: article.author_id,
            author_username: article.author_username,
            category: CategorySummary {
                category_id: article.category_id,
                name: article.category_name,
            },
            tags: tag_summaries(tags),
        });
    }
    Ok(summaries)
}

pub async fn article_detail(
    ctx: &ApiContext,
    article_id: ArticleId,
) -> Result<ArticleDetail, ApiError> {
    let article = load_existing(ctx, article_id).await?;
    materialize_detail(ctx, article).await
}

pub async fn new_article_form(ctx: &ApiContext) -> Result<ArticleForm, ApiError> {
    Ok(ArticleForm {
        article_id: None,
        title: String::new(),
        content: String::new(),
        category_id: None,
        tags: String::new(),
        categories: category_summaries(ctx).await?,
    })
}

pub async fn create_article(
    ctx: &ApiContext,
    user_id: UserId,
    draft: &ArticleDraft,
) -> Result<ArticleDetail, ApiError> {
    require_user(ctx, user_id).await?;
    validate_draft(ctx, draft).await?;

    let article_id = ctx
        .storage
        .insert_article(user_id, &draft.title, &draft.content, draft.category_id)
        .await
        .map_err(internal)?;
    ctx.storage
        .set_article_tags(article_id, &normalize_tag_input(&draft.tags))
        .await
        .map_err(internal)?;

    let article = load_existing(ctx, article_id).await?;
    materialize_detail(ctx, article).await
}

pub async fn edit_article_form(
    ctx: &ApiContext,
    user_id: UserId,
    article_id: ArticleId,
) -> Result<ArticleForm, ApiError> {
    let article = load_existing(ctx, article_id).await?;
    ensure_can_modify(ctx, user_id, article.author_id).await?;

    let tags = ctx
        .storage
        .tags_for_article(article_id)
        .await
        .map_err(internal)?;
    let tags_string = tags
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Ok(ArticleForm {
        article_id: Some(article_id),
        title: article.title,
        content: article.content,
        category_id: Some(article.category_id),
        tags: tags_string,
        categories: category_summaries(ctx).await?,
    })
}

pub async fn update_article(
    ctx: &ApiContext,
    user_id: UserId,
    article_id: ArticleId,
    draft: &ArticleDraft,
) -> Result<ArticleDetail, ApiError> {
    let article = load_existing(ctx, article_id).await?;
    ensure_can_modify(ctx, user_id, article.author_id).await?;
    validate_draft(ctx, draft).await?;

    ctx.storage
        .update_article(article_id, &draft.title, &draft.content, draft.category_id)
        .await
        .map_err(internal)?;
    ctx.storage
        .set_article_tags(article_id, &normalize_tag_input(&draft.tags))
        .await
        .map_err(internal)?;

    let article = load_existing(ctx, article_id).await?;
    materialize_detail(ctx, article).await
}

/// Materialized payload for the delete-confirmation step; gated by the same
/// predicate as the delete itself.
pub async fn delete_confirmation(
    ctx: &ApiContext,
    user_id: UserId,
    article_id: ArticleId,
) -> Result<ArticleDetail, ApiError> {
    let article = load_existing(ctx, article_id).await?;
    ensure_can_modify(ctx, user_id, article.author_id).await?;
    materialize_detail(ctx, article).await
}

pub async fn delete_article(
    ctx: &ApiContext,
    user_id: UserId,
    article_id: ArticleId,
) -> Result<(), ApiError> {
    let article = load_existing(ctx, article_id).await?;
    ensure_can_modify(ctx, user_id, article.author_id).await?;

    ctx.storage
        .delete_article(article_id)
        .await
        .map_err(internal)?;
    Ok(())
}

pub async fn add_comment(
    ctx: &ApiContext,
    user_id: UserId,
    article_id: ArticleId,
    content: &str,
) -> Result<CommentPayload, ApiError> {
    require_user(ctx, user_id).await?;
    load_existing(ctx, article_id).await?;
    if content.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "comment content cannot be empty",
        ));
    }

    let comment_id = ctx
        .storage
        .insert_comment(article_id, user_id, content)
        .await
        .map_err(internal)?;
    find_comment(ctx, article_id, comment_id).await
}

pub async fn list_categories(ctx: &ApiContext) -> Result<Vec<CategorySummary>, ApiError> {
    category_summaries(ctx).await
}

pub async fn create_category(
    ctx: &ApiContext,
    user_id: UserId,
    name: &str,
) -> Result<CategorySummary, ApiError> {
    let role = require_user(ctx, user_id).await?;
    if role != Role::Admin {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "only admins may manage categories",
        ));
    }
    if name.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "category name cannot be empty",
        ));
    }

    let category_id = ctx
        .storage
        .create_category(name)
        .await
        .map_err(internal)?;
    Ok(CategorySummary {
        category_id,
        name: name.to_string(),
    })
}

async fn require_user(ctx: &ApiContext, user_id: UserId) -> Result<Role, ApiError> {
    ctx.storage
        .user_role(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "unknown user"))
}

async fn ensure_can_modify(
    ctx: &ApiContext,
    user_id: UserId,
    author_id: UserId,
) -> Result<(), ApiError> {
    let role = require_user(ctx, user_id).await?;
    if !can_modify_article(role, author_id, user_id) {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "user is neither an admin nor the article's author",
        ));
    }
    Ok(())
}

async fn load_existing(ctx: &ApiContext, article_id: ArticleId) -> Result<StoredArticle, ApiError> {
    ctx.storage
        .load_article(article_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "article not found"))
}

async fn validate_draft(ctx: &ApiContext, draft: &ArticleDraft) -> Result<(), ApiError> {
    if draft.title.trim().is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "title cannot be empty"));
    }
    if draft.content.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "content cannot be empty",
        ));
    }
    let known = ctx
        .storage
        .category_exists(draft.category_id)
        .await
        .map_err(internal)?;
    if !known {
        return Err(ApiError::new(ErrorCode::Validation, "unknown category"));
    }
    Ok(())
}

async fn materialize_detail(
    ctx: &ApiContext,
    article: StoredArticle,
) -> Result<ArticleDetail, ApiError> {
    let tags = ctx
        .storage
        .tags_for_article(article.article_id)
        .await
        .map_err(internal)?;
    let comments = ctx
        .storage
        .comments_for_article(article.article_id)
        .await
        .map_err(internal)?;

    Ok(ArticleDetail {
        article_id: article.article_id,
        title: article.title,
        content: article.content,
        author_id: article.author_id,
        author_username: article.author_username,
        category: CategorySummary {
            category_id: article.category_id,
            name: article.category_name,
        },
        tags: tag_summaries(tags),
        comments: comments
            .into_iter()
            .map(|c| CommentPayload {
                comment_id: c.comment_id,
                author_id: c.author_id,
                author_username: c.author_username,
                content: c.content,
                posted_at: c.created_at,
            })
            .collect(),
        created_at: article.created_at,
    })
}

async fn find_comment(
    ctx: &ApiContext,
    article_id: ArticleId,
    comment_id: CommentId,
) -> Result<CommentPayload, ApiError> {
    let comment = ctx
        .storage
        .comments_for_article(article_id)
        .await
        .map_err(internal)?
        .into_iter()
        .find(|c| c.comment_id == comment_id)
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "comment vanished after insert"))?;
    Ok(CommentPayload {
        comment_id: comment.comment_id,
        author_id: comment.author_id,
        author_username: comment.author_username,
        content: comment.content,
        posted_at: comment.created_at,
    })
}

async fn category_summaries(ctx: &ApiContext) -> Result<Vec<CategorySummary>, ApiError> {
    let categories = ctx.storage.list_categories().await.map_err(internal)?;
    Ok(categories
        .into_iter()
        .map(|c| CategorySummary {
            category_id: c.category_id,
            name: c.name,
        })
        .collect())
}

fn tag_summaries(tags: Vec<StoredTag>) -> Vec<TagSummary> {
    tags.into_iter()
        .map(|t| TagSummary {
            tag_id: t.tag_id,
            name: t.name,
        })
        .collect()
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
