use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ArticleId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{ArticleDetail, ArticleDraft, ArticleForm, ArticleSummary, CategorySummary, CommentPayload},
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

mod api;
mod config;

use api::ApiContext;
use config::{load_settings, normalize_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    user_id: i64,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: i64,
}

#[derive(Debug, Deserialize)]
struct CommentRequest {
    user_id: i64,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CreateCategoryRequest {
    user_id: i64,
    name: String,
}

const MAX_BODY_BYTES: usize = 256 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|err| {
        error!(
            %database_url,
            %err,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        err
    })?;

    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "blog server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/articles", get(http_list_articles).post(http_create_article))
        .route("/articles/new", get(http_new_article_form))
        .route("/articles/:article_id", get(http_article_detail))
        .route("/articles/:article_id", put(http_update_article))
        .route("/articles/:article_id", delete(http_delete_article))
        .route("/articles/:article_id/edit", get(http_edit_article_form))
        .route("/articles/:article_id/delete", get(http_delete_confirmation))
        .route("/articles/:article_id/comments", post(http_add_comment))
        .route(
            "/categories",
            get(http_list_categories).post(http_create_category),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn error_response(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<ApiError>)> {
    if req.username.trim().is_empty() {
        return Err(error_response(ApiError::new(
            ErrorCode::Validation,
            "username cannot be empty",
        )));
    }
    let user_id = state
        .api
        .storage
        .create_user(&req.username)
        .await
        .map_err(|e| error_response(ApiError::new(ErrorCode::Internal, e.to_string())))?;
    Ok(Json(LoginResponse { user_id: user_id.0 }))
}

async fn http_list_articles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ArticleSummary>>, (StatusCode, Json<ApiError>)> {
    let articles = api::list_articles(&state.api).await.map_err(error_response)?;
    Ok(Json(articles))
}

async fn http_article_detail(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<i64>,
) -> Result<Json<ArticleDetail>, (StatusCode, Json<ApiError>)> {
    let detail = api::article_detail(&state.api, ArticleId(article_id))
        .await
        .map_err(error_response)?;
    Ok(Json(detail))
}

async fn http_new_article_form(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ArticleForm>, (StatusCode, Json<ApiError>)> {
    let form = api::new_article_form(&state.api)
        .await
        .map_err(error_response)?;
    Ok(Json(form))
}

async fn http_create_article(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
    Json(draft): Json<ArticleDraft>,
) -> Result<(StatusCode, Json<ArticleDetail>), (StatusCode, Json<ApiError>)> {
    let detail = api::create_article(&state.api, UserId(q.user_id), &draft)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn http_edit_article_form(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> Result<Json<ArticleForm>, (StatusCode, Json<ApiError>)> {
    let form = api::edit_article_form(&state.api, UserId(q.user_id), ArticleId(article_id))
        .await
        .map_err(error_response)?;
    Ok(Json(form))
}

async fn http_update_article(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<i64>,
    Query(q): Query<UserQuery>,
    Json(draft): Json<ArticleDraft>,
) -> Result<Json<ArticleDetail>, (StatusCode, Json<ApiError>)> {
    let detail = api::update_article(&state.api, UserId(q.user_id), ArticleId(article_id), &draft)
        .await
        .map_err(error_response)?;
    Ok(Json(detail))
}

async fn http_delete_confirmation(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> Result<Json<ArticleDetail>, (StatusCode, Json<ApiError>)> {
    let detail = api::delete_confirmation(&state.api, UserId(q.user_id), ArticleId(article_id))
        .await
        .map_err(error_response)?;
    Ok(Json(detail))
}

async fn http_delete_article(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    api::delete_article(&state.api, UserId(q.user_id), ArticleId(article_id))
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_add_comment(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> Result<(StatusCode, Json<CommentPayload>), (StatusCode, Json<ApiError>)> {
    let comment = api::add_comment(
        &state.api,
        UserId(req.user_id),
        ArticleId(article_id),
        &req.content,
    )
    .await
    .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn http_list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategorySummary>>, (StatusCode, Json<ApiError>)> {
    let categories = api::list_categories(&state.api)
        .await
        .map_err(error_response)?;
    Ok(Json(categories))
}

async fn http_create_category(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategorySummary>), (StatusCode, Json<ApiError>)> {
    let category = api::create_category(&state.api, UserId(req.user_id), &req.name)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(category)))
}
