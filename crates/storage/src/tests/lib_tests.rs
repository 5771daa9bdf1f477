use super::*;

async fn seeded() -> (Storage, UserId, CategoryId) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user("alice").await.expect("user");
    let category = storage.create_category("Tech").await.expect("category");
    (storage, user, category)
}

#[test]
fn normalizes_and_deduplicates_tag_input() {
    assert_eq!(normalize_tag_input("Go, go GO"), vec!["go"]);
    assert_eq!(normalize_tag_input("rust,wasm cli"), vec!["rust", "wasm", "cli"]);
}

#[test]
fn separator_only_input_yields_no_tags() {
    assert!(normalize_tag_input("").is_empty());
    assert!(normalize_tag_input(", ,,  , ").is_empty());
}

#[test]
fn consecutive_separators_produce_no_empty_fragments() {
    assert_eq!(normalize_tag_input("a,,  b"), vec!["a", "b"]);
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("blog_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("blog.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn creating_user_twice_returns_same_id() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage.create_user("carol").await.expect("user");
    let second = storage.create_user("carol").await.expect("user again");
    assert_eq!(first, second);
}

#[tokio::test]
async fn users_default_to_member_role() {
    let (storage, user, _) = seeded().await;
    let role = storage.user_role(user).await.expect("role");
    assert_eq!(role, Some(Role::Member));

    storage
        .set_user_role(user, Role::Admin)
        .await
        .expect("promote");
    let role = storage.user_role(user).await.expect("role");
    assert_eq!(role, Some(Role::Admin));
}

#[tokio::test]
async fn lists_categories_ordered_by_name() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.create_category("Travel").await.expect("category");
    storage.create_category("cooking").await.expect("category");
    storage.create_category("Art").await.expect("category");

    let categories = storage.list_categories().await.expect("list");
    let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Art", "cooking", "Travel"]);
}

#[tokio::test]
async fn stores_and_loads_article_with_author_and_category() {
    let (storage, user, category) = seeded().await;
    let article = storage
        .insert_article(user, "First post", "hello world", category)
        .await
        .expect("article");

    let loaded = storage
        .load_article(article)
        .await
        .expect("load")
        .expect("exists");
    assert_eq!(loaded.title, "First post");
    assert_eq!(loaded.author_id, user);
    assert_eq!(loaded.author_username, "alice");
    assert_eq!(loaded.category_name, "Tech");
}

#[tokio::test]
async fn update_overwrites_fields_but_not_author() {
    let (storage, user, category) = seeded().await;
    let other_category = storage.create_category("Life").await.expect("category");
    let article = storage
        .insert_article(user, "Draft", "wip", category)
        .await
        .expect("article");

    let updated = storage
        .update_article(article, "Final", "done", other_category)
        .await
        .expect("update");
    assert!(updated);

    let loaded = storage
        .load_article(article)
        .await
        .expect("load")
        .expect("exists");
    assert_eq!(loaded.title, "Final");
    assert_eq!(loaded.category_id, other_category);
    assert_eq!(loaded.author_id, user);
}

#[tokio::test]
async fn update_of_missing_article_reports_no_rows() {
    let (storage, _, category) = seeded().await;
    let updated = storage
        .update_article(ArticleId(999), "x", "y", category)
        .await
        .expect("update");
    assert!(!updated);
}

#[tokio::test]
async fn reconciles_empty_input_to_empty_tag_set() {
    let (storage, user, category) = seeded().await;
    let article = storage
        .insert_article(user, "t", "c", category)
        .await
        .expect("article");

    let tags = storage
        .set_article_tags(article, &normalize_tag_input(", ,  ,"))
        .await
        .expect("reconcile");
    assert!(tags.is_empty());
    assert!(storage
        .tags_for_article(article)
        .await
        .expect("tags")
        .is_empty());
}

#[tokio::test]
async fn repeated_fragments_create_a_single_tag() {
    let (storage, user, category) = seeded().await;
    let article = storage
        .insert_article(user, "t", "c", category)
        .await
        .expect("article");

    let tags = storage
        .set_article_tags(article, &normalize_tag_input("Go, go GO"))
        .await
        .expect("reconcile");
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "go");
}

#[tokio::test]
async fn existing_tag_is_reused_not_duplicated() {
    let (storage, user, category) = seeded().await;
    let article = storage
        .insert_article(user, "t", "c", category)
        .await
        .expect("article");

    let first = storage
        .set_article_tags(article, &normalize_tag_input("rust"))
        .await
        .expect("reconcile");
    let second = storage
        .set_article_tags(article, &normalize_tag_input("Rust"))
        .await
        .expect("reconcile again");
    assert_eq!(first[0].tag_id, second[0].tag_id);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE name = 'rust'")
        .fetch_one(storage.pool())
        .await
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn unseen_tag_name_creates_exactly_one_tag() {
    let (storage, user, category) = seeded().await;
    let article = storage
        .insert_article(user, "t", "c", category)
        .await
        .expect("article");

    assert!(storage.find_tag("wasm").await.expect("find").is_none());
    let tags = storage
        .set_article_tags(article, &normalize_tag_input("wasm"))
        .await
        .expect("reconcile");
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "wasm");
    assert!(storage.find_tag("wasm").await.expect("find").is_some());
}

#[tokio::test]
async fn second_reconciliation_fully_overwrites_the_first() {
    let (storage, user, category) = seeded().await;
    let article = storage
        .insert_article(user, "t", "c", category)
        .await
        .expect("article");

    storage
        .set_article_tags(article, &normalize_tag_input("a,b"))
        .await
        .expect("first");
    storage
        .set_article_tags(article, &normalize_tag_input("c"))
        .await
        .expect("second");

    let names: Vec<String> = storage
        .tags_for_article(article)
        .await
        .expect("tags")
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["c"]);

    // Orphaned tags are never deleted by reconciliation.
    assert!(storage.find_tag("a").await.expect("find").is_some());
}

#[tokio::test]
async fn concurrent_reconciliation_of_same_new_name_is_race_safe() {
    let (storage, user, category) = seeded().await;
    let left_article = storage
        .insert_article(user, "left", "c", category)
        .await
        .expect("article");
    let right_article = storage
        .insert_article(user, "right", "c", category)
        .await
        .expect("article");

    let storage_a = storage.clone();
    let storage_b = storage.clone();
    let names = normalize_tag_input("shiny");
    let names_b = names.clone();
    let (left, right) = tokio::join!(
        async move {
            storage_a
                .set_article_tags(left_article, &names)
                .await
                .expect("left reconcile")
        },
        async move {
            storage_b
                .set_article_tags(right_article, &names_b)
                .await
                .expect("right reconcile")
        }
    );

    assert_eq!(left[0].tag_id, right[0].tag_id);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE name = 'shiny'")
        .fetch_one(storage.pool())
        .await
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn deleting_article_cascades_links_and_comments_but_keeps_tags() {
    let (storage, user, category) = seeded().await;
    let article = storage
        .insert_article(user, "t", "c", category)
        .await
        .expect("article");
    storage
        .set_article_tags(article, &normalize_tag_input("keepme"))
        .await
        .expect("reconcile");
    storage
        .insert_comment(article, user, "nice post")
        .await
        .expect("comment");

    let deleted = storage.delete_article(article).await.expect("delete");
    assert!(deleted);
    assert!(storage.load_article(article).await.expect("load").is_none());

    let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article_tags")
        .fetch_one(storage.pool())
        .await
        .expect("links");
    assert_eq!(links, 0);
    let comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
        .fetch_one(storage.pool())
        .await
        .expect("comments");
    assert_eq!(comments, 0);
    assert!(storage.find_tag("keepme").await.expect("find").is_some());
}

#[tokio::test]
async fn comments_are_returned_in_insertion_order() {
    let (storage, user, category) = seeded().await;
    let article = storage
        .insert_article(user, "t", "c", category)
        .await
        .expect("article");
    let bob = storage.create_user("bob").await.expect("user");

    storage
        .insert_comment(article, user, "first")
        .await
        .expect("comment");
    storage
        .insert_comment(article, bob, "second")
        .await
        .expect("comment");

    let comments = storage
        .comments_for_article(article)
        .await
        .expect("comments");
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].content, "first");
    assert_eq!(comments[1].author_username, "bob");
    assert!(comments[0].created_at <= Utc::now());
}
