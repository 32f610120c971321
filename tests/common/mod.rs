//! Shared fixture: a small blog schema over the in-memory source

use std::sync::Arc;

use serde_json::json;

use relatable::{
    FieldRelation, MemorySource, ModelType, PivotRelation, RelationRegistry, SharedRecord,
};

pub fn user_type() -> ModelType {
    ModelType::new("User", "users")
}

pub fn post_type() -> ModelType {
    ModelType::new("Post", "posts")
}

pub fn category_type() -> ModelType {
    ModelType::new("Category", "categories")
}

pub fn tag_type() -> ModelType {
    ModelType::new("Tag", "tags")
}

/// Users 11..13 (13 has no posts), posts 1..3 (post 3 uncategorized),
/// a category tree with one mutual-parent cycle (9 <-> 10), and two tags
/// shared across posts through a pivot.
pub fn seeded_source() -> MemorySource {
    let mut source = MemorySource::new();

    source.insert("users", json!({"id": 11, "name": "ada"}));
    source.insert("users", json!({"id": 12, "name": "brian"}));
    source.insert("users", json!({"id": 13, "name": "clara"}));

    source.insert("posts", json!({"id": 1, "author_id": 11, "category_id": 1, "title": "intro"}));
    source.insert("posts", json!({"id": 2, "author_id": 11, "category_id": 2, "title": "followup"}));
    source.insert("posts", json!({"id": 3, "author_id": 12, "category_id": null, "title": "draft"}));

    source.insert("categories", json!({"id": 1, "parent_id": null, "name": "root-a"}));
    source.insert("categories", json!({"id": 2, "parent_id": null, "name": "root-b"}));
    source.insert("categories", json!({"id": 3, "parent_id": 1, "name": "a-left"}));
    source.insert("categories", json!({"id": 4, "parent_id": 1, "name": "a-right"}));
    source.insert("categories", json!({"id": 5, "parent_id": 4, "name": "a-right-1"}));
    source.insert("categories", json!({"id": 6, "parent_id": 4, "name": "a-right-2"}));
    source.insert("categories", json!({"id": 9, "parent_id": 10, "name": "loop-a"}));
    source.insert("categories", json!({"id": 10, "parent_id": 9, "name": "loop-b"}));

    source.insert("tags", json!({"id": 100, "label": "rust"}));
    source.insert("tags", json!({"id": 101, "label": "sql"}));

    source.insert("post_tag", json!({"post_id": 1, "tag_id": 100}));
    source.insert("post_tag", json!({"post_id": 1, "tag_id": 101}));
    source.insert("post_tag", json!({"post_id": 2, "tag_id": 100}));

    source.insert("follows", json!({"follower_id": 11, "followed_id": 12}));
    source.insert("follows", json!({"follower_id": 11, "followed_id": 13}));
    source.insert("follows", json!({"follower_id": 12, "followed_id": 11}));

    source
}

pub fn registry() -> RelationRegistry {
    let registry = RelationRegistry::new();

    let (user, post) = (user_type(), post_type());
    registry.declare("User", "posts", move || {
        Arc::new(FieldRelation::has_many(&user, &post, "author_id"))
    });

    let (post, user) = (post_type(), user_type());
    registry.declare("Post", "author", move || {
        Arc::new(FieldRelation::belongs_to(&post, &user, "author_id"))
    });

    let (post, category) = (post_type(), category_type());
    registry.declare("Post", "category", move || {
        Arc::new(FieldRelation::belongs_to(&post, &category, "category_id"))
    });

    let (post, tag) = (post_type(), tag_type());
    registry.declare("Post", "tags", move || {
        Arc::new(PivotRelation::new(&post, &tag, "post_tag", "post_id", "tag_id"))
    });

    let category = category_type();
    registry.declare("Category", "parent", move || {
        Arc::new(FieldRelation::belongs_to(&category, &category, "parent_id"))
    });

    let category = category_type();
    registry.declare("Category", "children", move || {
        Arc::new(FieldRelation::has_many(&category, &category, "parent_id"))
    });

    let user = user_type();
    registry.declare("User", "followees", move || {
        Arc::new(PivotRelation::new(&user, &user, "follows", "follower_id", "followed_id"))
    });

    registry
}

/// Fetch every row of `table` as shared records of `model`, ordered by id.
pub async fn all_records(
    source: &MemorySource,
    model: &ModelType,
) -> Vec<SharedRecord> {
    use relatable::{DataSource, QueryBuilder};
    let query = QueryBuilder::for_model(model).order_by("id");
    source
        .fetch_records(&query)
        .await
        .expect("fixture fetch should succeed")
}

pub fn record_ids(records: &[SharedRecord]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.field("id").and_then(|v| v.as_i64()))
        .collect()
}

pub fn find_by_id(records: &[SharedRecord], id: i64) -> SharedRecord {
    records
        .iter()
        .find(|r| r.field("id").and_then(|v| v.as_i64()) == Some(id))
        .cloned()
        .unwrap_or_else(|| panic!("no record with id {id}"))
}
