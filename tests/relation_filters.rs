//! Relation-derived query predicates evaluated against the fixture

mod common;

use relatable::{
    apply_relation_filter, DataSource, QueryBuilder, RelationFilter, Scope,
};

use common::*;

async fn matching_ids(
    source: &relatable::MemorySource,
    query: QueryBuilder,
) -> Vec<i64> {
    let records = source.fetch_records(&query.order_by("id")).await.unwrap();
    record_ids(&records)
}

#[tokio::test]
async fn any_filter_keeps_subjects_with_relatives() {
    let source = seeded_source();
    let registry = registry();

    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&user_type()),
        "posts",
        RelationFilter::Any,
        false,
    )
    .unwrap();
    assert_eq!(matching_ids(&source, query).await, vec![11, 12]);
}

#[tokio::test]
async fn negated_any_filter_keeps_the_rest() {
    let source = seeded_source();
    let registry = registry();

    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&user_type()),
        "posts",
        RelationFilter::Any,
        true,
    )
    .unwrap();
    assert_eq!(matching_ids(&source, query).await, vec![13]);
}

#[tokio::test]
async fn record_filter_narrows_to_the_related_subject() {
    let source = seeded_source();
    let registry = registry();

    let posts = all_records(&source, &post_type()).await;
    let post1 = find_by_id(&posts, 1);

    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&user_type()),
        "posts",
        RelationFilter::Record(post1),
        false,
    )
    .unwrap();
    assert_eq!(matching_ids(&source, query).await, vec![11]);
}

#[tokio::test]
async fn empty_record_set_matches_nothing() {
    let source = seeded_source();
    let registry = registry();

    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&user_type()),
        "posts",
        RelationFilter::Records(Vec::new()),
        false,
    )
    .unwrap();
    assert!(matching_ids(&source, query).await.is_empty());

    // Negated, the vacuous constraint keeps every subject.
    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&user_type()),
        "posts",
        RelationFilter::Records(Vec::new()),
        true,
    )
    .unwrap();
    assert_eq!(matching_ids(&source, query).await, vec![11, 12, 13]);
}

#[tokio::test]
async fn scope_filter_constrains_the_relatives() {
    let source = seeded_source();
    let registry = registry();

    let scope: Box<Scope> = Box::new(|q: QueryBuilder| Ok(q.where_eq("title", "draft")));
    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&user_type()),
        "posts",
        RelationFilter::Scope(scope),
        false,
    )
    .unwrap();
    assert_eq!(matching_ids(&source, query).await, vec![12]);
}

#[tokio::test]
async fn dotted_path_filters_through_nested_relations() {
    let source = seeded_source();
    let registry = registry();

    let categories = all_records(&source, &category_type()).await;
    let root_a = find_by_id(&categories, 1);

    // Users with a post in category 1: only post 1 qualifies, so only ada.
    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&user_type()),
        "posts.category",
        RelationFilter::Record(root_a),
        false,
    )
    .unwrap();
    assert_eq!(matching_ids(&source, query).await, vec![11]);
}

#[tokio::test]
async fn pivot_filter_selects_by_tag_membership() {
    let source = seeded_source();
    let registry = registry();

    let tags = all_records(&source, &tag_type()).await;
    let sql_tag = find_by_id(&tags, 101);

    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&post_type()),
        "tags",
        RelationFilter::Record(sql_tag),
        false,
    )
    .unwrap();
    assert_eq!(matching_ids(&source, query).await, vec![1]);
}

#[tokio::test]
async fn self_pivot_filter_aliases_and_evaluates() {
    let source = seeded_source();
    let registry = registry();

    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&user_type()),
        "followees",
        RelationFilter::Any,
        false,
    )
    .unwrap();
    let sql = query.to_sql();
    assert!(sql.contains("FROM users AS users_sub"), "sql: {sql}");
    assert!(
        sql.contains("INNER JOIN follows ON follows.followed_id = users_sub.id"),
        "sql: {sql}"
    );
    assert!(sql.contains("follows.follower_id = users.id"), "sql: {sql}");

    // Users following at least one other user.
    assert_eq!(matching_ids(&source, query).await, vec![11, 12]);
}

#[tokio::test]
async fn self_pivot_record_filter_selects_the_followers() {
    let source = seeded_source();
    let registry = registry();

    let users = all_records(&source, &user_type()).await;
    let clara = find_by_id(&users, 13);

    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&user_type()),
        "followees",
        RelationFilter::Record(clara),
        false,
    )
    .unwrap();
    assert_eq!(matching_ids(&source, query).await, vec![11]);
}

#[tokio::test]
async fn self_relation_filter_aliases_and_evaluates() {
    let source = seeded_source();
    let registry = registry();

    let query = apply_relation_filter(
        &registry,
        QueryBuilder::for_model(&category_type()),
        "children",
        RelationFilter::Any,
        false,
    )
    .unwrap();
    let sql = query.to_sql();
    assert!(sql.contains("categories_sub"), "sql: {sql}");

    // Categories with at least one child: the two roots with subtrees plus
    // both halves of the parent loop.
    assert_eq!(matching_ids(&source, query).await, vec![1, 4, 9, 10]);
}
