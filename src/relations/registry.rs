//! Relation registry
//!
//! Maps model type names to their declared relations. Cloning a registry is
//! cheap and shares the underlying map, which lets scope closures that
//! traverse nested relations capture a handle without lifetimes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::error::{OrmError, OrmResult};

use super::definition::Relation;

/// Produces a fresh handle to a relation each time it is asked for.
pub type RelationFactory = Arc<dyn Fn() -> Arc<dyn Relation> + Send + Sync>;

#[derive(Clone)]
pub struct RelationRegistry {
    relations: Arc<DashMap<String, HashMap<String, RelationFactory>>>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self {
            relations: Arc::new(DashMap::new()),
        }
    }

    /// Declare `name` on `model`, replacing any previous declaration.
    pub fn declare<F>(&self, model: &str, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Relation> + Send + Sync + 'static,
    {
        self.relations
            .entry(model.to_string())
            .or_default()
            .insert(name.to_string(), Arc::new(factory));
    }

    /// Look up `name` on `model`.
    pub fn resolve(&self, model: &str, name: &str) -> OrmResult<Arc<dyn Relation>> {
        self.relations
            .get(model)
            .and_then(|entry| entry.get(name).cloned())
            .map(|factory| factory())
            .ok_or_else(|| OrmError::relation_not_defined(model, name))
    }

    pub fn has(&self, model: &str, name: &str) -> bool {
        self.relations
            .get(model)
            .map(|entry| entry.contains_key(name))
            .unwrap_or(false)
    }

    /// Relation names declared on `model`, sorted for stable output.
    pub fn names(&self, model: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .relations
            .get(model)
            .map(|entry| entry.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.relations.clear();
    }
}

impl Default for RelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RelationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut models: Vec<String> = self.relations.iter().map(|e| e.key().clone()).collect();
        models.sort();
        f.debug_struct("RelationRegistry").field("models", &models).finish()
    }
}

static DEFAULT_REGISTRY: Lazy<RelationRegistry> = Lazy::new(RelationRegistry::new);

/// Process-wide registry for applications with a single model graph.
pub fn default_registry() -> &'static RelationRegistry {
    &DEFAULT_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::FieldRelation;
    use crate::schema::ModelType;

    fn registry_with_posts() -> RelationRegistry {
        let registry = RelationRegistry::new();
        let user = ModelType::new("User", "users");
        let post = ModelType::new("Post", "posts");
        registry.declare("User", "posts", move || {
            Arc::new(FieldRelation::has_many(&user, &post, "author_id"))
        });
        registry
    }

    #[test]
    fn resolve_returns_declared_relation() {
        let registry = registry_with_posts();
        let relation = registry.resolve("User", "posts").unwrap();
        assert_eq!(relation.target().name, "Post");
        assert!(registry.has("User", "posts"));
    }

    #[test]
    fn resolve_unknown_relation_names_model_and_relation() {
        let registry = registry_with_posts();
        let err = registry.resolve("User", "comments").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("User"), "message: {message}");
        assert!(message.contains("comments"), "message: {message}");
    }

    #[test]
    fn names_are_sorted() {
        let registry = registry_with_posts();
        let user = ModelType::new("User", "users");
        let post = ModelType::new("Post", "posts");
        registry.declare("User", "articles", move || {
            Arc::new(FieldRelation::has_many(&user, &post, "author_id"))
        });
        assert_eq!(registry.names("User"), vec!["articles", "posts"]);
    }
}
