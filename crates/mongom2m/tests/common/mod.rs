//! Shared fixtures for the integration tests.
//!
//! Every test builds its own schema under its own app label so that signal
//! receivers, which are process-wide, never see another test's traffic.

#![allow(dead_code)]

use std::sync::Arc;

use mongom2m::{Database, Document, DocumentType, ManyToManyField, MemoryStore, Registry, SchemaRegistry};

pub struct Fixture {
    pub db: Database,
    pub store: Arc<MemoryStore>,
    pub registry: Arc<Registry>,
    pub article: Arc<DocumentType>,
    pub tag: Arc<DocumentType>,
}

impl Fixture {
    /// `<app>.TestArticle.tags` -> `<app>.TestTag`.
    pub fn new(app: &str, embed: bool) -> Self {
        let mut registry = Registry::new();
        let article = registry
            .register_type(DocumentType::new(app, "TestArticle").with_field("title"))
            .unwrap();
        let tag = registry
            .register_type(DocumentType::new(app, "TestTag").with_field("name"))
            .unwrap();
        registry
            .register_field(&article.label(), ManyToManyField::new("tags", "TestTag").embed(embed))
            .unwrap();

        let registry = Arc::new(registry);
        let store = Arc::new(MemoryStore::new());
        let db = Database::new(store.clone(), registry.clone());
        Self {
            db,
            store,
            registry,
            article,
            tag,
        }
    }

    pub fn tag(&self, name: &str) -> Document {
        let mut tag = Document::new(&self.tag).with("name", name);
        self.db.save(&mut tag).unwrap();
        tag
    }

    pub fn article(&self, title: &str) -> Document {
        let mut article = Document::new(&self.article).with("title", title);
        self.db.save(&mut article).unwrap();
        article
    }

    /// Loads the stored article again, discarding in-memory state.
    pub fn reload(&self, article: &Document) -> Document {
        self.db
            .get_by_pk(&self.article, article.pk().unwrap())
            .unwrap()
    }

    pub fn through_label(&self) -> String {
        format!("{}.testarticletesttagrelationship", self.article.app_label)
    }

    pub fn names(docs: &[Document]) -> Vec<String> {
        docs.iter()
            .map(|doc| doc.get("name").unwrap().as_str().unwrap().to_string())
            .collect()
    }
}
