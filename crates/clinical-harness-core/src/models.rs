//! Core data models used throughout Clinical Harness.
//!
//! These types represent the curated corpus, the records that flow through
//! retrieval, and the conversation turns read by the context assembler.

use serde::{Deserialize, Serialize};

/// Partition of the corpus used by the retriever's priority rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceGroup {
    /// The institution's authoritative reference text.
    Reference,
    /// General protocol entries.
    Protocol,
}

/// A single retrievable unit of corpus text. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique within a snapshot: `<category>/<key>` or `<category>/<key>#<n>` for chunks.
    pub id: String,
    pub title: String,
    pub text: String,
    pub category: String,
    pub source_group: SourceGroup,
}

impl DocumentRecord {
    pub fn is_reference(&self) -> bool {
        self.source_group == SourceGroup::Reference
    }
}

/// One named category of the corpus, keeping insertion order of its items.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusCategory {
    pub name: String,
    pub items: Vec<DocumentRecord>,
}

/// Ordered mapping of `category → item-key → record`.
///
/// Iteration order is insertion order; the snapshot builder relies on it to
/// keep document positions parallel to index positions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Corpus {
    categories: Vec<CorpusCategory>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an item. Replacing keeps the item's original position.
    pub fn insert(
        &mut self,
        category: &str,
        key: &str,
        title: &str,
        text: &str,
        source_group: SourceGroup,
    ) {
        let record = DocumentRecord {
            id: format!("{}/{}", category, key),
            title: title.to_string(),
            text: text.to_string(),
            category: category.to_string(),
            source_group,
        };

        let cat = match self.categories.iter().position(|c| c.name == category) {
            Some(pos) => &mut self.categories[pos],
            None => {
                self.categories.push(CorpusCategory {
                    name: category.to_string(),
                    items: Vec::new(),
                });
                let last = self.categories.len() - 1;
                &mut self.categories[last]
            }
        };

        match cat.items.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => cat.items.push(record),
        }
    }

    pub fn categories(&self) -> &[CorpusCategory] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&CorpusCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// All records in category-then-item order.
    pub fn records(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.categories.iter().flat_map(|c| c.items.iter())
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A prior message in the caller's conversation. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A retrieved record with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub document: DocumentRecord,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_preserves_insertion_order() {
        let mut corpus = Corpus::new();
        corpus.insert("protocols", "b", "B", "beta", SourceGroup::Protocol);
        corpus.insert("protocols", "a", "A", "alpha", SourceGroup::Protocol);
        corpus.insert("reference", "c", "C", "gamma", SourceGroup::Reference);

        let ids: Vec<&str> = corpus.records().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["protocols/b", "protocols/a", "reference/c"]);
        assert_eq!(corpus.len(), 3);
    }

    #[test]
    fn test_corpus_replace_keeps_position() {
        let mut corpus = Corpus::new();
        corpus.insert("protocols", "a", "A", "old", SourceGroup::Protocol);
        corpus.insert("protocols", "b", "B", "beta", SourceGroup::Protocol);
        corpus.insert("protocols", "a", "A", "new", SourceGroup::Protocol);

        let records: Vec<&DocumentRecord> = corpus.records().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "new");
    }

    #[test]
    fn test_turn_serde_lowercase_roles() {
        let json = r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]"#;
        let turns: Vec<ConversationTurn> = serde_json::from_str(json).unwrap();
        assert_eq!(turns[0], ConversationTurn::user("hi"));
        assert_eq!(turns[1].role, Role::Assistant);
    }
}
