use serde::{Deserialize, Serialize};

use crate::{error::Result, space::passage::PassageKind};

/// One passage as handed over by the storage layer.
///
/// Terms are already tokenized; the list is unordered and may repeat a term,
/// repeated frequencies accumulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageRecord {
    pub id: u64,
    pub external_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub kind: PassageKind,
    pub terms: Vec<(String, u32)>,
}

impl PassageRecord {
    pub fn new(id: u64, external_id: impl Into<String>) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            content: String::new(),
            title: String::new(),
            url: String::new(),
            kind: PassageKind::Document,
            terms: Vec::new(),
        }
    }

    /// Builder-style term list
    pub fn with_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        self.terms = terms.into_iter().map(|(t, f)| (t.into(), f)).collect();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_kind(mut self, kind: PassageKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Storage / retrieval collaborator supplying passages for a selection query
pub trait PassageSource {
    /// Passages matching `query`, in a stable order
    fn passages(&self, query: &str) -> Result<Vec<PassageRecord>>;
}

/// In-memory source.
/// An empty query selects everything, otherwise a passage matches when its
/// external id starts with the query.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<PassageRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<PassageRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: PassageRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<PassageRecord> for MemorySource {
    fn from_iter<T: IntoIterator<Item = PassageRecord>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl PassageSource for MemorySource {
    fn passages(&self, query: &str) -> Result<Vec<PassageRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| query.is_empty() || r.external_id.starts_with(query))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_query() {
        let source: MemorySource = ["news/1", "news/2", "blog/1"]
            .iter()
            .enumerate()
            .map(|(i, id)| PassageRecord::new(i as u64, *id).with_terms([("a", 1)]))
            .collect();
        assert_eq!(source.passages("").unwrap().len(), 3);
        let news = source.passages("news/").unwrap();
        assert_eq!(news.iter().map(|r| r.id).collect::<Vec<_>>(), vec![0, 1]);
        assert!(source.passages("wiki").unwrap().is_empty());
    }

    #[test]
    fn record_deserializes_with_defaults() {
        let json = r#"{"id":7,"external_id":"d7","terms":[["cat",2],["dog",1]]}"#;
        let record: PassageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, PassageKind::Document);
        assert_eq!(record.terms[0], ("cat".to_string(), 2));
        assert!(record.content.is_empty());
    }
}
