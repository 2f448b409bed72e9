//! Local JSON knowledge base used by the `search_kb` tool.
//!
//! File format:
//!
//! ```json
//! {"records": [{"id": 1, "question": "What is the return policy?", "answer": "..."}]}
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A question/answer pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: u64,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub records: Vec<KnowledgeRecord>,
}

impl KnowledgeBase {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse knowledge base JSON")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read knowledge base: {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Records ranked by word overlap with `question`, best first.
    ///
    /// When nothing overlaps every record is returned so the model can still
    /// decide for itself.
    pub fn search(&self, question: &str, limit: usize) -> Vec<KnowledgeRecord> {
        let query = words(question);

        let mut scored: Vec<(usize, &KnowledgeRecord)> = self
            .records
            .iter()
            .map(|record| {
                let text = format!("{} {}", record.question, record.answer);
                let score = words(&text).intersection(&query).count();
                (score, record)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        if scored.is_empty() {
            return self.records.clone();
        }

        // Stable sort keeps file order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}
