use serde::Serialize;
use serde_json::json;

use crate::rag::ClassCandidate;
use crate::types::RawTable;

/// Fixes the answer contract for every backend.
pub const SYSTEM_PROMPT: &str = r#"You are an expert ontology engineer. Your task is to map a legacy SQL table to a standardized Schema.org class.

Output strictly in JSON format matching this structure:
{
    "schema_class": "BestMatchingClass",
    "rationale": "Why you chose this class",
    "mappings": [
        {"original_name": "column_name", "schema_property": "mappedProperty", "reason": "why"}
    ]
}"#;

const INSTRUCTIONS: &str = r#"INSTRUCTIONS:
1. Select the single best Schema.org class from the candidates for this table.
2. If none of them fits, answer "Thing".
3. Map each column of the input table to a property of that class.
4. If a column has no semantic equivalent (for example internal database ids), set schema_property to null.
5. Only use column names that appear in the input table."#;

/// A retrieved class as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptCandidate {
    pub class: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
}

impl PromptCandidate {
    /// Candidate without property hints; the description is taken from the indexed text.
    pub fn from_candidate(candidate: &ClassCandidate) -> Self {
        let description = candidate
            .content
            .split_once("\nDescription: ")
            .map(|(_, d)| d)
            .unwrap_or(&candidate.content);
        Self {
            class: candidate.label.clone(),
            description: description.trim().to_string(),
            properties: Vec::new(),
        }
    }

    pub fn with_properties(mut self, properties: Vec<String>) -> Self {
        self.properties = properties;
        self
    }
}

/// Text embedded to retrieve candidate classes for a table.
pub fn retrieval_query(table: &RawTable) -> String {
    format!(
        "Table {} with columns: {}",
        table.name,
        table.column_names().join(", ")
    )
}

pub fn user_prompt(table: &RawTable, candidates: &[PromptCandidate]) -> String {
    let columns: Vec<_> = table
        .columns
        .iter()
        .map(|c| json!({"name": c.name, "type": c.original_type}))
        .collect();
    let table_def = json!({
        "table_name": table.name,
        "columns": columns,
    });
    let candidates = json!(candidates);

    format!(
        "INPUT TABLE:\n{table_def:#}\n\n\
         CANDIDATE SCHEMA.ORG CLASSES (retrieved from the knowledge base):\n{candidates:#}\n\n\
         {INSTRUCTIONS}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawColumn;

    fn table() -> RawTable {
        RawTable::new(
            "inventory_item",
            vec![
                RawColumn::new("sku", "VARCHAR(32)"),
                RawColumn::new("price", "DECIMAL(10,2)"),
            ],
            "shop.sql",
        )
    }

    #[test]
    fn test_retrieval_query() {
        assert_eq!(
            retrieval_query(&table()),
            "Table inventory_item with columns: sku, price"
        );
        let empty = RawTable::new("empty", Vec::new(), "x.sql");
        assert_eq!(retrieval_query(&empty), "Table empty with columns: ");
    }

    #[test]
    fn test_candidate_from_indexed_text() {
        let hit = ClassCandidate {
            id: "schema:Product".to_string(),
            label: "Product".to_string(),
            source: "schema.org".to_string(),
            content: "Class: Product\nDescription: Any offered product.".to_string(),
            distance: 0.3,
        };
        let candidate = PromptCandidate::from_candidate(&hit);
        assert_eq!(candidate.class, "Product");
        assert_eq!(candidate.description, "Any offered product.");
        assert!(candidate.properties.is_empty());
    }

    #[test]
    fn test_user_prompt_embeds_table_and_candidates() {
        let candidates = vec![
            PromptCandidate {
                class: "Product".to_string(),
                description: "Any offered product.".to_string(),
                properties: Vec::new(),
            }
            .with_properties(vec!["sku".to_string(), "offers".to_string()]),
            PromptCandidate {
                class: "Place".to_string(),
                description: "A fixed location.".to_string(),
                properties: Vec::new(),
            },
        ];
        let prompt = user_prompt(&table(), &candidates);

        assert!(prompt.contains("\"table_name\": \"inventory_item\""));
        assert!(prompt.contains("\"type\": \"DECIMAL(10,2)\""));
        assert!(prompt.contains("\"class\": \"Product\""));
        assert!(prompt.contains("\"offers\""));
        // Candidates without property hints do not carry an empty list.
        assert_eq!(prompt.matches("\"properties\"").count(), 1);
    }

    #[test]
    fn test_prompt_template_is_neutral_for_keyword_rules() {
        let bare = RawTable::new("t", Vec::new(), "x.sql");
        let prompt = user_prompt(&bare, &[]).to_lowercase();
        for word in ["blog", "post", "user", "auth"] {
            assert!(!prompt.contains(word), "template contains '{word}'");
        }
    }
}
