use serde::Serialize;

/// Property sentinel for a column with no vocabulary equivalent.
pub const NO_EQUIVALENT_PROPERTY: &str = "None";

/// Fallback class when the model does not name one.
pub const FALLBACK_CLASS: &str = "Thing";

/// Class of a degraded mapping result.
pub const ERROR_CLASS: &str = "Error";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawColumn {
    pub name: String,
    pub original_type: String,
    pub is_primary_key: bool,
    pub is_nullable: bool,
    pub description: Option<String>,
}

impl RawColumn {
    /// Create a nullable, non-key column without description.
    /// Use the builder-style setters to override.
    pub fn new(name: impl Into<String>, original_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            original_type: original_type.into(),
            is_primary_key: false,
            is_nullable: true,
            description: None,
        }
    }

    /// Mark as (part of) the primary key.
    pub fn with_primary_key(mut self, is_primary_key: bool) -> Self {
        self.is_primary_key = is_primary_key;
        self
    }

    /// Set nullability.
    pub fn with_nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }

    /// Set the column comment.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawTable {
    pub name: String,
    pub columns: Vec<RawColumn>,
    pub source_file: String,
    pub raw_content: Option<String>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, columns: Vec<RawColumn>, source_file: &str) -> Self {
        Self {
            name: name.into(),
            columns,
            source_file: source_file.to_string(),
            raw_content: None,
        }
    }

    /// Attach the original statement text.
    pub fn with_raw_content(mut self, raw_content: Option<String>) -> Self {
        self.raw_content = raw_content;
        self
    }

    /// Whether a column with this exact name was declared.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Class,
    Property,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Property => "property",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One class or property definition of the target vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VocabularyNode {
    pub id: String,
    pub label: String,
    pub description: String,
    pub kind: NodeKind,
    /// For properties: ids of the classes the property applies to.
    pub domain_includes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedColumn {
    pub original_name: String,
    pub schema_property: String,
    pub confidence: f32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedTable {
    pub original_table: String,
    pub schema_class: String,
    pub columns: Vec<MappedColumn>,
    pub rationale: String,
}

impl MappedTable {
    /// Degraded result for a table whose mapping could not be produced.
    pub fn error(original_table: &str, rationale: impl Into<String>) -> Self {
        Self {
            original_table: original_table.to_string(),
            schema_class: ERROR_CLASS.to_string(),
            columns: Vec::new(),
            rationale: rationale.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.schema_class == ERROR_CLASS
    }
}
