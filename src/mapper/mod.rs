pub mod prompt;
pub mod response;

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::llm::TextGenerator;
use crate::rag::{ClassCandidate, SemanticIndex};
use crate::types::{MappedColumn, MappedTable, RawTable};

use prompt::{retrieval_query, user_prompt, PromptCandidate, SYSTEM_PROMPT};
use response::{parse_response, ParsedResponse};

/// Confidence attached to every mapped column. The model is not asked for one.
pub const PLACEHOLDER_CONFIDENCE: f32 = 0.9;

/// Number of candidate classes retrieved per table.
pub const CANDIDATE_COUNT: usize = 3;

/// Property names listed per candidate class in the prompt.
pub const MAX_PROPERTIES_PER_CANDIDATE: usize = 25;

pub const GENERATION_FAILED: &str = "Generation Failed";
pub const PARSING_FAILED: &str = "Parsing Failed";

/// Maps extracted tables onto vocabulary classes: retrieve candidates,
/// prompt the generator, validate its answer.
pub struct SemanticMapper<G: TextGenerator> {
    index: SemanticIndex,
    generator: G,
    /// Set after the first failed vocabulary lookup so prompts stop asking.
    properties_unavailable: bool,
}

impl<G: TextGenerator> SemanticMapper<G> {
    /// Builds the index first when it holds no documents.
    pub fn new(mut index: SemanticIndex, generator: G) -> Result<Self> {
        if index.document_count()? == 0 {
            info!("Semantic index is empty, building it");
            index.build_index(false)?;
        } else if index.embedder_changed()? {
            info!("Semantic index was built by another embedder, rebuilding it");
            index.build_index(true)?;
        }
        Ok(Self {
            index,
            generator,
            properties_unavailable: false,
        })
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn index(&mut self) -> &mut SemanticIndex {
        &mut self.index
    }

    /// Map one table. Never fails: generation and parsing problems yield an
    /// `Error`-class result with an explanatory rationale.
    pub fn map_table(&mut self, table: &RawTable) -> MappedTable {
        debug!(table = %table.name, stage = "retrieving");
        let query = retrieval_query(table);
        let candidates = match self.index.search(&query, CANDIDATE_COUNT) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(table = %table.name, error = %e, "retrieval failed, prompting without candidates");
                Vec::new()
            }
        };

        debug!(table = %table.name, stage = "prompting", candidates = candidates.len());
        let prompt_candidates = self.prompt_candidates(&candidates);
        let user = user_prompt(table, &prompt_candidates);

        debug!(table = %table.name, stage = "generating", model = self.generator.model_name());
        let text = match self.generator.generate(SYSTEM_PROMPT, &user) {
            Ok(text) => text,
            Err(e) => {
                warn!(table = %table.name, error = %e, "generation failed");
                return MappedTable::error(&table.name, GENERATION_FAILED);
            }
        };

        debug!(table = %table.name, stage = "parsing");
        let parsed = match parse_response(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(table = %table.name, error = %e, "unusable model output");
                debug!(table = %table.name, output = %text, "raw model output");
                return MappedTable::error(&table.name, PARSING_FAILED);
            }
        };

        let mapped = validated_mapping(table, parsed);
        debug!(table = %table.name, stage = "done", class = %mapped.schema_class, columns = mapped.columns.len());
        mapped
    }

    /// Map every table in order; a failed table does not stop the batch.
    pub fn map_tables(&mut self, tables: &[RawTable]) -> Vec<MappedTable> {
        info!(tables = tables.len(), model = self.generator.model_name(), "Mapping tables");
        tables.iter().map(|t| self.map_table(t)).collect()
    }

    fn prompt_candidates(&mut self, candidates: &[ClassCandidate]) -> Vec<PromptCandidate> {
        let mut out = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let prompt_candidate = PromptCandidate::from_candidate(candidate);
            if self.properties_unavailable || !self.generator.wants_property_hints() {
                out.push(prompt_candidate);
                continue;
            }
            match self.index.vocabulary().properties_for(&candidate.id) {
                Ok(properties) => out.push(
                    prompt_candidate.with_properties(
                        properties
                            .into_iter()
                            .take(MAX_PROPERTIES_PER_CANDIDATE)
                            .map(|p| p.label)
                            .collect(),
                    ),
                ),
                Err(e) => {
                    warn!(error = %e, "vocabulary unavailable, prompting without property hints");
                    self.properties_unavailable = true;
                    out.push(prompt_candidate);
                }
            }
        }
        out
    }
}

/// Keep only mappings that name a declared column, first occurrence wins.
fn validated_mapping(table: &RawTable, parsed: ParsedResponse) -> MappedTable {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(parsed.mappings.len());

    for mapping in parsed.mappings {
        if !table.has_column(&mapping.original_name) {
            warn!(table = %table.name, column = %mapping.original_name, "dropping mapping for unknown column");
            continue;
        }
        if !seen.insert(mapping.original_name.clone()) {
            warn!(table = %table.name, column = %mapping.original_name, "dropping duplicate mapping");
            continue;
        }
        columns.push(MappedColumn {
            original_name: mapping.original_name,
            schema_property: mapping.schema_property,
            confidence: PLACEHOLDER_CONFIDENCE,
            reason: mapping.reason,
        });
    }

    MappedTable {
        original_table: table.name.clone(),
        schema_class: parsed.schema_class,
        columns,
        rationale: parsed.rationale,
    }
}
