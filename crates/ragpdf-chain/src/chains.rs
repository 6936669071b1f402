//! Strategies for turning retrieved passages into one answer.
//!
//! Every chain refuses an empty passage list with `NoRelevantContext`
//! before calling the generator.
use ragpdf_core::config::LlmSettings;
use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::Generator;
use ragpdf_core::types::{ChainType, GenerationParams, RetrievedPassage};

use crate::prompt;

pub struct ChainInput<'a> {
    pub question: &'a str,
    pub passages: &'a [RetrievedPassage],
    /// Rendered history; `None` when memory is off or empty.
    pub history: Option<&'a str>,
    /// Follow-up rewritten to stand on its own, when history produced one.
    pub standalone: Option<&'a str>,
}

impl<'a> ChainInput<'a> {
    pub fn framing(&self) -> prompt::Framing<'a> {
        prompt::Framing { question: self.question, standalone: self.standalone, history: self.history }
    }
}

pub trait AnswerChain: Send + Sync {
    fn kind(&self) -> ChainType;
    fn answer(&self, generator: &dyn Generator, params: &GenerationParams, input: &ChainInput<'_>) -> Result<String>;
}

pub fn build_chain(chain_type: ChainType, llm: &LlmSettings) -> Box<dyn AnswerChain> {
    match chain_type {
        ChainType::Stuff => Box::new(StuffChain { context_budget_chars: llm.context_budget_chars }),
        ChainType::MapReduce => Box::new(MapReduceChain),
        ChainType::Refine => Box::new(RefineChain),
        ChainType::MapRerank => Box::new(MapRerankChain),
    }
}

fn require_passages(input: &ChainInput<'_>) -> Result<()> {
    if input.passages.is_empty() {
        return Err(Error::NoRelevantContext);
    }
    Ok(())
}

/// All passages in one prompt, bounded by a character budget.
pub struct StuffChain {
    pub context_budget_chars: usize,
}

impl AnswerChain for StuffChain {
    fn kind(&self) -> ChainType { ChainType::Stuff }

    fn answer(&self, generator: &dyn Generator, params: &GenerationParams, input: &ChainInput<'_>) -> Result<String> {
        require_passages(input)?;
        let (context, truncated) = prompt::format_passages_within(input.passages, self.context_budget_chars);
        if truncated {
            tracing::warn!(budget = self.context_budget_chars, passages = input.passages.len(), "context truncated to fit budget");
        }
        generator.generate(&prompt::stuff_prompt(&input.framing(), &context), params)
    }
}

/// One extraction call per passage, then one combining call.
pub struct MapReduceChain;

impl AnswerChain for MapReduceChain {
    fn kind(&self) -> ChainType { ChainType::MapReduce }

    fn answer(&self, generator: &dyn Generator, params: &GenerationParams, input: &ChainInput<'_>) -> Result<String> {
        require_passages(input)?;
        let framing = input.framing();
        let partials = input
            .passages
            .iter()
            .map(|p| generator.generate(&prompt::map_prompt(&framing, p), params))
            .collect::<Result<Vec<_>>>()?;
        generator.generate(&prompt::combine_prompt(&framing, &partials), params)
    }
}

/// An answer from the best passage, refined by each following passage in rank order.
pub struct RefineChain;

impl AnswerChain for RefineChain {
    fn kind(&self) -> ChainType { ChainType::Refine }

    fn answer(&self, generator: &dyn Generator, params: &GenerationParams, input: &ChainInput<'_>) -> Result<String> {
        require_passages(input)?;
        let framing = input.framing();
        let (first, rest) = input.passages.split_first().ok_or(Error::NoRelevantContext)?;
        let mut answer = generator.generate(&prompt::refine_initial_prompt(&framing, first), params)?;
        for p in rest {
            answer = generator.generate(&prompt::refine_step_prompt(&framing, &answer, p), params)?;
        }
        Ok(answer)
    }
}

/// One scored answer per passage; the highest score wins, ties go to the
/// better-ranked passage.
pub struct MapRerankChain;

impl AnswerChain for MapRerankChain {
    fn kind(&self) -> ChainType { ChainType::MapRerank }

    fn answer(&self, generator: &dyn Generator, params: &GenerationParams, input: &ChainInput<'_>) -> Result<String> {
        require_passages(input)?;
        let framing = input.framing();
        let mut best: Option<(u32, String)> = None;
        for p in input.passages {
            let raw = generator.generate(&prompt::rerank_prompt(&framing, p), params)?;
            let (answer, score) = prompt::parse_rerank(&raw);
            tracing::debug!(rank = p.rank, score, "rerank candidate");
            if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                best = Some((score, answer));
            }
        }
        best.map(|(_, a)| a).ok_or(Error::NoRelevantContext)
    }
}
