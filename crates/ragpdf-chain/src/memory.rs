//! Conversation memory: unbounded buffer, sliding window, or running summary.
use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ragpdf_core::config::MemorySettings;
use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::Generator;
use ragpdf_core::types::{GenerationParams, MemoryType, Turn};

use crate::prompt::summary_prompt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MemoryState {
    Buffer {
        turns: Vec<Turn>,
    },
    Window {
        size: usize,
        turns: VecDeque<Turn>,
    },
    /// `pending` holds turns not yet folded into `summary`; it is non-empty
    /// only after a failed summarization. With `keep_last` the newest turn
    /// waits in `last`, verbatim, and is folded when the next one arrives.
    Summary {
        summary: String,
        pending: Vec<Turn>,
        last: Option<Turn>,
        keep_last: bool,
        degraded: bool,
    },
}

impl MemoryState {
    pub fn initial(settings: &MemorySettings) -> Result<Self> {
        Ok(match settings.memory_type {
            MemoryType::Buffer => MemoryState::Buffer { turns: Vec::new() },
            MemoryType::Window => {
                if settings.window_size == 0 {
                    return Err(Error::InvalidConfig("memory.window_size must be at least 1".into()));
                }
                MemoryState::Window { size: settings.window_size, turns: VecDeque::new() }
            }
            MemoryType::Summary => MemoryState::Summary {
                summary: String::new(),
                pending: Vec::new(),
                last: None,
                keep_last: settings.summary_keep_last_turn,
                degraded: false,
            },
        })
    }

    pub fn memory_type(&self) -> MemoryType {
        match self {
            MemoryState::Buffer { .. } => MemoryType::Buffer,
            MemoryState::Window { .. } => MemoryType::Window,
            MemoryState::Summary { .. } => MemoryType::Summary,
        }
    }
}

/// What the prompt assembler sees of the conversation so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryContext {
    pub summary: Option<String>,
    pub turns: Vec<Turn>,
    /// Set when summarization failed and raw turns are standing in for it.
    pub degraded: bool,
}

impl MemoryContext {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.turns.is_empty()
    }
}

pub struct MemoryManager {
    state: MemoryState,
    generator: Option<Arc<dyn Generator>>,
    summary_params: GenerationParams,
}

impl MemoryManager {
    /// Summary mode needs a generator to fold turns.
    pub fn new(settings: &MemorySettings, generator: Option<Arc<dyn Generator>>) -> Result<Self> {
        let state = MemoryState::initial(settings)?;
        Self::from_state(state, generator, settings.summary_max_tokens)
    }

    pub fn from_state(state: MemoryState, generator: Option<Arc<dyn Generator>>, summary_max_tokens: u32) -> Result<Self> {
        if matches!(state, MemoryState::Summary { .. }) && generator.is_none() {
            return Err(Error::InvalidConfig("summary memory requires a generation backend".into()));
        }
        if let MemoryState::Window { size: 0, .. } = state {
            return Err(Error::InvalidConfig("memory window size must be at least 1".into()));
        }
        Ok(Self {
            state,
            generator,
            summary_params: GenerationParams { temperature: 0.0, max_tokens: summary_max_tokens },
        })
    }

    pub fn state(&self) -> &MemoryState { &self.state }

    pub fn memory_type(&self) -> MemoryType { self.state.memory_type() }

    pub fn append(&mut self, turn: Turn) {
        match &mut self.state {
            MemoryState::Buffer { turns } => turns.push(turn),
            MemoryState::Window { size, turns } => {
                turns.push_back(turn);
                while turns.len() > *size {
                    turns.pop_front();
                }
            }
            MemoryState::Summary { summary, pending, last, keep_last, degraded } => {
                if *keep_last {
                    if let Some(previous) = last.replace(turn) {
                        pending.push(previous);
                    }
                } else {
                    pending.push(turn);
                }
                if pending.is_empty() {
                    return;
                }
                let Some(generator) = &self.generator else {
                    *degraded = true;
                    return;
                };
                match generator.generate(&summary_prompt(summary, pending), &self.summary_params) {
                    Ok(folded) => {
                        *summary = folded.trim().to_string();
                        pending.clear();
                        *degraded = false;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, pending = pending.len(), "summary update failed, keeping raw turns");
                        *degraded = true;
                    }
                }
            }
        }
    }

    pub fn context(&self) -> MemoryContext {
        match &self.state {
            MemoryState::Buffer { turns } => MemoryContext { turns: turns.clone(), ..Default::default() },
            MemoryState::Window { turns, .. } => {
                MemoryContext { turns: turns.iter().cloned().collect(), ..Default::default() }
            }
            MemoryState::Summary { summary, pending, last, keep_last, degraded } => {
                let mut turns = pending.clone();
                if *keep_last {
                    turns.extend(last.iter().cloned());
                }
                MemoryContext {
                    summary: (!summary.is_empty()).then(|| summary.clone()),
                    turns,
                    degraded: *degraded,
                }
            }
        }
    }

    pub fn clear(&mut self) {
        match &mut self.state {
            MemoryState::Buffer { turns } => turns.clear(),
            MemoryState::Window { turns, .. } => turns.clear(),
            MemoryState::Summary { summary, pending, last, degraded, .. } => {
                summary.clear();
                pending.clear();
                *last = None;
                *degraded = false;
            }
        }
        tracing::debug!(mode = %self.memory_type(), "memory cleared");
    }
}
