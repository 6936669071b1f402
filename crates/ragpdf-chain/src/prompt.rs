//! Prompt templates and passage formatting.
//!
//! Passages are cited as `[Source <rank> - <file>, page <n>]` blocks joined
//! by `---` separators, so answers can point back at pages.

use ragpdf_core::types::{RetrievedPassage, Turn};

use crate::memory::MemoryContext;

/// Answer returned when no passage clears the similarity threshold.
pub const INSUFFICIENT_CONTEXT: &str =
    "I could not find information relevant to this question in the document.";

pub const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

const INSTRUCTIONS: &str = "Answer the question using only the information from the document excerpts below. \
If the excerpts do not contain the answer, say that the document does not contain this information.";

pub fn citation(p: &RetrievedPassage) -> String {
    format!("[Source {} - {}, page {}]", p.rank, p.chunk.source, p.chunk.page_label())
}

pub fn format_passage(p: &RetrievedPassage) -> String {
    format!("{}\n{}", citation(p), p.chunk.text)
}

pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    passages.iter().map(format_passage).collect::<Vec<_>>().join(PASSAGE_SEPARATOR)
}

/// Passages in rank order whose combined text fits `budget` characters. A
/// first passage longer than the budget is cut. Returns the rendered context
/// and whether anything was left out.
pub fn format_passages_within(passages: &[RetrievedPassage], budget: usize) -> (String, bool) {
    let mut blocks = Vec::new();
    let mut used = 0usize;
    let mut truncated = false;
    for p in passages {
        let len = p.chunk.text.chars().count();
        if used + len <= budget {
            blocks.push(format_passage(p));
            used += len;
        } else {
            if blocks.is_empty() {
                let cut: String = p.chunk.text.chars().take(budget).collect();
                blocks.push(format!("{}\n{}", citation(p), cut));
            }
            truncated = true;
            break;
        }
    }
    (blocks.join(PASSAGE_SEPARATOR), truncated)
}

fn format_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("User: {}\nAssistant: {}", t.question, t.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Conversation history block, or `None` when there is nothing to show.
pub fn render_history(ctx: &MemoryContext) -> Option<String> {
    if ctx.is_empty() {
        return None;
    }
    let mut out = String::new();
    if let Some(summary) = &ctx.summary {
        out.push_str("Summary of the earlier conversation:\n");
        out.push_str(summary);
        if !ctx.turns.is_empty() {
            out.push_str("\n\n");
        }
    }
    out.push_str(&format_turns(&ctx.turns));
    Some(out)
}

fn history_section(history: Option<&str>) -> String {
    match history {
        Some(h) => format!("Conversation so far:\n{}\n\n", h),
        None => String::new(),
    }
}

/// How every answer prompt presents the question: the words the user typed,
/// the standalone rewrite of a follow-up, and the conversation so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct Framing<'a> {
    pub question: &'a str,
    pub standalone: Option<&'a str>,
    pub history: Option<&'a str>,
}

impl Framing<'_> {
    fn history_block(&self) -> String {
        history_section(self.history)
    }

    fn question_lines(&self) -> String {
        match self.standalone {
            Some(s) if s != self.question => format!("Question: {}\nStandalone question: {s}", self.question),
            _ => format!("Question: {}", self.question),
        }
    }
}

pub fn stuff_prompt(f: &Framing<'_>, context: &str) -> String {
    format!(
        "{INSTRUCTIONS}\n\n{}Document excerpts:\n{context}\n\n{}\n\nAnswer:",
        f.history_block(),
        f.question_lines()
    )
}

pub fn map_prompt(f: &Framing<'_>, passage: &RetrievedPassage) -> String {
    format!(
        "Use the following excerpt to find information relevant to the question. \
Return any relevant text verbatim, or \"NONE\" if nothing is relevant.\n\n{}{}\n\n{}\n\nRelevant information:",
        f.history_block(),
        format_passage(passage),
        f.question_lines()
    )
}

pub fn combine_prompt(f: &Framing<'_>, partials: &[String]) -> String {
    let notes = partials
        .iter()
        .enumerate()
        .map(|(i, p)| format!("Note {}:\n{}", i + 1, p))
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR);
    format!(
        "{INSTRUCTIONS}\n\n{}Notes extracted from the document:\n{notes}\n\n{}\n\nAnswer:",
        f.history_block(),
        f.question_lines()
    )
}

pub fn refine_initial_prompt(f: &Framing<'_>, passage: &RetrievedPassage) -> String {
    stuff_prompt(f, &format_passage(passage))
}

pub fn refine_step_prompt(f: &Framing<'_>, existing: &str, passage: &RetrievedPassage) -> String {
    format!(
        "{}{}\n\nAn existing answer is:\n{existing}\n\n\
Refine the existing answer (only if needed) with the additional excerpt below. \
If the excerpt is not useful, return the existing answer unchanged.\n\n{}\n\nRefined answer:",
        f.history_block(),
        f.question_lines(),
        format_passage(passage)
    )
}

pub fn rerank_prompt(f: &Framing<'_>, passage: &RetrievedPassage) -> String {
    format!(
        "{INSTRUCTIONS}\n\n{}Document excerpt:\n{}\n\n{}\n\n\
Reply in exactly this format:\nAnswer: <your answer>\nScore: <0-100, how fully the excerpt answers the question>",
        f.history_block(),
        format_passage(passage),
        f.question_lines()
    )
}

/// Rewrites a follow-up into a question that stands on its own.
pub fn condense_prompt(history: &str, question: &str) -> String {
    format!(
        "Given the conversation below and a follow-up question, rephrase the follow-up as a \
standalone question. Return only the question.\n\nConversation:\n{history}\n\nFollow-up question: {question}\n\nStandalone question:"
    )
}

pub fn summary_prompt(summary: &str, new_turns: &[Turn]) -> String {
    let current = if summary.is_empty() { "(none)" } else { summary };
    format!(
        "Progressively summarize the conversation, adding onto the previous summary and returning a new summary.\n\n\
Current summary:\n{current}\n\nNew lines of conversation:\n{}\n\nNew summary:",
        format_turns(new_turns)
    )
}

/// Split a map_rerank reply into its answer and score. A missing or
/// unparsable score counts as 0; scores above 100 are clamped.
pub fn parse_rerank(output: &str) -> (String, u32) {
    let mut answer_lines: Vec<&str> = Vec::new();
    let mut in_answer = false;
    let mut score = None;
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(rest) = strip_label(trimmed, "answer:") {
            in_answer = true;
            answer_lines.push(rest.trim());
        } else if let Some(rest) = strip_label(trimmed, "score:") {
            in_answer = false;
            score = parse_score(rest);
        } else if in_answer {
            answer_lines.push(trimmed);
        }
    }
    let answer = if answer_lines.is_empty() {
        output.trim().to_string()
    } else {
        answer_lines.join("\n").trim().to_string()
    };
    (answer, score.unwrap_or(0).min(100))
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label).then(|| &line[label.len()..])
}

fn parse_score(raw: &str) -> Option<u32> {
    let digits: String = raw.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
