mod common;

use common::{passage, ScriptedGenerator};
use ragpdf_chain::prompt::{format_passages, parse_rerank};
use ragpdf_chain::{AnswerChain, ChainInput, MapReduceChain, MapRerankChain, RefineChain, StuffChain};
use ragpdf_core::error::Error;
use ragpdf_core::types::GenerationParams;

fn passages() -> Vec<ragpdf_core::types::RetrievedPassage> {
    vec![
        passage(1, "The pump filter is replaced every six months.", 3),
        passage(2, "The well is forty meters deep.", 3),
        passage(3, "Solar panels face south.", 1),
    ]
}

#[test]
fn stuff_makes_one_call_with_every_passage_and_no_history() {
    let gen = ScriptedGenerator::new("Every six months.");
    let ps = passages();
    let input = ChainInput { question: "How often is the filter replaced?", passages: &ps, history: None, standalone: None };

    let answer = StuffChain { context_budget_chars: 6000 }.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap();

    assert_eq!(answer, "Every six months.");
    assert_eq!(gen.calls(), 1);
    let prompt = &gen.prompts()[0];
    for p in &ps {
        assert!(prompt.contains(&p.chunk.text));
    }
    assert!(prompt.contains("How often is the filter replaced?"));
    assert!(prompt.contains("[Source 1 - manual, page 3]"));
    assert!(!prompt.contains("Conversation so far"));
}

#[test]
fn stuff_includes_history_when_given() {
    let gen = ScriptedGenerator::new("ok");
    let ps = passages();
    let input = ChainInput {
        question: "And the well?",
        passages: &ps,
        history: Some("User: pump?\nAssistant: six months"),
        standalone: None,
    };
    StuffChain { context_budget_chars: 6000 }.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap();
    let prompt = &gen.prompts()[0];
    assert!(prompt.contains("Conversation so far:\nUser: pump?"));
}

#[test]
fn every_call_of_every_chain_sees_history_and_rewritten_question() {
    let chains: Vec<Box<dyn AnswerChain>> = vec![
        Box::new(StuffChain { context_budget_chars: 6000 }),
        Box::new(MapReduceChain),
        Box::new(RefineChain),
        Box::new(MapRerankChain),
    ];
    let ps = passages();
    for chain in chains {
        let gen = ScriptedGenerator::new("Answer: fine\nScore: 50");
        let input = ChainInput {
            question: "And how deep is it?",
            passages: &ps,
            history: Some("User: Where is the well?\nAssistant: Behind the barn."),
            standalone: Some("How deep is the well behind the barn?"),
        };
        chain.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap();
        for prompt in gen.prompts() {
            assert!(prompt.contains("Conversation so far:\nUser: Where is the well?"), "{}: {prompt}", chain.kind());
            assert!(prompt.contains("Question: And how deep is it?"), "{}: {prompt}", chain.kind());
            assert!(prompt.contains("Standalone question: How deep is the well behind the barn?"), "{}: {prompt}", chain.kind());
        }
    }
}

#[test]
fn standalone_line_is_omitted_when_it_repeats_the_question() {
    let gen = ScriptedGenerator::new("ok");
    let ps = passages();
    let input = ChainInput { question: "Where is the well?", passages: &ps, history: None, standalone: Some("Where is the well?") };
    StuffChain { context_budget_chars: 6000 }.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap();
    assert!(!gen.prompts()[0].contains("Standalone question"));
}

#[test]
fn stuff_truncates_to_budget_in_rank_order() {
    let gen = ScriptedGenerator::new("ok");
    let ps = vec![passage(1, &"a".repeat(40), 1), passage(2, &"b".repeat(40), 2), passage(3, &"c".repeat(10), 3)];
    let input = ChainInput { question: "q", passages: &ps, history: None, standalone: None };
    StuffChain { context_budget_chars: 60 }.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap();
    let prompt = &gen.prompts()[0];
    assert!(prompt.contains(&"a".repeat(40)));
    assert!(!prompt.contains(&"b".repeat(40)));
    // later passages are not skipped ahead of a dropped one
    assert!(!prompt.contains(&"c".repeat(10)));

    let gen = ScriptedGenerator::new("ok");
    let ps = vec![passage(1, &"x".repeat(100), 1)];
    let input = ChainInput { question: "q", passages: &ps, history: None, standalone: None };
    StuffChain { context_budget_chars: 30 }.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap();
    let prompt = &gen.prompts()[0];
    assert!(prompt.contains(&"x".repeat(30)));
    assert!(!prompt.contains(&"x".repeat(31)));
}

#[test]
fn map_reduce_maps_each_passage_then_combines() {
    let gen = ScriptedGenerator::with_replies(&["note one", "note two", "note three", "combined"]);
    let ps = passages();
    let input = ChainInput { question: "Tell me about water", passages: &ps, history: None, standalone: None };
    let answer = MapReduceChain.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap();

    assert_eq!(answer, "combined");
    assert_eq!(gen.calls(), ps.len() + 1);
    let prompts = gen.prompts();
    assert!(prompts[0].contains(&ps[0].chunk.text));
    let combine = prompts.last().unwrap();
    assert!(combine.contains("note one") && combine.contains("note three"));
}

#[test]
fn refine_walks_passages_in_rank_order() {
    let gen = ScriptedGenerator::with_replies(&["draft", "better", "best"]);
    let ps = passages();
    let input = ChainInput { question: "Explain the water system", passages: &ps, history: None, standalone: None };
    let answer = RefineChain.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap();

    assert_eq!(answer, "best");
    let prompts = gen.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].contains(&ps[0].chunk.text));
    assert!(prompts[1].contains(&ps[1].chunk.text) && prompts[1].contains("draft"));
    assert!(prompts[2].contains(&ps[2].chunk.text) && prompts[2].contains("better"));
}

#[test]
fn map_rerank_picks_highest_score_and_first_on_ties() {
    let gen = ScriptedGenerator::with_replies(&["Answer: low\nScore: 40", "Answer: high\nScore: 90", "Answer: also high\nScore: 90"]);
    let ps = passages();
    let input = ChainInput { question: "q", passages: &ps, history: None, standalone: None };
    let answer = MapRerankChain.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap();
    assert_eq!(answer, "high");
    assert_eq!(gen.calls(), 3);
}

#[test]
fn map_rerank_treats_unparsable_scores_as_zero() {
    let gen = ScriptedGenerator::with_replies(&["Answer: first\nScore: lots", "Answer: second\nScore: 5", "no format at all"]);
    let ps = passages();
    let input = ChainInput { question: "q", passages: &ps, history: None, standalone: None };
    let answer = MapRerankChain.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap();
    assert_eq!(answer, "second");
}

#[test]
fn every_chain_refuses_without_passages() {
    let chains: Vec<Box<dyn AnswerChain>> = vec![
        Box::new(StuffChain { context_budget_chars: 100 }),
        Box::new(MapReduceChain),
        Box::new(RefineChain),
        Box::new(MapRerankChain),
    ];
    for chain in chains {
        let gen = ScriptedGenerator::new("should not be called");
        let input = ChainInput { question: "q", passages: &[], history: None, standalone: None };
        let err = chain.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap_err();
        assert!(matches!(err, Error::NoRelevantContext), "{} gave {err:?}", chain.kind());
        assert_eq!(gen.calls(), 0);
    }
}

#[test]
fn generator_errors_propagate() {
    let gen = ScriptedGenerator::new("x");
    gen.set_failing(true);
    let ps = passages();
    let input = ChainInput { question: "q", passages: &ps, history: None, standalone: None };
    let err = MapReduceChain.answer(gen.as_ref(), &GenerationParams::default(), &input).unwrap_err();
    assert!(matches!(err, Error::GenerationUnavailable(_)));
    assert_eq!(gen.calls(), 1, "stops at the first failure");
}

#[test]
fn passages_are_joined_with_separators() {
    let ps = vec![passage(1, "one", 1), passage(2, "two", 2)];
    assert_eq!(format_passages(&ps), "[Source 1 - manual, page 1]\none\n\n---\n\n[Source 2 - manual, page 2]\ntwo");
}

#[test]
fn parse_rerank_handles_variants() {
    assert_eq!(parse_rerank("Answer: yes\nScore: 85"), ("yes".to_string(), 85));
    assert_eq!(parse_rerank("answer: multi\nline\nSCORE: 70/100"), ("multi\nline".to_string(), 70));
    assert_eq!(parse_rerank("Answer: big\nScore: 250"), ("big".to_string(), 100));
    assert_eq!(parse_rerank("just text"), ("just text".to_string(), 0));
}
