//! Context composer — assembles the chat prompt from persona,
//! personalization, retrieved material excerpts, bounded history, and
//! the current user message.
//!
//! Block order is fixed; empty blocks are elided silently; blocks are
//! separated by a single blank line. When the assembled prompt exceeds
//! the character budget, content is shed in a fixed order: oldest
//! history turns, then lowest-scoring excerpts, then a tail-truncation
//! of the last remaining excerpt, then the optional preamble blocks.
//! The user message itself is never modified.

use studyhall_core::error::CoreError;
use studyhall_store::types::{AcademicProfile, Preferences};
use studyhall_store::{ChatTurn, SearchHit, TurnRole};

pub struct ComposeInput<'a> {
    pub persona: &'a str,
    pub academic: Option<AcademicProfile>,
    pub preferences: Option<Preferences>,
    /// Ranked excerpts, best first (the search contract).
    pub excerpts: Vec<SearchHit>,
    /// Chronological history, already bounded to the last `H` turns.
    pub history: Vec<ChatTurn>,
    pub message: &'a str,
}

/// Retrieval gate: a course scope and a message long enough to carry
/// meaning. Exactly `min_query_len` characters qualifies.
pub fn should_retrieve(message: &str, course_id: Option<&str>, min_query_len: usize) -> bool {
    course_id.is_some() && message.trim().chars().count() >= min_query_len
}

pub fn compose(input: ComposeInput<'_>, budget: usize) -> Result<String, CoreError> {
    let mut persona = input.persona.trim().to_string();
    let mut personalization =
        render_personalization(input.academic.as_ref(), input.preferences.as_ref());
    let mut excerpts = input.excerpts;
    let mut history = input.history;
    let message = input.message;

    loop {
        let prompt = assemble(&persona, &personalization, &excerpts, &history, message);
        let len = prompt.chars().count();
        if len <= budget {
            return Ok(prompt);
        }

        // (a) oldest history turns go first, one at a time.
        if !history.is_empty() {
            history.remove(0);
            continue;
        }
        // (b) lowest-scoring excerpts next, one at a time.
        if excerpts.len() > 1 {
            excerpts.pop();
            continue;
        }
        // (c) tail-truncate the last remaining excerpt.
        if excerpts.len() == 1 {
            let over = len - budget;
            let kept: usize = excerpts[0].excerpt.chars().count().saturating_sub(over);
            if kept == 0 {
                excerpts.clear();
            } else {
                excerpts[0].excerpt = excerpts[0].excerpt.chars().take(kept).collect();
            }
            continue;
        }
        if !personalization.is_empty() {
            personalization.clear();
            continue;
        }
        if !persona.is_empty() {
            persona.clear();
            continue;
        }
        // (d) nothing left but the message itself.
        return Err(CoreError::PromptTooLarge {
            len: message.chars().count(),
            budget,
        });
    }
}

fn assemble(
    persona: &str,
    personalization: &str,
    excerpts: &[SearchHit],
    history: &[ChatTurn],
    message: &str,
) -> String {
    let materials = render_materials(excerpts);
    let history_block = render_history(history);

    [
        persona,
        personalization,
        materials.as_str(),
        history_block.as_str(),
        message,
    ]
    .iter()
    .filter(|block| !block.is_empty())
    .cloned()
    .collect::<Vec<_>>()
    .join("\n\n")
}

/// Personalization block; missing fields are elided silently. Returns
/// an empty string when there is nothing to say.
fn render_personalization(
    academic: Option<&AcademicProfile>,
    preferences: Option<&Preferences>,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(a) = academic {
        if !a.grades.is_empty() {
            lines.push(format!("- Grades: {}", a.grades.join(", ")));
        }
        match (&a.semester_type, a.semester_number) {
            (Some(kind), Some(n)) => lines.push(format!("- Semester: {kind} {n}")),
            (Some(kind), None) => lines.push(format!("- Semester: {kind}")),
            (None, Some(n)) => lines.push(format!("- Semester: {n}")),
            (None, None) => {}
        }
        if !a.subjects.is_empty() {
            lines.push(format!("- Subjects: {}", a.subjects.join(", ")));
        }
    }

    if let Some(p) = preferences {
        if let Some(v) = &p.detail_level {
            lines.push(format!("- Preferred detail level: {v}"));
        }
        if let Some(v) = &p.learning_pace {
            lines.push(format!("- Learning pace: {v}"));
        }
        if let Some(v) = &p.prior_experience {
            lines.push(format!("- Prior experience: {v}"));
        }
        if let Some(v) = &p.preferred_examples {
            lines.push(format!("- Preferred examples: {v}"));
        }
        if let Some(v) = &p.tone {
            lines.push(format!("- Tone: {v}"));
        }
    }

    if lines.is_empty() {
        return String::new();
    }
    format!("## Student profile\n{}", lines.join("\n"))
}

fn render_materials(excerpts: &[SearchHit]) -> String {
    if excerpts.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Course material excerpts");
    for hit in excerpts {
        out.push_str(&format!(
            "\n[{} | relevance {:.2}]\n{}",
            hit.name, hit.similarity, hit.excerpt
        ));
    }
    out
}

fn render_history(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Recent conversation");
    for turn in history {
        let speaker = match turn.role {
            TurnRole::User => "Student",
            TurnRole::Model => "Assistant",
        };
        out.push_str(&format!("\n{speaker}: {}", turn.content));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(id: i64, role: TurnRole, content: &str) -> ChatTurn {
        ChatTurn {
            id,
            course_id: "c1".to_string(),
            role,
            content: content.to_string(),
            created_at: format!("2026-01-01T00:00:{id:02}Z"),
        }
    }

    fn hit(name: &str, similarity: f32, excerpt: &str) -> SearchHit {
        SearchHit {
            material_id: name.to_string(),
            name: name.to_string(),
            excerpt: excerpt.to_string(),
            similarity,
            media_type: "application/pdf".to_string(),
        }
    }

    fn full_input<'a>(persona: &'a str, message: &'a str) -> ComposeInput<'a> {
        ComposeInput {
            persona,
            academic: Some(AcademicProfile {
                user_id: "u1".to_string(),
                grades: vec!["A".to_string()],
                semester_type: Some("winter".to_string()),
                semester_number: Some(3),
                subjects: vec!["biology".to_string()],
            }),
            preferences: Some(Preferences {
                detail_level: Some("high".to_string()),
                ..Preferences::default()
            }),
            excerpts: vec![hit("best.pdf", 0.9, "best excerpt"), hit("ok.pdf", 0.5, "ok excerpt")],
            history: vec![
                turn(1, TurnRole::User, "earlier question"),
                turn(2, TurnRole::Model, "earlier answer"),
            ],
            message,
        }
    }

    #[test]
    fn blocks_appear_in_fixed_order() {
        let prompt = compose(full_input("You are a tutor.", "What is mitosis?"), 100_000).unwrap();
        let persona = prompt.find("You are a tutor.").unwrap();
        let profile = prompt.find("## Student profile").unwrap();
        let materials = prompt.find("## Course material excerpts").unwrap();
        let history = prompt.find("## Recent conversation").unwrap();
        let message = prompt.find("What is mitosis?").unwrap();
        assert!(persona < profile);
        assert!(profile < materials);
        assert!(materials < history);
        assert!(history < message);
        // Blocks are separated by a single blank line.
        assert!(prompt.contains("You are a tutor.\n\n## Student profile"));
        assert!(!prompt.contains("\n\n\n"));
    }

    #[test]
    fn missing_blocks_are_elided() {
        let input = ComposeInput {
            persona: "",
            academic: None,
            preferences: None,
            excerpts: Vec::new(),
            history: Vec::new(),
            message: "Just the question",
        };
        let prompt = compose(input, 1000).unwrap();
        assert_eq!(prompt, "Just the question");
    }

    #[test]
    fn excerpts_render_name_and_rounded_score() {
        let prompt = compose(full_input("", "Explain."), 100_000).unwrap();
        assert!(prompt.contains("[best.pdf | relevance 0.90]"));
        assert!(prompt.contains("[ok.pdf | relevance 0.50]"));
        let best = prompt.find("best.pdf").unwrap();
        let ok = prompt.find("ok.pdf").unwrap();
        assert!(best < ok, "descending similarity order must be preserved");
    }

    #[test]
    fn over_budget_drops_oldest_history_first() {
        let make = || {
            let mut input = full_input("persona", "message");
            input.history = vec![
                turn(1, TurnRole::User, "oldest turn content"),
                turn(2, TurnRole::Model, "middle turn content"),
                turn(3, TurnRole::User, "newest turn content"),
            ];
            input
        };
        let full_len = compose(make(), 100_000).unwrap().chars().count();
        // One character short of fitting everything: exactly the oldest
        // turn must be shed, nothing else.
        let prompt = compose(make(), full_len - 1).unwrap();
        assert!(!prompt.contains("oldest turn content"));
        assert!(prompt.contains("middle turn content"));
        assert!(prompt.contains("newest turn content"));
        // Excerpts survive while history still had turns to shed.
        assert!(prompt.contains("best excerpt"));
    }

    #[test]
    fn after_history_lowest_excerpts_are_dropped() {
        let mut input = full_input("", "msg");
        input.history = Vec::new();
        input.academic = None;
        input.preferences = None;
        input.excerpts = vec![
            hit("best.pdf", 0.9, &"A".repeat(50)),
            hit("worst.pdf", 0.1, &"B".repeat(50)),
        ];
        // Room for one excerpt block but not two.
        let prompt = compose(input, 120).unwrap();
        assert!(prompt.contains("best.pdf"));
        assert!(!prompt.contains("worst.pdf"));
    }

    #[test]
    fn final_excerpt_is_tail_truncated() {
        let mut input = full_input("", "msg");
        input.history = Vec::new();
        input.academic = None;
        input.preferences = None;
        input.excerpts = vec![hit("only.pdf", 0.8, &"C".repeat(500))];
        let prompt = compose(input, 200).unwrap();
        assert!(prompt.chars().count() <= 200);
        assert!(prompt.contains("only.pdf"));
        assert!(prompt.contains("CCC"));
        assert!(prompt.ends_with("msg"));
    }

    #[test]
    fn message_alone_over_budget_is_prompt_too_large() {
        let message = "M".repeat(300);
        let input = ComposeInput {
            persona: "persona text",
            academic: None,
            preferences: None,
            excerpts: Vec::new(),
            history: vec![turn(1, TurnRole::User, "old")],
            message: &message,
        };
        match compose(input, 200) {
            Err(CoreError::PromptTooLarge { len, budget }) => {
                assert_eq!(len, 300);
                assert_eq!(budget, 200);
            }
            other => panic!("expected PromptTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn exactly_at_budget_is_accepted() {
        let message = "M".repeat(100);
        let input = ComposeInput {
            persona: "",
            academic: None,
            preferences: None,
            excerpts: Vec::new(),
            history: Vec::new(),
            message: &message,
        };
        let prompt = compose(input, 100).unwrap();
        assert_eq!(prompt.chars().count(), 100);
    }

    #[test]
    fn message_is_never_modified() {
        let message = "  exact   text  with  spacing  ";
        let prompt = compose(full_input("p", message), 100_000).unwrap();
        assert!(prompt.contains(message));
    }

    #[test]
    fn retrieval_gate_requires_course_and_min_length() {
        assert!(should_retrieve("abc", Some("c1"), 3));
        assert!(should_retrieve("abcd", Some("c1"), 3));
        assert!(!should_retrieve("ab", Some("c1"), 3));
        assert!(!should_retrieve("  ab  ", Some("c1"), 3));
        assert!(!should_retrieve("long enough question", None, 3));
    }
}
