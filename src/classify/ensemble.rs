//! Vote fusion: many backend votes in, one intent and confidence out.

use serde::Serialize;

use crate::classify::backend::Vote;
use crate::intent::Intent;

/// Base confidence when every backend agrees (three or more).
const UNANIMOUS: f32 = 0.95;
/// Base confidence for a strict majority (2 of 3).
const MAJORITY: f32 = 0.85;
/// Base confidence when exactly two backends agree.
const PAIR: f32 = 0.90;
/// Base confidence when there is no usable agreement.
const AMBIGUOUS: f32 = 0.60;

/// Asked when the votes agree but there are too few of them.
pub const GENERIC_QUESTION: &str = "Did you mean to create an event or a reminder?";

/// Outcome of fusing a set of votes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consensus {
    pub winner: Intent,
    pub winner_votes: usize,
    pub total_votes: usize,
    /// Agreement-derived confidence before blending.
    pub base_confidence: f32,
    /// Mean of the base confidence and the winners' own confidence.
    pub confidence: f32,
    pub needs_clarification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

/// Fuse votes into a consensus. `None` when there are no votes.
///
/// Ties go to the intent whose first vote appears earliest in `votes`.
pub fn fuse_votes(votes: &[Vote]) -> Option<Consensus> {
    let tally = tally(votes);
    let (winner, voters) = tally
        .iter()
        .fold(None::<&(Intent, Vec<&Vote>)>, |best, group| match best {
            Some(best) if best.1.len() >= group.1.len() => Some(best),
            _ => Some(group),
        })?;

    let n = votes.len();
    let max = voters.len();
    let (base_confidence, needs_clarification) = match base_confidence(max, n) {
        Some(base) => (base, false),
        None => (AMBIGUOUS, true),
    };

    let self_reported =
        voters.iter().map(|v| v.confidence).sum::<f32>() / voters.len() as f32;
    let confidence = ((base_confidence + self_reported) / 2.0).clamp(0.0, 1.0);

    let question = needs_clarification.then(|| clarification_question(&tally));

    Some(Consensus {
        winner: *winner,
        winner_votes: max,
        total_votes: n,
        base_confidence,
        confidence,
        needs_clarification,
        question,
    })
}

/// Group votes by intent, groups in order of first appearance.
fn tally(votes: &[Vote]) -> Vec<(Intent, Vec<&Vote>)> {
    let mut groups: Vec<(Intent, Vec<&Vote>)> = Vec::new();
    for vote in votes {
        match groups.iter_mut().find(|(intent, _)| *intent == vote.intent) {
            Some((_, voters)) => voters.push(vote),
            None => groups.push((vote.intent, vec![vote])),
        }
    }
    groups
}

/// Agreement table. `None` means no confident agreement.
fn base_confidence(max: usize, n: usize) -> Option<f32> {
    match (max, n) {
        (3, 3) => Some(UNANIMOUS),
        (2, 3) => Some(MAJORITY),
        (2, 2) => Some(PAIR),
        (max, n) if n > 3 && max == n => Some(UNANIMOUS),
        (max, n) if n > 3 && max * 2 > n => Some(MAJORITY),
        _ => None,
    }
}

fn clarification_question(tally: &[(Intent, Vec<&Vote>)]) -> String {
    if tally.len() <= 1 {
        return GENERIC_QUESTION.to_string();
    }

    let mut question = String::from("I'm not sure what you meant. Did you want to:\n");
    for (i, (intent, _)) in tally.iter().enumerate() {
        question.push_str(&format!("{}. {}\n", i + 1, intent.describe()));
    }
    question.push_str("Reply with the number of the right option.");
    question
}
