use crate::models::{RubricStep, ScoreTable, StepLabel};

/// Weight of a single chunk's vote
const VOTE_WEIGHT: f64 = 1.0;

/// Step with the maximum score; an empty table selects the fallback step
pub fn select_from_table(table: &ScoreTable) -> RubricStep {
    table.best().map(|(step, _)| step).unwrap_or(RubricStep::FALLBACK)
}

/// Winning step of each table, order-aligned with the input
pub fn top_steps(tables: &[ScoreTable]) -> Vec<RubricStep> {
    tables.iter().map(select_from_table).collect()
}

/// Reduce several chunks' tables to one primary step by majority vote.
///
/// Each chunk votes once for its own top step. The step with the largest tally
/// wins; tallies that tie go to the step whose first vote came earliest in
/// chunk order. No tables selects the fallback step.
pub fn select_by_vote(tables: &[ScoreTable]) -> RubricStep {
    // Kept in first-vote order
    let mut tally: Vec<(RubricStep, f64)> = Vec::new();
    for step in top_steps(tables) {
        match tally.iter_mut().find(|(voted, _)| *voted == step) {
            Some((_, votes)) => *votes += VOTE_WEIGHT,
            None => tally.push((step, VOTE_WEIGHT)),
        }
    }

    let mut best: Option<(RubricStep, f64)> = None;
    for (step, votes) in tally {
        if best.is_none_or(|(_, best_votes)| votes > best_votes) {
            best = Some((step, votes));
        }
    }
    best.map(|(step, _)| step).unwrap_or(RubricStep::FALLBACK)
}

/// Pick the first matched step of the most confident label that matched anything.
///
/// Equal confidences keep the earliest label.
pub fn select_from_labels(labels: &[StepLabel]) -> RubricStep {
    let mut best: Option<(&StepLabel, RubricStep)> = None;
    for label in labels {
        let Some(&first) = label.step_ids.first() else {
            continue;
        };
        let better = best.is_none_or(|(current, _)| label.confidence > current.confidence);
        if better {
            best = Some((label, first));
        }
    }
    best.map(|(_, step)| step).unwrap_or(RubricStep::FALLBACK)
}
