use chrono::{Datelike, NaiveDate};

use daybook_types::models::Question;

/// Prompts served when the question source cannot be reached.
const FALLBACK_PROMPTS: &[&str] = &[
    "What is one thing you are grateful for today, and why?",
    "What challenged you today, and how did you respond?",
    "Describe a moment today when you felt fully present.",
    "What is something you learned about yourself recently?",
    "Who made a difference in your day, and how?",
    "What would you like to let go of before tomorrow?",
    "What small win from today deserves more credit than you gave it?",
];

/// Deterministic prompt for a calendar day: day-of-year modulo the set size.
///
/// Fallback IDs are negative (-1 to -7) so they never collide with source
/// rows, which start at 1.
pub fn fallback_question(day: NaiveDate) -> Question {
    let index = day.ordinal() as usize % FALLBACK_PROMPTS.len();
    Question {
        id: -(index as i64 + 1),
        text: FALLBACK_PROMPTS[index].to_string(),
    }
}

/// True for IDs handed out by [`fallback_question`].
pub fn is_fallback_id(id: i64) -> bool {
    (-(FALLBACK_PROMPTS.len() as i64)..=-1).contains(&id)
}
