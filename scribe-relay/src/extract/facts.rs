//! Validated task facts extracted from session media

use serde::{Deserialize, Serialize};

/// One actionable fact: a task owned by a character within a project
///
/// Produced by an extraction strategy, consumed by the event processor.
/// Lives only for the processing of one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFact {
    /// Owning project; strategies apply the configured default when the
    /// source names none
    #[serde(default)]
    pub project: String,
    /// Character the task belongs to
    pub character: String,
    /// The task itself
    pub task: String,
    /// Surrounding transcript context, best-effort (may be empty)
    #[serde(default)]
    pub context: String,
    /// Strategy confidence in [0, 1]
    #[serde(default)]
    pub confidence: f32,
}

/// Group facts by character
///
/// Group order follows first appearance; order inside a group follows the
/// input. Character comparison is case-insensitive so "Astra" and "astra"
/// land on one card.
pub fn group_by_character(facts: Vec<TaskFact>) -> Vec<(String, Vec<TaskFact>)> {
    let mut groups: Vec<(String, Vec<TaskFact>)> = Vec::new();

    for fact in facts {
        let key = fact.character.to_lowercase();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(fact),
            None => groups.push((key, vec![fact])),
        }
    }

    // Display name of the first member replaces the lookup key
    groups
        .into_iter()
        .map(|(_, members)| (members[0].character.clone(), members))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(character: &str, task: &str) -> TaskFact {
        TaskFact {
            project: "Campaign".to_string(),
            character: character.to_string(),
            task: task.to_string(),
            context: String::new(),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_grouping_preserves_first_seen_order() {
        let groups = group_by_character(vec![
            fact("Astra", "scout the pass"),
            fact("Brennan", "repair the wagon"),
            fact("Astra", "decode the letter"),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "Astra");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[0].task, "scout the pass");
        assert_eq!(groups[0].1[1].task, "decode the letter");
        assert_eq!(groups[1].0, "Brennan");
    }

    #[test]
    fn test_grouping_is_case_insensitive() {
        let groups = group_by_character(vec![
            fact("astra", "first"),
            fact("Astra", "second"),
        ]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "astra");
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn test_grouping_empty_input() {
        assert!(group_by_character(Vec::new()).is_empty());
    }

    #[test]
    fn test_fact_deserializes_with_defaults() {
        let fact: TaskFact =
            serde_json::from_str(r#"{"character":"Astra","task":"scout"}"#).unwrap();
        assert!(fact.project.is_empty());
        assert!(fact.context.is_empty());
        assert_eq!(fact.confidence, 0.0);
    }
}
