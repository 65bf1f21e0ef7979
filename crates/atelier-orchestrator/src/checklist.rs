//! Master validation checklist
//!
//! Every rule the final validator scores the finished brief against,
//! with weights. The weighted pass percentage must reach the configured
//! publish threshold.

/// One master rule
#[derive(Debug, Clone, Copy)]
pub struct ChecklistRule {
    pub id: u32,
    pub weight: u32,
    pub rule: &'static str,
}

/// The master checklist, weights 1-3
pub const MASTER_CHECKLIST: &[ChecklistRule] = &[
    ChecklistRule {
        id: 1,
        weight: 3,
        rule: "Every page has a visual directive (image, infographic, or data viz)",
    },
    ChecklistRule {
        id: 2,
        weight: 3,
        rule: "Each page carries exactly ONE point and ONE supporting insight, no bullet lists",
    },
    ChecklistRule {
        id: 3,
        weight: 3,
        rule: "Preparer/reviewer pairs argued in multiple rounds (debate evidence present)",
    },
    ChecklistRule {
        id: 4,
        weight: 3,
        rule: "Design palette matches the scanned world mood",
    },
    ChecklistRule {
        id: 5,
        weight: 2,
        rule: "Multiple perspectives covered: history, economy, sociology, future",
    },
    ChecklistRule {
        id: 6,
        weight: 3,
        rule: "Content is neutral: constructively critical of ideas, never of individuals",
    },
    ChecklistRule {
        id: 7,
        weight: 2,
        rule: "Layout audit ran and every page passed the fill check",
    },
    ChecklistRule {
        id: 8,
        weight: 2,
        rule: "Topic was checked against publication history for duplicates",
    },
    ChecklistRule {
        id: 9,
        weight: 2,
        rule: "Each page has a compelling pull quote or key stat",
    },
    ChecklistRule {
        id: 10,
        weight: 2,
        rule: "Copy reads premium and aspirational, not like a textbook",
    },
    ChecklistRule {
        id: 11,
        weight: 1,
        rule: "Brief title is specific to the topic, not a generic label",
    },
    ChecklistRule {
        id: 12,
        weight: 3,
        rule: "No rule was bypassed or shortcut anywhere in the pipeline",
    },
];

/// Checklist rendered for the validator's system prompt
pub fn checklist_prompt() -> String {
    MASTER_CHECKLIST
        .iter()
        .map(|c| format!("  [{}] (weight:{}) {}", c.id, c.weight, c.rule))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sum of all rule weights (the scoring denominator)
pub fn total_weight() -> u32 {
    MASTER_CHECKLIST.iter().map(|c| c.weight).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_unique_and_ordered() {
        for (i, rule) in MASTER_CHECKLIST.iter().enumerate() {
            assert_eq!(rule.id, i as u32 + 1);
        }
    }

    #[test]
    fn test_weights_in_range() {
        assert!(MASTER_CHECKLIST.iter().all(|c| (1..=3).contains(&c.weight)));
        assert!(total_weight() > 0);
    }

    #[test]
    fn test_prompt_lists_every_rule() {
        let prompt = checklist_prompt();
        assert_eq!(prompt.lines().count(), MASTER_CHECKLIST.len());
        assert!(prompt.contains("[1] (weight:3)"));
    }
}
