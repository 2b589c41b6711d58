//! The ten workflow steps, as a closed enum.
//!
//! Step ordinals double as the session's `step_index` values: index `n`
//! means steps 1..=n are complete. Artifact keys carry a two-digit ordinal
//! prefix; their presence on disk is itself a resume index.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Analysis,
    Expression,
    Cultural,
    Title,
    FirstDraft,
    SelfCritique,
    SecondRefinement,
    Final,
    ExternalReview,
    Refinement,
}

/// All steps in execution order.
pub const ALL_STEPS: [Step; 10] = [
    Step::Analysis,
    Step::Expression,
    Step::Cultural,
    Step::Title,
    Step::FirstDraft,
    Step::SelfCritique,
    Step::SecondRefinement,
    Step::Final,
    Step::ExternalReview,
    Step::Refinement,
];

impl Step {
    /// 1-based position in the workflow.
    pub fn ordinal(&self) -> u32 {
        match self {
            Step::Analysis => 1,
            Step::Expression => 2,
            Step::Cultural => 3,
            Step::Title => 4,
            Step::FirstDraft => 5,
            Step::SelfCritique => 6,
            Step::SecondRefinement => 7,
            Step::Final => 8,
            Step::ExternalReview => 9,
            Step::Refinement => 10,
        }
    }

    pub fn from_ordinal(n: u32) -> Option<Step> {
        ALL_STEPS.iter().copied().find(|s| s.ordinal() == n)
    }

    /// Stable artifact key, used as the file stem of the step artifact.
    pub fn key(&self) -> &'static str {
        match self {
            Step::Analysis => "01_analysis",
            Step::Expression => "02_expression_exploration",
            Step::Cultural => "03_cultural_adaptation",
            Step::Title => "04_title_exploration",
            Step::FirstDraft => "05_first_translation",
            Step::SelfCritique => "06_first_refinement",
            Step::SecondRefinement => "07_second_refinement",
            Step::Final => "08_final_translation",
            Step::ExternalReview => "09_external_review",
            Step::Refinement => "10_refined_final",
        }
    }

    /// Human-readable name for labels and progress output.
    pub fn title(&self) -> &'static str {
        match self {
            Step::Analysis => "Analysis",
            Step::Expression => "Expression Exploration",
            Step::Cultural => "Cultural Adaptation",
            Step::Title => "Title Exploration",
            Step::FirstDraft => "First Translation",
            Step::SelfCritique => "First Refinement",
            Step::SecondRefinement => "Second Refinement",
            Step::Final => "Final Translation",
            Step::ExternalReview => "External Review",
            Step::Refinement => "Refined Final",
        }
    }

    /// Steps whose output must reproduce the entire source are routed
    /// through the continuation engine; discursive steps are not.
    pub fn needs_stitching(&self) -> bool {
        matches!(
            self,
            Step::FirstDraft
                | Step::SelfCritique
                | Step::SecondRefinement
                | Step::Final
                | Step::Refinement
        )
    }

    /// Steps that inject very large content (full source or a full prior
    /// draft) and are therefore subject to the conversation-reset check.
    pub fn injects_large_content(&self) -> bool {
        matches!(self, Step::Analysis | Step::FirstDraft | Step::Final)
    }
}

/// Priority order for the best-effort final save: most refined first.
pub const ARTIFACT_PRIORITY: [Step; 5] = [
    Step::Refinement,
    Step::Final,
    Step::SecondRefinement,
    Step::SelfCritique,
    Step::FirstDraft,
];
