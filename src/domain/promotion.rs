//! Turning mature chat-edit candidates into rule overrides.

use log::info;

use crate::domain::entities::candidate::{Candidate, PatchOp, PatchSpec};
use crate::domain::entities::rule::{OverrideEntry, OverrideFields, Overrides, OverridesRule, Rule};
use crate::domain::rule_applier::apply_overrides;

pub const PROMOTE_SUPPORT: u32 = 2;
pub const PROMOTE_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromotionPolicy {
    pub min_support: u32,
    pub min_confidence: f64,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            min_support: PROMOTE_SUPPORT,
            min_confidence: PROMOTE_CONFIDENCE,
        }
    }
}

impl PromotionPolicy {
    pub fn is_eligible(&self, candidate: &Candidate) -> bool {
        !candidate.is_promoted()
            && candidate.support_count >= self.min_support
            && candidate.confidence >= self.min_confidence
    }
}

/// Merges every eligible candidate into `rule` and stamps it promoted.
/// Returns the new rule, or `None` when nothing was eligible.
pub fn promote_candidates(
    rule: Option<Rule>,
    candidates: &mut [Candidate],
    policy: &PromotionPolicy,
    now: i64,
) -> Option<Rule> {
    let mut current = rule;
    let mut promoted = 0usize;

    for candidate in candidates.iter_mut() {
        if !policy.is_eligible(candidate) {
            continue;
        }
        current = Some(merge_patch(current, &candidate.patch_spec, now));
        candidate.promoted_at = Some(now);
        promoted += 1;
    }

    if promoted == 0 {
        return None;
    }
    info!("promoted {promoted} candidate(s) into rule");
    current
}

/// Folds one patch into a rule. A missing rule starts as empty overrides;
/// a structured rule stays structured and has the patch replayed onto its
/// own sections. The version always moves forward by one.
pub fn merge_patch(rule: Option<Rule>, patch: &PatchSpec, now: i64) -> Rule {
    let delta = overrides_from_patch(patch);

    match rule {
        None => Rule::Overrides(extend_overrides(OverridesRule::empty(now), delta, now)),
        Some(Rule::Overrides(existing)) => Rule::Overrides(extend_overrides(existing, delta, now)),
        Some(Rule::Structured(mut structured)) => {
            structured.sections = apply_overrides(structured.sections, &delta);
            if let Some(first) = structured.sections.first() {
                structured.header_row = first.header_row;
            }
            structured.version += 1;
            structured.updated_at = Some(now);
            Rule::Structured(structured)
        }
    }
}

fn extend_overrides(mut rule: OverridesRule, delta: Overrides, now: i64) -> OverridesRule {
    if delta.header_row.is_some() {
        rule.overrides.header_row = delta.header_row;
    }
    rule.overrides.sections.extend(delta.sections);
    rule.version += 1;
    rule.updated_at = now;
    rule
}

/// Row-bound updates and renames carry over; deletes, merges and
/// grouping edits have no overrides form.
pub fn overrides_from_patch(patch: &PatchSpec) -> Overrides {
    let mut overrides = Overrides::default();

    for op in &patch.operations {
        match op {
            PatchOp::Update { selector, fields } => {
                let entry = OverrideEntry {
                    selector: selector.clone(),
                    fields: OverrideFields {
                        start_row: fields.start_row,
                        end_row: fields.end_row,
                        header_row: fields.header_row,
                        label: None,
                    },
                };
                if !entry.fields.is_empty() {
                    overrides.sections.push(entry);
                }
            }
            PatchOp::Rename { selector, fields } => {
                let label = fields.label.clone().filter(|label| !label.is_empty());
                if let (false, Some(label)) = (selector.value.trim().is_empty(), label) {
                    overrides.sections.push(OverrideEntry {
                        selector: selector.clone(),
                        fields: OverrideFields {
                            label: Some(label),
                            ..OverrideFields::default()
                        },
                    });
                }
            }
            PatchOp::UpdateAll { fields } => {
                if let Some(header_row) = fields.header_row {
                    overrides.header_row = Some(header_row);
                }
            }
            PatchOp::Delete { .. } | PatchOp::Merge { .. } => {}
        }
    }

    overrides
}
