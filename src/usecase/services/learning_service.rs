use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::domain::entities::candidate::{Candidate, PatchSpec};
use crate::domain::entities::grid::Grid;
use crate::domain::entities::history::LearnMethod;
use crate::domain::entities::rule::{OverridesRule, Rule};
use crate::domain::entities::section::{to_drafts, Section};
use crate::domain::index::{normalize_index_base, validate_sections};
use crate::domain::promotion::{promote_candidates, PromotionPolicy};
use crate::domain::rule_applier::apply_rule;
use crate::unix_now;
use crate::usecase::ports::collaborators::RuleSynthesizer;
use crate::usecase::ports::repo::{RepoError, RuleKey, RuleRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LearnedRule {
    pub method: LearnMethod,
    pub version: i64,
}

/// Rule memory: lookup, learning from confirmations and the candidate
/// ledger fed by chat edits.
pub struct LearningService {
    rules: Arc<dyn RuleRepository>,
    policy: PromotionPolicy,
    default_user: String,
}

impl LearningService {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        policy: PromotionPolicy,
        default_user: impl Into<String>,
    ) -> Self {
        Self {
            rules,
            policy,
            default_user: default_user.into(),
        }
    }

    /// The requesting user's rule, else the default user's.
    pub fn lookup_rule(
        &self,
        user_id: &str,
        fingerprint: &str,
    ) -> Result<Option<(RuleKey, Rule)>, RepoError> {
        let own = RuleKey::new(user_id, fingerprint);
        if let Some(rule) = self.rules.load_rule(&own)? {
            return Ok(Some((own, rule)));
        }
        if user_id == self.default_user {
            return Ok(None);
        }
        let shared = RuleKey::new(self.default_user.as_str(), fingerprint);
        Ok(self.rules.load_rule(&shared)?.map(|rule| (shared, rule)))
    }

    /// Remembers confirmed sections. A synthesized rule is kept only when
    /// replaying it on the grid gives a valid, non-empty list; otherwise
    /// every section is pinned through overrides.
    pub fn learn_from_confirmed(
        &self,
        key: &RuleKey,
        grid: &Grid,
        sections: &[Section],
        synthesizer: &dyn RuleSynthesizer,
    ) -> Result<LearnedRule, RepoError> {
        let now = unix_now();
        let (rule, method) = match self.trial_synthesis(grid, sections, synthesizer, now) {
            Some(rule) => (rule, LearnMethod::Synthesized),
            None => (
                Rule::Overrides(OverridesRule::from_confirmed(sections, now)),
                LearnMethod::OverridesFallback,
            ),
        };
        let version = rule.version();

        let mut pending = Some(rule);
        self.rules.update_ledger(key, &mut |state| {
            state.rule = pending.take();
            true
        })?;

        info!(
            "learned {:?} rule v{version} for {}/{}",
            method, key.user_id, key.fingerprint
        );
        Ok(LearnedRule { method, version })
    }

    fn trial_synthesis(
        &self,
        grid: &Grid,
        sections: &[Section],
        synthesizer: &dyn RuleSynthesizer,
        version: i64,
    ) -> Option<Rule> {
        let rule = match synthesizer.synthesize(grid, sections, version) {
            Ok(Some(rule)) => rule,
            Ok(None) => return None,
            Err(err) => {
                warn!("rule synthesis failed: {err:#}");
                return None;
            }
        };

        let trial = apply_rule(grid, &rule);
        let normalized = normalize_index_base(&to_drafts(&trial), grid.nrows());
        match validate_sections(&normalized.drafts, grid.nrows()) {
            Ok(replayed) if !replayed.is_empty() => Some(rule),
            Ok(_) => None,
            Err(err) => {
                debug!("synthesized rule failed its trial: {err}");
                None
            }
        }
    }

    /// Counts another sighting of `patch_spec`, or opens a new candidate.
    pub fn upsert_candidate(
        &self,
        key: &RuleKey,
        patch_spec: &PatchSpec,
        confidence: f64,
    ) -> Result<(), RepoError> {
        let signature = patch_spec
            .signature()
            .map_err(|err| RepoError::Message(format!("failed to sign patch: {err}")))?;
        let now = unix_now();

        self.rules.update_ledger(key, &mut |state| {
            match state
                .candidates
                .iter_mut()
                .find(|candidate| candidate.key == signature)
            {
                Some(existing) => existing.observe(confidence, now),
                None => state.candidates.push(Candidate::new(
                    signature.clone(),
                    patch_spec.clone(),
                    confidence,
                    now,
                )),
            }
            true
        })?;
        Ok(())
    }

    /// Fire-and-forget variant for the chat path: failures are logged and
    /// never reach the caller.
    pub fn record_edit(&self, key: &RuleKey, patch_spec: &PatchSpec, confidence: f64) {
        if patch_spec.operations.is_empty() {
            return;
        }
        if let Err(err) = self.upsert_candidate(key, patch_spec, confidence) {
            warn!(
                "failed to record candidate for {}/{}: {err}",
                key.user_id, key.fingerprint
            );
        }
    }

    /// Merges every mature candidate into the rule of `key`. Rule and ledger
    /// are written in the same transaction.
    pub fn promote_best_candidates(&self, key: &RuleKey) -> Result<bool, RepoError> {
        let now = unix_now();
        let policy = self.policy;
        self.rules.update_ledger(key, &mut |state| {
            match promote_candidates(state.rule.take(), &mut state.candidates, &policy, now) {
                Some(rule) => {
                    state.rule = Some(rule);
                    true
                }
                None => false,
            }
        })
    }
}
