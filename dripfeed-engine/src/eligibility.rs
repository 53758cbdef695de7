use crate::rules::classify_rules;
use dripfeed_core::{Candidate, RunConfig, SkipReason, SubredditRules};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(SkipReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Posts made so far in a run: the per-subreddit counters, the run total and
/// the threads already posted to. Only the run controller mutates it, and
/// only after a successful dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchLedger {
    per_subreddit: BTreeMap<String, u32>,
    total: u32,
    threads: HashSet<String>,
}

impl DispatchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&mut self, candidate: &Candidate) {
        *self
            .per_subreddit
            .entry(candidate.subreddit.to_lowercase())
            .or_insert(0) += 1;
        self.total += 1;
        self.threads.insert(candidate.thread_id.clone());
    }

    pub fn count_for(&self, subreddit: &str) -> u32 {
        self.per_subreddit
            .get(&subreddit.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn has_posted(&self, thread_id: &str) -> bool {
        self.threads.contains(thread_id)
    }

    pub fn per_subreddit(&self) -> &BTreeMap<String, u32> {
        &self.per_subreddit
    }
}

/// Decides whether `candidate` may be posted to. Checks run in a fixed order
/// and the first failing one names the reason. Pure: nothing is mutated.
pub fn evaluate(
    candidate: &Candidate,
    rules: &SubredditRules,
    ledger: &DispatchLedger,
    config: &RunConfig,
) -> Verdict {
    if ledger.has_posted(&candidate.thread_id) {
        return Verdict::Reject(SkipReason::AlreadyPosted);
    }

    if !promotion_allowed(candidate, rules) {
        return Verdict::Reject(SkipReason::RuleViolation);
    }

    let megathread_only = config.megathread_only || rules.megathread_required;
    if megathread_only && !candidate.flags.is_megathread {
        return Verdict::Reject(SkipReason::NotMegathread);
    }

    if ledger.count_for(&candidate.subreddit) >= config.per_subreddit_cap {
        return Verdict::Reject(SkipReason::SubredditCapReached);
    }

    if ledger.total() >= config.total_cap {
        return Verdict::Reject(SkipReason::TotalCapReached);
    }

    Verdict::Accept
}

// Thread-level rule summaries (e.g. a megathread's own posting rules) can
// forbid promotion even where the subreddit allows it.
fn promotion_allowed(candidate: &Candidate, rules: &SubredditRules) -> bool {
    if !rules.promotional_allowed {
        return false;
    }
    match candidate.flags.rules_summary.as_deref() {
        Some(summary) => classify_rules(summary).promotional_allowed,
        None => true,
    }
}
