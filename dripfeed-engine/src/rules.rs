//! Rule-text heuristics and rule oracles.

use crate::collaborators::RuleOracle;
use dripfeed_core::{RuleSet, SubredditRules};
use std::collections::HashMap;

const PROHIBIT_PATTERNS: &[&str] = &[
    "no referrals",
    "no referral",
    "no codes",
    "no promo codes",
    "no self-promotion",
    "no self promotion",
    "referrals not allowed",
    "no affiliate",
    "no affiliate links",
];

const MEGATHREAD_REQUIRED_PATTERNS: &[&str] = &[
    "referrals only in",
    "referrals allowed only in",
    "post referrals only in",
    "megathread",
    "weekly thread",
];

/// Classifies free-form rule text (rule titles, descriptions, sidebar).
pub fn classify_rules(text: &str) -> SubredditRules {
    let blob = text.to_lowercase();
    let promotional_allowed = !PROHIBIT_PATTERNS.iter().any(|pat| blob.contains(pat));
    let megathread_required = MEGATHREAD_REQUIRED_PATTERNS
        .iter()
        .any(|pat| blob.contains(pat));

    let trimmed = text.trim();
    SubredditRules {
        promotional_allowed,
        megathread_required,
        summary: (!trimmed.is_empty()).then(|| trimmed.to_string()),
    }
}

pub fn is_megathread_title(title: &str) -> bool {
    let t = title.to_lowercase();
    t.contains("megathread") || (t.contains("weekly") && t.contains("thread"))
}

/// Map-backed oracle. Lookups are case-insensitive; unknown subreddits get
/// the fallback rules (promotion allowed unless configured otherwise).
#[derive(Debug, Clone, Default)]
pub struct StaticRuleOracle {
    rules: HashMap<String, SubredditRules>,
    fallback: SubredditRules,
}

impl StaticRuleOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: SubredditRules) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn insert(&mut self, subreddit: &str, rules: SubredditRules) {
        self.rules.insert(subreddit.to_lowercase(), rules);
    }

    pub fn with_rules(mut self, subreddit: &str, rules: SubredditRules) -> Self {
        self.insert(subreddit, rules);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<RuleSet> for StaticRuleOracle {
    fn from(set: RuleSet) -> Self {
        let mut oracle = Self::new();
        for (subreddit, rules) in set.subreddits {
            oracle.insert(&subreddit, rules);
        }
        oracle
    }
}

impl RuleOracle for StaticRuleOracle {
    fn rules_for(&self, subreddit: &str) -> SubredditRules {
        self.rules
            .get(&subreddit.to_lowercase())
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prohibition_detected() {
        let rules = classify_rules("Rule 3: No self-promotion or affiliate spam.");
        assert!(!rules.promotional_allowed);
        assert!(!rules.megathread_required);

        let rules = classify_rules("Be civil. NO REFERRAL LINKS.");
        assert!(!rules.promotional_allowed);
    }

    #[test]
    fn test_megathread_requirement_detected() {
        let rules = classify_rules("Referrals only in the weekly thread pinned at the top.");
        assert!(rules.promotional_allowed);
        assert!(rules.megathread_required);
    }

    #[test]
    fn test_permissive_rules() {
        let rules = classify_rules("Post your codes with the service name in the title.");
        assert!(rules.promotional_allowed);
        assert!(!rules.megathread_required);
        assert!(rules.summary.is_some());

        assert_eq!(classify_rules("   ").summary, None);
    }

    #[test]
    fn test_megathread_titles() {
        assert!(is_megathread_title("Referral Megathread - May"));
        assert!(is_megathread_title("Weekly referral thread"));
        assert!(!is_megathread_title("My gopuff code"));
        assert!(!is_megathread_title("Weekly deals"));
    }

    #[test]
    fn test_static_oracle_case_insensitive_with_fallback() {
        let oracle = StaticRuleOracle::new()
            .with_rules("Frugal", SubredditRules::forbidding_promotion())
            .with_fallback(SubredditRules::megathread_only());

        assert!(!oracle.rules_for("frugal").promotional_allowed);
        let unknown = oracle.rules_for("ReferralCodes");
        assert!(unknown.promotional_allowed);
        assert!(unknown.megathread_required);
    }

    #[test]
    fn test_oracle_from_rule_set() {
        let set = RuleSet::from_toml_str(
            r#"
            [subreddits.Deals]
            promotional_allowed = false
            "#,
        )
        .unwrap();
        let oracle = StaticRuleOracle::from(set);
        assert_eq!(oracle.len(), 1);
        assert!(!oracle.rules_for("deals").promotional_allowed);
    }
}
