//! Candidate discovery and rule prefetching over the live API.

use crate::api::{search_query, RedditApiClient};
use dripfeed_core::{Candidate, ConfigError, ErrorExt};
use dripfeed_engine::StaticRuleOracle;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ALLOWLIST: &[&str] = &[
    "ReferralCodes",
    "ReferAFriend",
    "ReferralTrains",
    "SignUpBonuses",
    "ReferralLinks",
    "Referrals",
    "TheReferralHub",
];

pub const DEFAULT_GENERIC_TERMS: &[&str] = &[
    "referral",
    "referrals",
    "referral code",
    "referral codes",
    "promo code",
    "promocodes",
    "coupon code",
    "megathread",
    "weekly megathread",
];

/// Search terms for well-known brands, used when none are configured.
pub fn preset_terms(brand: &str) -> &'static [&'static str] {
    match brand.trim().to_lowercase().as_str() {
        "gopuff" => &["gopuff", "alcohol delivery", "grocery delivery"],
        "uber eats" | "ubereats" => &["uber eats", "ubereats", "food delivery"],
        "grubhub" => &["grubhub", "food delivery"],
        "doordash" => &["doordash", "food delivery"],
        "instacart" => &["instacart", "grocery delivery"],
        "uber" => &["uber", "ride share", "rideshare"],
        "lyft" => &["lyft", "ride share", "rideshare"],
        _ => &[],
    }
}

/// Longest search window a run file may ask for.
pub const MAX_DAYS_BACK: u32 = 3650;

/// The `[discovery]` table of a run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub allowlist: Vec<String>,
    pub brand_terms: Vec<String>,
    pub generic_terms: Vec<String>,
    pub days_back: u32,
    pub search_limit: u32,
    pub discover_subreddits: bool,
    pub subreddit_search_limit: u32,
    pub request_spacing_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            allowlist: DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            brand_terms: Vec::new(),
            generic_terms: DEFAULT_GENERIC_TERMS.iter().map(|s| s.to_string()).collect(),
            days_back: 60,
            search_limit: 50,
            discover_subreddits: false,
            subreddit_search_limit: 25,
            request_spacing_ms: 1000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RunFile {
    #[serde(default)]
    discovery: DiscoveryConfig,
}

impl DiscoveryConfig {
    /// Reads the `[discovery]` table out of a run file; absent means defaults.
    pub fn from_run_toml(content: &str) -> Result<Self, ConfigError> {
        let file: RunFile = toml::from_str(content)?;
        file.discovery.validate()?;
        Ok(file.discovery)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.days_back > MAX_DAYS_BACK {
            return Err(ConfigError::InvalidValue {
                field: "discovery.days_back".to_string(),
                value: self.days_back.to_string(),
            });
        }
        Ok(())
    }

    /// Brand terms (configured, else the brand's preset), the brand itself,
    /// then the generic terms. Case-insensitive duplicates are dropped.
    pub fn terms_for(&self, brand: &str) -> Vec<String> {
        let brand_terms: Vec<String> = if self.brand_terms.is_empty() {
            preset_terms(brand).iter().map(|s| s.to_string()).collect()
        } else {
            self.brand_terms.clone()
        };

        let mut seen = HashSet::new();
        brand_terms
            .into_iter()
            .chain(std::iter::once(brand.to_string()))
            .chain(self.generic_terms.iter().cloned())
            .map(|term| term.trim().to_string())
            .filter(|term| !term.is_empty() && seen.insert(term.to_lowercase()))
            .collect()
    }
}

pub struct ThreadDiscovery<'a> {
    client: &'a RedditApiClient,
    config: DiscoveryConfig,
}

impl<'a> ThreadDiscovery<'a> {
    pub fn new(client: &'a RedditApiClient, config: DiscoveryConfig) -> Self {
        Self { client, config }
    }

    /// Searches the allowlist (then, if enabled, subreddits found by term
    /// search) and returns the candidates in discovery order. A failing
    /// subreddit is logged and skipped.
    pub async fn discover(&self, brand: &str) -> Vec<Candidate> {
        let terms = self.config.terms_for(brand);
        let query = search_query(&terms);
        let mut searched: HashSet<String> = HashSet::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut candidates = Vec::new();

        for subreddit in &self.config.allowlist {
            if searched.insert(subreddit.to_lowercase()) {
                self.search_into(subreddit, &query, &mut seen, &mut candidates)
                    .await;
            }
        }

        if self.config.discover_subreddits {
            for term in &terms {
                let found = match self
                    .client
                    .search_subreddits(term, self.config.subreddit_search_limit)
                    .await
                {
                    Ok(found) => found,
                    Err(e) => {
                        e.log_warn();
                        warn!(term = %term, "Subreddit discovery failed for term");
                        continue;
                    }
                };
                self.pause().await;

                for subreddit in found {
                    if searched.insert(subreddit.to_lowercase()) {
                        self.search_into(&subreddit, &query, &mut seen, &mut candidates)
                            .await;
                    }
                }
            }
        }

        info!(
            candidates = candidates.len(),
            subreddits = searched.len(),
            "Discovery finished"
        );
        candidates
    }

    async fn search_into(
        &self,
        subreddit: &str,
        query: &str,
        seen: &mut HashSet<(String, String)>,
        out: &mut Vec<Candidate>,
    ) {
        match self
            .client
            .search_threads(
                subreddit,
                query,
                self.config.search_limit,
                self.config.days_back,
            )
            .await
        {
            Ok(found) => {
                for candidate in found {
                    let key = (
                        candidate.subreddit.to_lowercase(),
                        candidate.thread_id.clone(),
                    );
                    if seen.insert(key) {
                        out.push(candidate);
                    }
                }
            }
            Err(e) => {
                e.log_warn();
                warn!(subreddit = %subreddit, "Thread search failed, skipping subreddit");
            }
        }
        self.pause().await;
    }

    async fn pause(&self) {
        if self.config.request_spacing_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.request_spacing_ms)).await;
        }
    }
}

/// Fetches rules for every distinct subreddit in `candidates`. Subreddits
/// whose rules cannot be read fall back to the oracle's permissive default.
pub async fn prefetch_rules(
    client: &RedditApiClient,
    candidates: &[Candidate],
) -> StaticRuleOracle {
    let mut oracle = StaticRuleOracle::new();
    let mut fetched = HashSet::new();

    for candidate in candidates {
        if !fetched.insert(candidate.subreddit.to_lowercase()) {
            continue;
        }
        match client.fetch_rules(&candidate.subreddit).await {
            Ok(rules) => {
                debug!(subreddit = %candidate.subreddit, "Rules cached");
                oracle.insert(&candidate.subreddit, rules);
            }
            Err(e) => {
                e.log_warn();
                warn!(
                    subreddit = %candidate.subreddit,
                    "Could not read rules, treating subreddit as unrestricted"
                );
            }
        }
    }

    oracle
}
