//! Run configuration, template pools and offline rule sets.
//!
//! Everything here is plain data loaded from TOML. Validation happens once,
//! before a run starts, so the engine can treat these values as trusted.

use crate::{ConfigError, EmojiLevel, SubredditRules, Tone};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Immutable settings for one drip-posting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub base_message: String,
    pub brand: String,
    pub referral_code: String,
    /// Discount percentage advertised in the call to action.
    pub discount: u32,
    pub referral_link: String,
    pub tone: Tone,
    pub emoji_level: EmojiLevel,
    pub megathread_only: bool,
    pub posts_per_hour: f64,
    pub per_subreddit_cap: u32,
    pub total_cap: u32,
    pub dry_run: bool,
    pub seed: u64,
    pub disclaimer: bool,
    /// Upper bound of the extra delay added to every pacing interval.
    pub jitter_seconds: u64,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_message: String::new(),
            brand: String::new(),
            referral_code: String::new(),
            discount: 0,
            referral_link: String::new(),
            tone: Tone::Friendly,
            emoji_level: EmojiLevel::Low,
            megathread_only: true,
            posts_per_hour: 1.0,
            per_subreddit_cap: 1,
            total_cap: 10,
            dry_run: false,
            seed: 0,
            disclaimer: true,
            jitter_seconds: 0,
            start_at: None,
            end_at: None,
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read_config_file(path)?)
    }

    /// Checks the invariants a run relies on. Caps are unsigned, so a
    /// negative cap is already rejected while parsing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.posts_per_hour.is_finite() || self.posts_per_hour <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "posts_per_hour".to_string(),
                value: self.posts_per_hour.to_string(),
            });
        }

        if self.discount > 100 {
            return Err(ConfigError::InvalidValue {
                field: "discount".to_string(),
                value: self.discount.to_string(),
            });
        }

        if let (Some(start), Some(end)) = (self.start_at, self.end_at) {
            if end <= start {
                return Err(ConfigError::InvalidValue {
                    field: "end_at".to_string(),
                    value: end.to_rfc3339(),
                });
            }
        }

        let link = self.referral_link.trim();
        if !link.is_empty() && url::Url::parse(link).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "referral_link".to_string(),
                value: link.to_string(),
            });
        }

        Ok(())
    }

    /// Minimum spacing between two dispatches: `3600 / posts_per_hour` seconds,
    /// rounded up to whole milliseconds.
    pub fn pacing_interval(&self) -> Duration {
        let millis = (3_600_000.0 / self.posts_per_hour).ceil();
        if millis >= i64::MAX as f64 {
            Duration::MAX
        } else {
            Duration::milliseconds(millis as i64)
        }
    }

    pub fn brand_display(&self) -> String {
        let brand = self.brand.trim();
        if brand.is_empty() {
            return "This service".to_string();
        }
        brand
            .split_whitespace()
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}

/// Copy fragments the variation engine draws from. Injected per run and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatePools {
    pub openers: Vec<String>,
    pub ctas: Vec<String>,
    pub closers: Vec<String>,
    pub tips: Vec<String>,
    pub emoji: Vec<String>,
    pub synonyms: BTreeMap<String, Vec<String>>,
    pub disclaimer: String,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for TemplatePools {
    fn default() -> Self {
        let synonyms = [
            ("hey", &["Hey", "Hi", "Hello", "Quick heads-up:", "FYI:"][..]),
            ("delivers", &["delivers", "brings", "drops off"][..]),
            ("more", &["more", "other essentials", "etc."][..]),
            ("get", &["Get", "Grab", "Take"][..]),
            ("first_order", &["first order", "first purchase", "first delivery"][..]),
            ("use_code", &["use my code", "apply code", "use the code"][..]),
            ("at_checkout", &["at checkout", "at sign-up", "when you order"][..]),
            ("hope_helps", &["hope this helps", "hope this is useful", "might help someone"][..]),
            ("link_phrase", &["Here's the link", "Direct link", "Sign-up link", "My link"][..]),
        ]
        .into_iter()
        .map(|(key, values)| (key.to_string(), strings(values)))
        .collect();

        Self {
            openers: strings(&[
                "{hey}! {brand} {delivers} food, drinks and {more} in about 30 minutes.",
                "{hey}! If you're trying {brand} for the first time, this might help.",
                "{hey}! Sharing a {brand} referral that helped me recently:",
            ]),
            ctas: strings(&[
                "{get} {discount}% off your {first_order}: {use_code} {code} {at_checkout}.",
                "Score {discount}% off your {first_order} with code {code} {at_checkout}.",
                "{get} {discount}% off with code {code} {at_checkout}.",
            ]),
            closers: strings(&[
                "{hope_helps}. {link_phrase}: {link}",
                "{link_phrase}: {link} ({hope_helps}).",
                "{link} ({hope_helps}).",
            ]),
            tips: strings(&[
                "If you don't see the code field, sign up first, then add it {at_checkout}.",
                "Codes usually only work on a brand-new account.",
                "Double-check the discount shows up before you place the order.",
            ]),
            emoji: strings(&["🙂", "🚚", "🎉", "👍", "🛒"]),
            synonyms,
            disclaimer: "Mods: if this isn't allowed here, please remove. No worries.".to_string(),
        }
    }
}

impl TemplatePools {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read_config_file(path)?)
    }

    /// Fails on any pool the given run would draw from being empty.
    pub fn validate(&self, config: &RunConfig) -> Result<(), ConfigError> {
        let mut required: Vec<(&str, bool)> = vec![
            ("openers", self.openers.is_empty()),
            ("ctas", self.ctas.is_empty()),
            ("closers", self.closers.is_empty()),
        ];
        if config.tone == Tone::Helpful {
            required.push(("tips", self.tips.is_empty()));
        }
        if config.emoji_level != EmojiLevel::None {
            required.push(("emoji", self.emoji.is_empty()));
        }
        if config.disclaimer {
            required.push(("disclaimer", self.disclaimer.trim().is_empty()));
        }

        if let Some((pool, _)) = required.into_iter().find(|(_, empty)| *empty) {
            return Err(ConfigError::EmptyPool {
                pool: pool.to_string(),
            });
        }

        if let Some((key, _)) = self.synonyms.iter().find(|(_, values)| values.is_empty()) {
            return Err(ConfigError::EmptyPool {
                pool: format!("synonyms.{}", key),
            });
        }

        Ok(())
    }
}

/// Per-subreddit rule metadata for offline runs, keyed by subreddit name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub subreddits: BTreeMap<String, SubredditRules>,
}

impl RuleSet {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read_config_file(path)?)
    }
}

/// Reads a configuration file, reporting a missing path as
/// `ConfigError::FileNotFound`.
pub fn read_config_file(path: impl AsRef<Path>) -> Result<String, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidFormat {
        details: format!("{}: {}", path.display(), e),
    })
}
