//! Deterministic copy variation.
//!
//! Every post is assembled from an opener, the user's base message, a call to
//! action, an optional tip, a closer and an optional disclaimer. Choices are
//! drawn from a generator seeded by `(seed, sequence_index)`, so the same pair
//! always renders the same text.

use crate::stream::seeded_stream;
use dripfeed_core::{ConfigError, EmojiLevel, RunConfig, TemplatePools, Tone};
use fastrand::Rng;
use std::collections::HashMap;

const LOW_EMOJI_PROBABILITY: f64 = 0.3;
const NORMAL_EMOJI_PROBABILITY: f64 = 0.7;

/// Pool indices picked for one rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Selection {
    pub opener: usize,
    pub cta: usize,
    pub closer: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendering {
    pub text: String,
    pub selection: Selection,
}

/// Last selection per subreddit, so consecutive posts in one subreddit do
/// not reuse an opener, CTA or closer.
#[derive(Debug, Default, Clone)]
pub struct VariationMemory {
    last: HashMap<String, Selection>,
}

impl VariationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self, subreddit: &str) -> Option<Selection> {
        self.last.get(&subreddit.to_lowercase()).copied()
    }

    pub fn remember(&mut self, subreddit: &str, selection: Selection) {
        self.last.insert(subreddit.to_lowercase(), selection);
    }
}

struct Fields<'a> {
    brand: String,
    code: &'a str,
    discount: String,
    link: &'a str,
    message: &'a str,
}

#[derive(Debug, Clone)]
pub struct VariationEngine {
    pools: TemplatePools,
}

impl VariationEngine {
    pub fn new(pools: TemplatePools) -> Self {
        Self { pools }
    }

    pub fn pools(&self) -> &TemplatePools {
        &self.pools
    }

    /// Renders post number `sequence_index` of a run.
    ///
    /// `previous` is the selection last used in the target subreddit; when a
    /// pool has more than one entry the same index is never picked twice in
    /// a row.
    pub fn render(
        &self,
        config: &RunConfig,
        sequence_index: u64,
        previous: Option<Selection>,
    ) -> Result<Rendering, ConfigError> {
        self.pools.validate(config)?;

        let mut rng = seeded_stream(config.seed, sequence_index);
        let selection = Selection {
            opener: pick(&mut rng, self.pools.openers.len(), previous.map(|p| p.opener)),
            cta: pick(&mut rng, self.pools.ctas.len(), previous.map(|p| p.cta)),
            closer: pick(&mut rng, self.pools.closers.len(), previous.map(|p| p.closer)),
        };

        let fields = Fields {
            brand: config.brand_display(),
            code: config.referral_code.trim(),
            discount: config.discount.to_string(),
            link: config.referral_link.trim(),
            message: config.base_message.trim(),
        };

        let mut paragraphs = Vec::with_capacity(6);

        let opener = self.fill(&self.pools.openers[selection.opener], &fields, &mut rng);
        if config.tone != Tone::Concise {
            paragraphs.push(opener);
        }

        if !fields.message.is_empty() {
            paragraphs.push(fields.message.to_string());
        }

        paragraphs.push(self.fill(&self.pools.ctas[selection.cta], &fields, &mut rng));

        if config.tone == Tone::Helpful {
            let tip = rng.usize(..self.pools.tips.len());
            paragraphs.push(self.fill(&self.pools.tips[tip], &fields, &mut rng));
        }

        let mut closer = self.fill(&self.pools.closers[selection.closer], &fields, &mut rng);
        for emoji in self.pick_emoji(config.emoji_level, &mut rng) {
            closer.push(' ');
            closer.push_str(emoji);
        }
        paragraphs.push(closer);

        if config.disclaimer {
            paragraphs.push(self.pools.disclaimer.trim().to_string());
        }

        Ok(Rendering {
            text: paragraphs.join("\n\n"),
            selection,
        })
    }

    fn pick_emoji(&self, level: EmojiLevel, rng: &mut Rng) -> Vec<&str> {
        let count = match level {
            EmojiLevel::None => 0,
            EmojiLevel::Low => usize::from(rng.f64() < LOW_EMOJI_PROBABILITY),
            EmojiLevel::Normal => {
                if rng.f64() < NORMAL_EMOJI_PROBABILITY {
                    rng.usize(1..=2)
                } else {
                    0
                }
            }
        };

        (0..count)
            .map(|_| self.pools.emoji[rng.usize(..self.pools.emoji.len())].as_str())
            .collect()
    }

    /// Replaces `{placeholder}` slots. Message fields are substituted verbatim,
    /// synonym slots are spun from the stream, anything else is left as is.
    fn fill(&self, template: &str, fields: &Fields<'_>, rng: &mut Rng) -> String {
        let mut out = String::with_capacity(template.len() + 32);
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };

            let key = &after[..end];
            match self.resolve(key, fields, rng) {
                Some(value) => out.push_str(&value),
                None => {
                    out.push('{');
                    out.push_str(key);
                    out.push('}');
                }
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        out
    }

    fn resolve(&self, key: &str, fields: &Fields<'_>, rng: &mut Rng) -> Option<String> {
        match key {
            "brand" => Some(fields.brand.clone()),
            "code" => Some(fields.code.to_string()),
            "discount" => Some(fields.discount.clone()),
            "link" => Some(fields.link.to_string()),
            "message" => Some(fields.message.to_string()),
            _ => self
                .pools
                .synonyms
                .get(key)
                .filter(|values| !values.is_empty())
                .map(|values| values[rng.usize(..values.len())].clone()),
        }
    }
}

fn pick(rng: &mut Rng, len: usize, previous: Option<usize>) -> usize {
    match previous {
        Some(prev) if len > 1 && prev < len => (prev + rng.usize(1..len)) % len,
        _ => rng.usize(..len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig {
            base_message: "Groceries in 30 minutes, no membership needed.".to_string(),
            brand: "gopuff".to_string(),
            referral_code: "SAVE20".to_string(),
            discount: 20,
            referral_link: "https://example.com/r/SAVE20".to_string(),
            seed: 42,
            ..RunConfig::default()
        }
    }

    fn single_entry_pools() -> TemplatePools {
        TemplatePools {
            openers: vec!["Hi from {brand}!".to_string()],
            ctas: vec!["{discount}% off with {code}.".to_string()],
            closers: vec!["{link}".to_string()],
            tips: vec!["Sign up first.".to_string()],
            emoji: vec!["🙂".to_string()],
            synonyms: Default::default(),
            disclaimer: "Mods: remove if not allowed.".to_string(),
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let engine = VariationEngine::new(TemplatePools::default());
        let config = config();

        for index in 0..20 {
            let a = engine.render(&config, index, None).unwrap();
            let b = engine.render(&config, index, None).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_different_indices_vary() {
        let engine = VariationEngine::new(TemplatePools::default());
        let config = config();

        let texts: std::collections::HashSet<String> = (0..20)
            .map(|i| engine.render(&config, i, None).unwrap().text)
            .collect();
        assert!(texts.len() > 1);
    }

    #[test]
    fn test_field_order_and_substitution() {
        let engine = VariationEngine::new(single_entry_pools());
        let config = RunConfig {
            tone: Tone::Helpful,
            emoji_level: EmojiLevel::None,
            ..config()
        };

        let rendering = engine.render(&config, 0, None).unwrap();
        assert_eq!(
            rendering.text,
            "Hi from Gopuff!\n\n\
             Groceries in 30 minutes, no membership needed.\n\n\
             20% off with SAVE20.\n\n\
             Sign up first.\n\n\
             https://example.com/r/SAVE20\n\n\
             Mods: remove if not allowed."
        );
    }

    #[test]
    fn test_empty_base_message_keeps_opener_cta_closer() {
        let engine = VariationEngine::new(single_entry_pools());
        let config = RunConfig {
            base_message: "   ".to_string(),
            emoji_level: EmojiLevel::None,
            disclaimer: false,
            ..config()
        };

        let rendering = engine.render(&config, 3, None).unwrap();
        assert_eq!(
            rendering.text,
            "Hi from Gopuff!\n\n20% off with SAVE20.\n\nhttps://example.com/r/SAVE20"
        );
    }

    #[test]
    fn test_concise_tone_drops_opener() {
        let engine = VariationEngine::new(single_entry_pools());
        let config = RunConfig {
            tone: Tone::Concise,
            emoji_level: EmojiLevel::None,
            disclaimer: false,
            ..config()
        };

        let text = engine.render(&config, 0, None).unwrap().text;
        assert!(!text.contains("Hi from"));
        assert!(text.starts_with("Groceries in 30 minutes"));
    }

    #[test]
    fn test_emoji_levels() {
        let engine = VariationEngine::new(single_entry_pools());

        let none = RunConfig {
            emoji_level: EmojiLevel::None,
            disclaimer: false,
            ..config()
        };
        for index in 0..50 {
            let text = engine.render(&none, index, None).unwrap().text;
            assert!(!text.contains('🙂'));
        }

        let low = RunConfig {
            emoji_level: EmojiLevel::Low,
            disclaimer: false,
            ..config()
        };
        let mut with_emoji = 0;
        for index in 0..200 {
            let text = engine.render(&low, index, None).unwrap().text;
            let count = text.matches('🙂').count();
            assert!(count <= 1);
            with_emoji += count;
            // Emoji trail the closer
            if count == 1 {
                assert!(text.ends_with("https://example.com/r/SAVE20 🙂"));
            }
        }
        assert!(with_emoji > 0 && with_emoji < 200);

        let normal = RunConfig {
            emoji_level: EmojiLevel::Normal,
            disclaimer: false,
            ..config()
        };
        for index in 0..200 {
            let text = engine.render(&normal, index, None).unwrap().text;
            assert!(text.matches('🙂').count() <= 2);
        }
    }

    #[test]
    fn test_disclaimer_is_last_even_with_emoji() {
        let engine = VariationEngine::new(single_entry_pools());
        let config = RunConfig {
            emoji_level: EmojiLevel::Normal,
            disclaimer: true,
            ..config()
        };

        for index in 0..20 {
            let text = engine.render(&config, index, None).unwrap().text;
            assert!(text.ends_with("Mods: remove if not allowed."));
        }
    }

    #[test]
    fn test_never_repeats_previous_selection() {
        let engine = VariationEngine::new(TemplatePools::default());
        let config = config();

        let mut previous = None;
        for index in 0..100 {
            let rendering = engine.render(&config, index, previous).unwrap();
            if let Some(prev) = previous {
                assert_ne!(rendering.selection.opener, prev.opener);
                assert_ne!(rendering.selection.cta, prev.cta);
                assert_ne!(rendering.selection.closer, prev.closer);
            }
            previous = Some(rendering.selection);
        }
    }

    #[test]
    fn test_single_entry_pool_may_repeat() {
        let engine = VariationEngine::new(single_entry_pools());
        let previous = Some(Selection::default());
        let rendering = engine.render(&config(), 1, previous).unwrap();
        assert_eq!(rendering.selection, Selection::default());
    }

    #[test]
    fn test_empty_pool_fails_fast() {
        let pools = TemplatePools {
            openers: Vec::new(),
            ..TemplatePools::default()
        };
        let engine = VariationEngine::new(pools);
        let result = engine.render(&config(), 0, None);
        assert!(matches!(result, Err(ConfigError::EmptyPool { .. })));
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let pools = TemplatePools {
            ctas: vec!["Use {code} for {mystery} savings {".to_string()],
            ..single_entry_pools()
        };
        let engine = VariationEngine::new(pools);
        let config = RunConfig {
            emoji_level: EmojiLevel::None,
            ..config()
        };
        let text = engine.render(&config, 0, None).unwrap().text;
        assert!(text.contains("Use SAVE20 for {mystery} savings {"));
    }

    #[test]
    fn test_synonym_slots_are_spun() {
        let engine = VariationEngine::new(TemplatePools::default());
        let config = config();
        for index in 0..20 {
            let text = engine.render(&config, index, None).unwrap().text;
            assert!(!text.contains("{hey}"));
            assert!(!text.contains("{at_checkout}"));
            assert!(text.contains("SAVE20"));
        }
    }

    #[test]
    fn test_memory_is_per_subreddit() {
        let mut memory = VariationMemory::new();
        let selection = Selection {
            opener: 1,
            cta: 2,
            closer: 0,
        };
        memory.remember("ReferralCodes", selection);
        assert_eq!(memory.previous("referralcodes"), Some(selection));
        assert_eq!(memory.previous("deals"), None);
    }
}
