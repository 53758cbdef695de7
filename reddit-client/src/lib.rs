pub mod api;
pub mod discovery;

pub use api::{
    api_error, candidates_from_listing, parse_comment_response, rules_from_response,
    search_cutoff, search_query, status_error, title_matches, ApiTarget, RedditApiClient,
    RedditListing, RedditPostData, RedditRule, RedditRulesResponse,
};
pub use discovery::{
    prefetch_rules, preset_terms, DiscoveryConfig, ThreadDiscovery, MAX_DAYS_BACK,
};
