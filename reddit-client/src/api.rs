use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dripfeed_core::{Candidate, RedditApiError, SubredditRules};
use dripfeed_engine::{classify_rules, is_megathread_title, PostReceipt, Poster};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_WEB_BASE: &str = "https://www.reddit.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER: u64 = 60;

/// Title words a search hit must contain to be worth a referral reply.
pub const TITLE_KEYWORDS: &[&str] = &[
    "referral",
    "promo",
    "code",
    "coupon",
    "discount",
    "megathread",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditSubredditData {
    pub display_name: String,
    #[serde(default)]
    pub over18: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedditRulesResponse {
    #[serde(default)]
    pub rules: Vec<RedditRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedditRule {
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    json: CommentJson,
}

#[derive(Debug, Deserialize)]
struct CommentJson {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    data: Option<CommentData>,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    #[serde(default)]
    things: Vec<RedditListingChild<CommentThing>>,
}

#[derive(Debug, Deserialize)]
struct CommentThing {
    id: Option<String>,
    permalink: Option<String>,
}

/// What a request was about, so HTTP failures can name the right thing.
#[derive(Debug, Clone, Copy)]
pub enum ApiTarget<'a> {
    Thread {
        subreddit: &'a str,
        thread_id: &'a str,
    },
    Subreddit(&'a str),
    Endpoint(&'a str),
}

/// Maps a non-success HTTP status to the matching API error.
/// Returns `None` for 2xx statuses.
pub fn status_error(
    status: StatusCode,
    retry_after: Option<&str>,
    target: ApiTarget<'_>,
) -> Option<RedditApiError> {
    if status.is_success() {
        return None;
    }

    let error = match status.as_u16() {
        401 => RedditApiError::InvalidToken,
        403 => match target {
            ApiTarget::Thread { subreddit, .. } => RedditApiError::Banned {
                subreddit: subreddit.to_string(),
            },
            ApiTarget::Subreddit(subreddit) => RedditApiError::Forbidden {
                resource: format!("r/{}", subreddit),
            },
            ApiTarget::Endpoint(endpoint) => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
        },
        404 => match target {
            ApiTarget::Thread { thread_id, .. } => RedditApiError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            },
            ApiTarget::Subreddit(subreddit) => RedditApiError::SubredditNotFound {
                subreddit: subreddit.to_string(),
            },
            ApiTarget::Endpoint(endpoint) => RedditApiError::InvalidResponse {
                details: format!("Resource not found: {}", endpoint),
            },
        },
        408 => RedditApiError::RequestTimeout,
        429 => RedditApiError::RateLimitExceeded {
            retry_after: retry_after
                .and_then(|value| value.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(|secs| secs.ceil() as u64)
                .unwrap_or(DEFAULT_RETRY_AFTER),
        },
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {}", code),
        },
    };

    Some(error)
}

/// Maps an entry of Reddit's `json.errors` list to an API error.
pub fn api_error(code: &str, message: &str, subreddit: &str, thread_id: &str) -> RedditApiError {
    match code {
        "THREAD_LOCKED" => RedditApiError::ThreadLocked {
            thread_id: thread_id.to_string(),
        },
        "TOO_OLD" => RedditApiError::ThreadArchived {
            thread_id: thread_id.to_string(),
        },
        "RATELIMIT" => RedditApiError::RateLimitExceeded {
            retry_after: ratelimit_seconds(message).unwrap_or(DEFAULT_RETRY_AFTER),
        },
        "BANNED" | "SUBREDDIT_NOTALLOWED" => RedditApiError::Banned {
            subreddit: subreddit.to_string(),
        },
        "SUBREDDIT_NOEXIST" => RedditApiError::SubredditNotFound {
            subreddit: subreddit.to_string(),
        },
        "DELETED_LINK" | "NO_THING_ID" => RedditApiError::ThreadNotFound {
            thread_id: thread_id.to_string(),
        },
        "USER_REQUIRED" => RedditApiError::AuthenticationFailed {
            reason: message.to_string(),
        },
        other => RedditApiError::InvalidResponse {
            details: format!("{}: {}", other, message),
        },
    }
}

/// Reads the wait out of messages like "try again in 7 minutes".
pub fn ratelimit_seconds(message: &str) -> Option<u64> {
    const MARKER: &str = "try again in ";
    let lower = message.to_lowercase();
    let rest = &lower[lower.find(MARKER)? + MARKER.len()..];
    let mut words = rest.split_whitespace();
    let amount: u64 = words.next()?.parse().ok()?;
    let unit = words.next()?;

    let factor = if unit.starts_with("millisecond") {
        return Some(1);
    } else if unit.starts_with("second") {
        1
    } else if unit.starts_with("minute") {
        60
    } else if unit.starts_with("hour") {
        3600
    } else {
        return None;
    };
    Some(amount.saturating_mul(factor))
}

/// Parses the body of `POST /api/comment` with `api_type=json`.
pub fn parse_comment_response(
    body: &str,
    subreddit: &str,
    thread_id: &str,
) -> Result<PostReceipt, RedditApiError> {
    let response: CommentResponse =
        serde_json::from_str(body).map_err(|e| RedditApiError::InvalidResponse {
            details: format!("Failed to parse comment response: {}", e),
        })?;

    if let Some(entry) = response.json.errors.first() {
        let code = entry.first().and_then(|v| v.as_str()).unwrap_or("UNKNOWN");
        let message = entry.get(1).and_then(|v| v.as_str()).unwrap_or_default();
        return Err(api_error(code, message, subreddit, thread_id));
    }

    let thing = response
        .json
        .data
        .and_then(|data| data.things.into_iter().next())
        .ok_or_else(|| RedditApiError::InvalidResponse {
            details: "Comment response contained no comment".to_string(),
        })?;

    Ok(PostReceipt {
        comment_id: thing.data.id,
        permalink: thing
            .data
            .permalink
            .map(|path| format!("{}{}", REDDIT_WEB_BASE, path)),
    })
}

/// Search query over thread titles, e.g. `title:"gopuff" OR title:"promo code"`.
pub fn search_query(terms: &[String]) -> String {
    let clauses: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("title:\"{}\"", t.replace('"', "")))
        .collect();

    if clauses.is_empty() {
        "referral".to_string()
    } else {
        clauses.join(" OR ")
    }
}

pub fn title_matches(title: &str) -> bool {
    let title = title.to_lowercase();
    TITLE_KEYWORDS.iter().any(|keyword| title.contains(keyword))
}

/// Oldest creation time a search still accepts, clamped to the earliest
/// representable instant.
pub fn search_cutoff(now: DateTime<Utc>, days_back: u32) -> DateTime<Utc> {
    ChronoDuration::try_days(i64::from(days_back))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Turns a search listing into candidates: recent, on-topic threads that
/// still accept comments, in listing order.
pub fn candidates_from_listing(
    listing: RedditListing<RedditPostData>,
    subreddit: &str,
    cutoff: DateTime<Utc>,
    discovered_at: DateTime<Utc>,
) -> Vec<Candidate> {
    let cutoff_secs = cutoff.timestamp() as f64;

    listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .filter(|post| {
            if post.created_utc < cutoff_secs || !title_matches(&post.title) {
                return false;
            }
            if post.locked || post.archived {
                debug!(thread_id = %post.id, "Skipping thread that no longer accepts comments");
                return false;
            }
            true
        })
        .map(|post| {
            let sub = if post.subreddit.is_empty() {
                subreddit.to_string()
            } else {
                post.subreddit
            };
            let megathread = is_megathread_title(&post.title);
            Candidate::new(sub, post.id)
                .with_title(post.title)
                .megathread(megathread)
                .discovered_at(discovered_at)
        })
        .collect()
}

/// Classifies a subreddit's rule list. The summary lists the rule names.
pub fn rules_from_response(response: &RedditRulesResponse) -> SubredditRules {
    let blob = response
        .rules
        .iter()
        .map(|rule| format!("{} {}", rule.short_name, rule.description))
        .collect::<Vec<_>>()
        .join(" ");

    let mut rules = classify_rules(&blob);
    let names: Vec<&str> = response
        .rules
        .iter()
        .map(|rule| rule.short_name.trim())
        .filter(|name| !name.is_empty())
        .collect();
    if !names.is_empty() {
        rules.summary = Some(names.join("; "));
    }
    rules
}

#[derive(Debug, Clone)]
pub struct RedditApiClient {
    http_client: Client,
    user_agent: String,
    access_token: String,
}

impl RedditApiClient {
    pub fn new(
        user_agent: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, RedditApiError> {
        let user_agent = user_agent.into();
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RedditApiError::Network {
                details: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            user_agent,
            access_token: access_token.into(),
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", REDDIT_API_BASE, endpoint))
            .bearer_auth(&self.access_token)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        endpoint: &str,
        target: ApiTarget<'_>,
    ) -> Result<Response, RedditApiError> {
        debug!("Making Reddit API request: {}", endpoint);

        let response = request.send().await.map_err(|e| {
            error!("Network error for {}: {}", endpoint, e);
            if e.is_timeout() {
                RedditApiError::RequestTimeout
            } else {
                RedditApiError::Network {
                    details: e.to_string(),
                }
            }
        })?;

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok());
        if let Some(err) = status_error(response.status(), retry_after, target) {
            warn!(
                "Request failed with status: {} for {}",
                response.status(),
                endpoint
            );
            return Err(err);
        }

        Ok(response)
    }

    async fn read_body(response: Response, what: &str) -> Result<String, RedditApiError> {
        response
            .text()
            .await
            .map_err(|e| RedditApiError::InvalidResponse {
                details: format!("Failed to read {}: {}", what, e),
            })
    }

    fn parse_json<T: serde::de::DeserializeOwned>(
        body: &str,
        what: &str,
    ) -> Result<T, RedditApiError> {
        serde_json::from_str(body).map_err(|e| {
            error!("Failed to parse {}: {}", what, e);
            RedditApiError::InvalidResponse {
                details: format!("Failed to parse {}", what),
            }
        })
    }

    /// Replies to thread `thread_id` with `text`.
    pub async fn submit_comment(
        &self,
        subreddit: &str,
        thread_id: &str,
        text: &str,
    ) -> Result<PostReceipt, RedditApiError> {
        let endpoint = "/api/comment";
        let thing_id = format!("t3_{}", thread_id);
        let request = self.request(Method::POST, endpoint).form(&[
            ("api_type", "json"),
            ("thing_id", thing_id.as_str()),
            ("text", text),
        ]);

        let response = self
            .send(
                request,
                endpoint,
                ApiTarget::Thread {
                    subreddit,
                    thread_id,
                },
            )
            .await?;
        let body = Self::read_body(response, "comment response").await?;
        let receipt = parse_comment_response(&body, subreddit, thread_id)?;

        info!(
            "Posted comment {:?} in r/{} on {}",
            receipt.comment_id, subreddit, thread_id
        );
        Ok(receipt)
    }

    pub async fn fetch_rules(&self, subreddit: &str) -> Result<SubredditRules, RedditApiError> {
        let endpoint = format!("/r/{}/about/rules", subreddit);
        let request = self.request(Method::GET, &endpoint);

        let response = self
            .send(request, &endpoint, ApiTarget::Subreddit(subreddit))
            .await?;
        let body = Self::read_body(response, "subreddit rules").await?;
        let parsed: RedditRulesResponse = Self::parse_json(&body, "subreddit rules")?;

        let rules = rules_from_response(&parsed);
        debug!(
            "Retrieved {} rules for r/{} (promotional_allowed: {}, megathread_required: {})",
            parsed.rules.len(),
            subreddit,
            rules.promotional_allowed,
            rules.megathread_required
        );
        Ok(rules)
    }

    /// Newest threads in `subreddit` matching `query`, posted within the
    /// last `days_back` days and passing the title keyword filter.
    pub async fn search_threads(
        &self,
        subreddit: &str,
        query: &str,
        limit: u32,
        days_back: u32,
    ) -> Result<Vec<Candidate>, RedditApiError> {
        let endpoint = format!("/r/{}/search", subreddit);
        let limit_str = limit.to_string();
        let request = self.request(Method::GET, &endpoint).query(&[
            ("q", query),
            ("restrict_sr", "on"),
            ("sort", "new"),
            ("t", "year"),
            ("limit", limit_str.as_str()),
        ]);

        let response = self
            .send(request, &endpoint, ApiTarget::Subreddit(subreddit))
            .await?;
        let body = Self::read_body(response, "search results").await?;
        let listing: RedditListing<RedditPostData> =
            Self::parse_json(&body, &format!("search results for r/{}", subreddit))?;

        let now = Utc::now();
        let cutoff = search_cutoff(now, days_back);
        let hits = listing.data.children.len();
        let candidates = candidates_from_listing(listing, subreddit, cutoff, now);

        info!(
            "Search in r/{} returned {} threads, {} candidates",
            subreddit,
            hits,
            candidates.len()
        );
        Ok(candidates)
    }

    /// Display names of subreddits matching `query`.
    pub async fn search_subreddits(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<String>, RedditApiError> {
        let endpoint = "/subreddits/search";
        let limit_str = limit.to_string();
        let request = self
            .request(Method::GET, endpoint)
            .query(&[("q", query), ("limit", limit_str.as_str())]);

        let response = self
            .send(request, endpoint, ApiTarget::Endpoint(endpoint))
            .await?;
        let body = Self::read_body(response, "subreddit search").await?;
        let listing: RedditListing<RedditSubredditData> =
            Self::parse_json(&body, "subreddit search")?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.display_name)
            .collect())
    }
}

#[async_trait]
impl Poster for RedditApiClient {
    async fn submit(
        &self,
        subreddit: &str,
        thread_id: &str,
        text: &str,
    ) -> Result<PostReceipt, RedditApiError> {
        self.submit_comment(subreddit, thread_id, text).await
    }
}
