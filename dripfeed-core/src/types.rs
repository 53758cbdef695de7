use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Concise,
    #[default]
    Friendly,
    Helpful,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmojiLevel {
    None,
    #[default]
    Low,
    Normal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadFlags {
    #[serde(default)]
    pub is_megathread: bool,
    #[serde(default)]
    pub rules_summary: Option<String>,
}

/// A thread under consideration for posting. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub subreddit: String,
    pub thread_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, flatten)]
    pub flags: ThreadFlags,
    #[serde(default = "Utc::now")]
    pub discovered_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(subreddit: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            subreddit: subreddit.into(),
            thread_id: thread_id.into(),
            title: String::new(),
            flags: ThreadFlags::default(),
            discovered_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn megathread(mut self, is_megathread: bool) -> Self {
        self.flags.is_megathread = is_megathread;
        self
    }

    pub fn discovered_at(mut self, at: DateTime<Utc>) -> Self {
        self.discovered_at = at;
        self
    }
}

/// Rule metadata for one subreddit, as reported by a rule oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubredditRules {
    #[serde(default = "default_true")]
    pub promotional_allowed: bool,
    #[serde(default)]
    pub megathread_required: bool,
    #[serde(default)]
    pub summary: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for SubredditRules {
    fn default() -> Self {
        Self {
            promotional_allowed: true,
            megathread_required: false,
            summary: None,
        }
    }
}

impl SubredditRules {
    pub fn forbidding_promotion() -> Self {
        Self {
            promotional_allowed: false,
            ..Self::default()
        }
    }

    pub fn megathread_only() -> Self {
        Self {
            megathread_required: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyPosted,
    RuleViolation,
    NotMegathread,
    SubredditCapReached,
    TotalCapReached,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyPosted => "already_posted",
            SkipReason::RuleViolation => "rule_violation",
            SkipReason::NotMegathread => "not_megathread",
            SkipReason::SubredditCapReached => "subreddit_cap_reached",
            SkipReason::TotalCapReached => "total_cap_reached",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Skipped { reason: SkipReason },
    Queued,
    Posted,
    Failed { code: String, message: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Skipped { .. } => "skipped",
            Outcome::Queued => "queued",
            Outcome::Posted => "posted",
            Outcome::Failed { .. } => "failed",
        }
    }

    /// Queued (dry-run) and posted records both count as a made post.
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Outcome::Queued | Outcome::Posted)
    }
}

/// One audit entry. Append-only; never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub timestamp: DateTime<Utc>,
    pub subreddit: String,
    pub thread_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub text: Option<String>,
    pub dry_run: bool,
}

impl ActionRecord {
    pub fn skipped(
        timestamp: DateTime<Utc>,
        candidate: &Candidate,
        reason: SkipReason,
        dry_run: bool,
    ) -> Self {
        Self {
            timestamp,
            subreddit: candidate.subreddit.clone(),
            thread_id: candidate.thread_id.clone(),
            outcome: Outcome::Skipped { reason },
            text: None,
            dry_run,
        }
    }

    pub fn dispatched(
        timestamp: DateTime<Utc>,
        candidate: &Candidate,
        outcome: Outcome,
        text: String,
        dry_run: bool,
    ) -> Self {
        Self {
            timestamp,
            subreddit: candidate.subreddit.clone(),
            thread_id: candidate.thread_id.clone(),
            outcome,
            text: Some(text),
            dry_run,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match &self.outcome {
            Outcome::Skipped { reason } => Some(*reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed { reason: String },
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Completed | LifecycleState::Stopped | LifecycleState::Failed { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Running => "running",
            LifecycleState::Completed => "completed",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Failed { reason } => write!(f, "failed: {}", reason),
            other => f.write_str(other.name()),
        }
    }
}
