//! Contribution events and the builder registry row.
//!
//! A [`ContributionEvent`] is an immutable fact produced by the external
//! GitHub-activity classifier: one row per qualifying action. The engine
//! consumes these events and never produces or mutates them. Everything
//! downstream (gem receipts, points receipts) is a replayable projection
//! over this event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{BuilderId, ClaimId, Season, WalletAddress, Week};

/// Kind of qualifying contribution, as classified upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    /// A qualifying code commit.
    Commit,
    /// A merged pull request.
    MergedPullRequest,
    /// Streak bonus for consecutive merged pull requests.
    PullRequestStreakBonus,
    /// Daily login/claim action.
    DailyClaim,
    /// Streak bonus for consecutive daily claims.
    DailyClaimStreakBonus,
    /// Manual or miscellaneous gem adjustment.
    Adjustment,
}

impl ContributionKind {
    /// Returns the kind as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::MergedPullRequest => "merged_pull_request",
            Self::PullRequestStreakBonus => "pull_request_streak_bonus",
            Self::DailyClaim => "daily_claim",
            Self::DailyClaimStreakBonus => "daily_claim_streak_bonus",
            Self::Adjustment => "adjustment",
        }
    }
}

impl std::str::FromStr for ContributionKind {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(Self::Commit),
            "merged_pull_request" => Ok(Self::MergedPullRequest),
            "pull_request_streak_bonus" => Ok(Self::PullRequestStreakBonus),
            "daily_claim" => Ok(Self::DailyClaim),
            "daily_claim_streak_bonus" => Ok(Self::DailyClaimStreakBonus),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(crate::error::EngineError::InvalidRequest(format!(
                "unknown contribution kind: {other}"
            ))),
        }
    }
}

/// Immutable contribution fact: one row per qualifying action.
///
/// Deduplicated by `id`; re-ingesting an event with a known id is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionEvent {
    /// Classifier-assigned event id (the ingest idempotency key).
    pub id: Uuid,
    /// Builder who earned the gems.
    pub builder_id: BuilderId,
    /// What kind of action this was.
    pub kind: ContributionKind,
    /// Week the action counts toward.
    pub week: Week,
    /// Season the action counts toward.
    pub season: Season,
    /// Gems awarded by the classifier for this action.
    pub gems_awarded: u64,
    /// Ingest timestamp.
    pub created_at: DateTime<Utc>,
}

/// Registry row for a builder account.
///
/// Registration is the precondition for every per-builder operation:
/// ingesting events, recomputing gems, and distributing points all fail
/// fast on an unknown builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderAccount {
    /// Builder identifier.
    pub id: BuilderId,
    /// Payout wallet of the builder.
    pub wallet: WalletAddress,
    /// Claim-token id backers hold against this builder.
    pub claim_id: ClaimId,
    /// Season the claim token belongs to.
    pub season: Season,
    /// Contact address for terminal-failure notifications.
    pub email: String,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ContributionKind::MergedPullRequest).ok();
        assert_eq!(json.as_deref(), Some("\"merged_pull_request\""));
        assert_eq!(
            ContributionKind::DailyClaimStreakBonus.as_str(),
            "daily_claim_streak_bonus"
        );
    }

    #[test]
    fn event_serde_round_trip() {
        let event = ContributionEvent {
            id: Uuid::new_v4(),
            builder_id: BuilderId::new(),
            kind: ContributionKind::Commit,
            week: Week::new(2026, 8),
            season: Season(3),
            gems_awarded: 10,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        let back: Option<ContributionEvent> = serde_json::from_str(&json).ok();
        let Some(back) = back else {
            panic!("deserialization failed");
        };
        assert_eq!(back.id, event.id);
        assert_eq!(back.week, event.week);
        assert_eq!(back.gems_awarded, 10);
    }
}
