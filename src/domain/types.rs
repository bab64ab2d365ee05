//! Closed vocabularies for policies and claims.
//!
//! Every status and kind field in the document schema draws from one of
//! these enums. The snake_case token produced by `as_str` is the single
//! canonical wire form: serde uses it, request payloads are parsed
//! against it, and validation messages enumerate it.

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Auto,
    Home,
    Life,
    Health,
    Commerce,
}

impl PolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Auto => "auto",
            PolicyKind::Home => "home",
            PolicyKind::Life => "life",
            PolicyKind::Health => "health",
            PolicyKind::Commerce => "commerce",
        }
    }
}

impl TryFrom<&str> for PolicyKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "auto" => Ok(PolicyKind::Auto),
            "home" => Ok(PolicyKind::Home),
            "life" => Ok(PolicyKind::Life),
            "health" => Ok(PolicyKind::Health),
            "commerce" => Ok(PolicyKind::Commerce),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Active,
    Suspended,
    Expired,
    Cancelled,
}

impl PolicyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyStatus::Active => "active",
            PolicyStatus::Suspended => "suspended",
            PolicyStatus::Expired => "expired",
            PolicyStatus::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<&str> for PolicyStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(PolicyStatus::Active),
            "suspended" => Ok(PolicyStatus::Suspended),
            "expired" => Ok(PolicyStatus::Expired),
            "cancelled" => Ok(PolicyStatus::Cancelled),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Accident,
    Theft,
    Fire,
    Damage,
    Hail,
    Other,
}

impl ClaimKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimKind::Accident => "accident",
            ClaimKind::Theft => "theft",
            ClaimKind::Fire => "fire",
            ClaimKind::Damage => "damage",
            ClaimKind::Hail => "hail",
            ClaimKind::Other => "other",
        }
    }
}

impl TryFrom<&str> for ClaimKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "accident" => Ok(ClaimKind::Accident),
            "theft" => Ok(ClaimKind::Theft),
            "fire" => Ok(ClaimKind::Fire),
            "damage" => Ok(ClaimKind::Damage),
            "hail" => Ok(ClaimKind::Hail),
            "other" => Ok(ClaimKind::Other),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Open,
    InProgress,
    Closed,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Open => "open",
            ClaimStatus::InProgress => "in_progress",
            ClaimStatus::Closed => "closed",
            ClaimStatus::Rejected => "rejected",
        }
    }
}

impl TryFrom<&str> for ClaimStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "open" => Ok(ClaimStatus::Open),
            "in_progress" => Ok(ClaimStatus::InProgress),
            "closed" => Ok(ClaimStatus::Closed),
            "rejected" => Ok(ClaimStatus::Rejected),
            _ => Err(()),
        }
    }
}

pub fn parse_policy_kind(raw: &str) -> Result<PolicyKind, DomainError> {
    PolicyKind::try_from(raw).map_err(|()| {
        DomainError::validation(
            "invalid policy kind, must be one of: auto, home, life, health, commerce",
        )
    })
}

pub fn parse_policy_status(raw: &str) -> Result<PolicyStatus, DomainError> {
    PolicyStatus::try_from(raw).map_err(|()| {
        DomainError::validation(
            "invalid policy status, must be one of: active, suspended, expired, cancelled",
        )
    })
}

pub fn parse_claim_kind(raw: &str) -> Result<ClaimKind, DomainError> {
    ClaimKind::try_from(raw).map_err(|()| {
        DomainError::validation(
            "invalid claim kind, must be one of: accident, theft, fire, damage, hail, other",
        )
    })
}

pub fn parse_claim_status(raw: &str) -> Result<ClaimStatus, DomainError> {
    ClaimStatus::try_from(raw).map_err(|()| {
        DomainError::validation(
            "invalid claim status, must be one of: open, in_progress, closed, rejected",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_round_trips_through_tokens() {
        for kind in [
            PolicyKind::Auto,
            PolicyKind::Home,
            PolicyKind::Life,
            PolicyKind::Health,
            PolicyKind::Commerce,
        ] {
            assert_eq!(PolicyKind::try_from(kind.as_str()), Ok(kind));
        }
        for status in [
            ClaimStatus::Open,
            ClaimStatus::InProgress,
            ClaimStatus::Closed,
            ClaimStatus::Rejected,
        ] {
            assert_eq!(ClaimStatus::try_from(status.as_str()), Ok(status));
        }
    }

    #[test]
    fn serde_tokens_match_as_str() {
        let encoded = serde_json::to_string(&ClaimStatus::InProgress).unwrap();
        assert_eq!(encoded, "\"in_progress\"");
        let decoded: PolicyStatus = serde_json::from_str("\"suspended\"").unwrap();
        assert_eq!(decoded, PolicyStatus::Suspended);
    }

    #[test]
    fn parse_rejects_unknown_tokens() {
        let err = parse_policy_kind("boat").unwrap_err();
        assert!(err.to_string().contains("must be one of"));
        assert!(parse_claim_status("Pending").is_err());
    }
}
