//! Rental agreement models and the e-signature lifecycle
//!
//! ```text
//! draft --send--> pending_signature --sign--> signed
//!   |                   |                       |
//!   +-------------------+-----terminate---------+--> terminated
//! ```
//!
//! A pending agreement may be re-sent, which rotates its signing token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of an agreement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    #[default]
    Draft,
    PendingSignature,
    Signed,
    Terminated,
}

impl AgreementStatus {
    pub const ALL: [AgreementStatus; 4] = [
        AgreementStatus::Draft,
        AgreementStatus::PendingSignature,
        AgreementStatus::Signed,
        AgreementStatus::Terminated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementStatus::Draft => "draft",
            AgreementStatus::PendingSignature => "pending_signature",
            AgreementStatus::Signed => "signed",
            AgreementStatus::Terminated => "terminated",
        }
    }

    /// Pending and signed agreements tie up the driver and vehicle
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AgreementStatus::PendingSignature | AgreementStatus::Signed
        )
    }
}

impl FromStr for AgreementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown agreement status: {}", s))
    }
}

/// Operations that move an agreement through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgreementAction {
    Edit,
    Delete,
    SendForSignature,
    Sign,
    Terminate,
}

impl AgreementAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementAction::Edit => "edit",
            AgreementAction::Delete => "delete",
            AgreementAction::SendForSignature => "send for signature",
            AgreementAction::Sign => "sign",
            AgreementAction::Terminate => "terminate",
        }
    }
}

/// Rejected lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("agreement has already been signed")]
    AlreadySigned,

    #[error("agreement has been terminated")]
    Terminated,

    #[error("cannot {action} an agreement in status {status}")]
    NotAllowed {
        action: &'static str,
        status: &'static str,
    },
}

/// Apply `action` to an agreement in `status`, returning the new status.
/// `Edit` and `Delete` leave the status unchanged when allowed.
pub fn transition(
    status: AgreementStatus,
    action: AgreementAction,
) -> Result<AgreementStatus, TransitionError> {
    use AgreementAction as A;
    use AgreementStatus as S;

    match (status, action) {
        (S::Terminated, _) => Err(TransitionError::Terminated),
        (S::Signed, A::Sign) => Err(TransitionError::AlreadySigned),
        (S::Draft, A::Edit) | (S::Draft, A::Delete) => Ok(S::Draft),
        (S::Draft, A::SendForSignature) | (S::PendingSignature, A::SendForSignature) => {
            Ok(S::PendingSignature)
        }
        (S::PendingSignature, A::Sign) => Ok(S::Signed),
        (_, A::Terminate) => Ok(S::Terminated),
        (status, action) => Err(TransitionError::NotAllowed {
            action: action.as_str(),
            status: status.as_str(),
        }),
    }
}

/// Format an agreement number, e.g. `AGR-2026-00042`
pub fn format_agreement_number(year: i32, sequence: i64) -> String {
    format!("AGR-{}-{:05}", year, sequence)
}

/// Whether a signing link issued with `expires_at` is still usable
pub fn signing_link_valid(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expires_at) => now < expires_at,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_happy_path() {
        let s = transition(AgreementStatus::Draft, AgreementAction::SendForSignature).unwrap();
        assert_eq!(s, AgreementStatus::PendingSignature);
        let s = transition(s, AgreementAction::Sign).unwrap();
        assert_eq!(s, AgreementStatus::Signed);
        let s = transition(s, AgreementAction::Terminate).unwrap();
        assert_eq!(s, AgreementStatus::Terminated);
    }

    #[test]
    fn test_cannot_resign() {
        assert_eq!(
            transition(AgreementStatus::Signed, AgreementAction::Sign),
            Err(TransitionError::AlreadySigned)
        );
    }

    #[test]
    fn test_cannot_sign_draft() {
        assert!(matches!(
            transition(AgreementStatus::Draft, AgreementAction::Sign),
            Err(TransitionError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_only_drafts_are_editable() {
        assert!(transition(AgreementStatus::Draft, AgreementAction::Edit).is_ok());
        assert!(transition(AgreementStatus::PendingSignature, AgreementAction::Edit).is_err());
        assert!(transition(AgreementStatus::Signed, AgreementAction::Delete).is_err());
    }

    #[test]
    fn test_terminated_is_final() {
        for action in [
            AgreementAction::Edit,
            AgreementAction::Delete,
            AgreementAction::SendForSignature,
            AgreementAction::Sign,
            AgreementAction::Terminate,
        ] {
            assert_eq!(
                transition(AgreementStatus::Terminated, action),
                Err(TransitionError::Terminated)
            );
        }
    }

    #[test]
    fn test_resend_keeps_pending() {
        assert_eq!(
            transition(
                AgreementStatus::PendingSignature,
                AgreementAction::SendForSignature
            ),
            Ok(AgreementStatus::PendingSignature)
        );
        assert!(transition(AgreementStatus::Signed, AgreementAction::SendForSignature).is_err());
    }

    #[test]
    fn test_agreement_number_format() {
        assert_eq!(format_agreement_number(2026, 42), "AGR-2026-00042");
        assert_eq!(format_agreement_number(2026, 123456), "AGR-2026-123456");
    }

    #[test]
    fn test_signing_link_validity() {
        let now = Utc::now();
        assert!(signing_link_valid(Some(now + Duration::hours(1)), now));
        assert!(!signing_link_valid(Some(now), now));
        assert!(!signing_link_valid(None, now));
    }
}
