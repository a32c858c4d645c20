//! Agreement lifecycle and template tests
//!
//! Property-based and unit tests for:
//! - Property: signed agreements can never be signed again
//! - Property: terminated agreements accept no further action
//! - Property: rendered templates contain no placeholder markers

use std::collections::HashMap;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use shared::template::{escape_html, placeholders, render, validate_template, KNOWN_PLACEHOLDERS};
use shared::{
    format_agreement_number, signing_link_valid, transition, AgreementAction, AgreementStatus,
    TransitionError,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

fn status_strategy() -> impl Strategy<Value = AgreementStatus> {
    prop::sample::select(AgreementStatus::ALL.to_vec())
}

fn action_strategy() -> impl Strategy<Value = AgreementAction> {
    prop_oneof![
        Just(AgreementAction::Edit),
        Just(AgreementAction::Delete),
        Just(AgreementAction::SendForSignature),
        Just(AgreementAction::Sign),
        Just(AgreementAction::Terminate),
    ]
}

/// Template text built from plain words and known placeholders
fn template_strategy() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        "[A-Za-z ,.]{0,20}",
        prop::sample::select(KNOWN_PLACEHOLDERS.to_vec()).prop_map(|p| format!("{{{{ {} }}}}", p)),
    ];
    prop::collection::vec(piece, 0..12).prop_map(|pieces| pieces.concat())
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    /// Property: a terminated agreement rejects every action
    #[test]
    fn test_terminated_is_final(action in action_strategy()) {
        prop_assert_eq!(
            transition(AgreementStatus::Terminated, action),
            Err(TransitionError::Terminated)
        );
    }

    /// Property: only a pending agreement can become signed
    #[test]
    fn test_only_pending_can_be_signed(status in status_strategy()) {
        let result = transition(status, AgreementAction::Sign);
        if status == AgreementStatus::PendingSignature {
            prop_assert_eq!(result, Ok(AgreementStatus::Signed));
        } else {
            prop_assert!(result.is_err());
        }
    }

    /// Property: content changes are limited to drafts
    #[test]
    fn test_edit_only_in_draft(status in status_strategy()) {
        let editable = transition(status, AgreementAction::Edit).is_ok();
        prop_assert_eq!(editable, status == AgreementStatus::Draft);
    }

    /// Property: every accepted transition lands in a known status
    #[test]
    fn test_transitions_stay_in_lifecycle(
        status in status_strategy(),
        actions in prop::collection::vec(action_strategy(), 0..10),
    ) {
        let mut current = status;
        let mut terminated = current == AgreementStatus::Terminated;
        for action in actions {
            if let Ok(next) = transition(current, action) {
                prop_assert!(!terminated, "left the terminated state");
                current = next;
                terminated = current == AgreementStatus::Terminated;
            }
        }
        prop_assert!(AgreementStatus::ALL.contains(&current));
    }

    /// Property: rendering fills every placeholder
    #[test]
    fn test_render_fills_placeholders(body in template_strategy()) {
        prop_assert!(validate_template(&body).is_ok());

        let values: HashMap<&str, String> = KNOWN_PLACEHOLDERS
            .iter()
            .map(|p| (*p, format!("<{}>", p)))
            .collect();
        let rendered = render(&body, &values).unwrap();
        prop_assert!(!rendered.contains("{{"));
        for name in placeholders(&body).unwrap() {
            let expected = format!("<{}>", name);
            prop_assert!(rendered.contains(&expected));
        }
    }

    /// Property: escaped text never contains markup characters
    #[test]
    fn test_escape_html_removes_markup(text in ".{0,64}") {
        let escaped = escape_html(&text);
        prop_assert!(!escaped.contains('<'));
        prop_assert!(!escaped.contains('>'));
        prop_assert!(!escaped.contains('"'));
    }

    /// Property: agreement numbers sort in sequence order within a year
    #[test]
    fn test_agreement_numbers_sort(a in 1i64..99_999, b in 1i64..99_999) {
        let (na, nb) = (format_agreement_number(2026, a), format_agreement_number(2026, b));
        prop_assert_eq!(a.cmp(&b), na.cmp(&nb));
    }
}

// ============================================================================
// Unit Tests: Signing Links
// ============================================================================

#[cfg(test)]
mod signing_link_tests {
    use super::*;

    #[test]
    fn test_link_expires_at_deadline() {
        let issued = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let expires = issued + Duration::hours(168);

        assert!(signing_link_valid(Some(expires), issued));
        assert!(signing_link_valid(Some(expires), expires - Duration::seconds(1)));
        assert!(!signing_link_valid(Some(expires), expires));
        assert!(!signing_link_valid(None, issued));
    }

    #[test]
    fn test_resend_keeps_pending() {
        assert_eq!(
            transition(AgreementStatus::PendingSignature, AgreementAction::SendForSignature),
            Ok(AgreementStatus::PendingSignature)
        );
        assert_eq!(
            transition(AgreementStatus::Signed, AgreementAction::Sign),
            Err(TransitionError::AlreadySigned)
        );
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        assert!(validate_template("Hello {{ driver_name }}").is_ok());
        assert!(validate_template("Hello {{ driver_pin }}").is_err());
        assert!(validate_template("Hello {{ driver_name").is_err());
    }
}
