//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The semantic shape of a decision response and the result filters.

use crate::errors::{Status, StatusCode};
use crate::policy::pep_action::{Advice, Obligation};
use crate::policy::{Decision, PolicyIdentifier};
use crate::request::RequestAttribute;
use std::fmt;

/// Attributes echoed back because the request flagged them with
/// `IncludeInResult`.
#[derive(Debug, Clone, PartialEq)]
pub struct EchoedCategory {
    pub category: String,
    pub attributes: Vec<RequestAttribute>,
}

/// One result of a decision response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultItem {
    pub decision: Decision,
    pub status: Status,
    pub obligations: Vec<Obligation>,
    pub advice: Vec<Advice>,
    pub attributes: Vec<EchoedCategory>,
    /// Present when the request asked for the policy identifier list.
    pub policy_ids: Option<Vec<PolicyIdentifier>>,
}

impl ResultItem {
    /// A bare indeterminate result, used for request-level failures.
    #[must_use]
    pub fn indeterminate(status: Status) -> ResultItem {
        ResultItem {
            decision: Decision::Indeterminate,
            status,
            obligations: vec![],
            advice: vec![],
            attributes: vec![],
            policy_ids: None,
        }
    }
}

impl fmt::Display for ResultItem {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.decision, self.status.code)
    }
}

/// A decision response: one result per individual decision request,
/// or a single combined result.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub results: Vec<ResultItem>,
}

impl Response {
    #[must_use]
    pub fn single(result: ResultItem) -> Response {
        Response {
            results: vec![result],
        }
    }
}

/// Post-evaluation result filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultFilterId {
    /// Pass results through unchanged.
    #[default]
    Default,
    /// Multiple Decision Profile combined decision: collapse agreeing
    /// results into one.
    CombinedDecision,
}

/// Apply the configured result filter.
///
/// Combining requires every individual decision to agree and carry no
/// obligations or advice; a combined result echoes no attributes.
pub(crate) fn apply_result_filter(
    filter: ResultFilterId,
    combined_requested: bool,
    results: Vec<ResultItem>,
) -> Vec<ResultItem> {
    if filter != ResultFilterId::CombinedDecision || !combined_requested {
        return results;
    }
    let Some(first) = results.first() else {
        return results;
    };
    let agreeing = results.iter().all(|r| r.decision == first.decision);
    let clean = results
        .iter()
        .all(|r| r.obligations.is_empty() && r.advice.is_empty());
    if agreeing && clean {
        vec![ResultItem {
            decision: first.decision,
            status: Status::ok(),
            obligations: vec![],
            advice: vec![],
            attributes: vec![],
            policy_ids: None,
        }]
    } else {
        let reason = if agreeing {
            "combined decision with obligations or advice"
        } else {
            "individual decisions disagree"
        };
        vec![ResultItem::indeterminate(Status {
            code: StatusCode::ProcessingError,
            message: Some(reason.to_string()),
            missing: vec![],
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permit() -> ResultItem {
        ResultItem {
            decision: Decision::Permit,
            status: Status::ok(),
            obligations: vec![],
            advice: vec![],
            attributes: vec![],
            policy_ids: None,
        }
    }

    #[test]
    fn test_combined_decision_agreeing() {
        let out = apply_result_filter(
            ResultFilterId::CombinedDecision,
            true,
            vec![permit(), permit()],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].decision, Decision::Permit);
    }

    #[test]
    fn test_combined_decision_disagreeing() {
        let mut deny = permit();
        deny.decision = Decision::Deny;
        let out = apply_result_filter(
            ResultFilterId::CombinedDecision,
            true,
            vec![permit(), deny],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].decision, Decision::Indeterminate);
        assert_eq!(out[0].status.code, StatusCode::ProcessingError);
    }

    #[test]
    fn test_combined_decision_with_obligations_fails() {
        let mut with_obl = permit();
        with_obl.obligations.push(Obligation {
            id: "urn:example:obligation".to_string(),
            assignments: vec![],
        });
        let out = apply_result_filter(
            ResultFilterId::CombinedDecision,
            true,
            vec![with_obl, permit()],
        );
        assert_eq!(out[0].decision, Decision::Indeterminate);
    }

    #[test]
    fn test_not_requested_passes_through() {
        let out = apply_result_filter(
            ResultFilterId::CombinedDecision,
            false,
            vec![permit(), permit()],
        );
        assert_eq!(out.len(), 2);
    }
}
