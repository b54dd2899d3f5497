//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The rule/policy/policy-set evaluator and its decision algebra.

pub mod pep_action;
pub mod policy;
pub mod policyset;
pub mod rule;
pub mod target;

use crate::errors::{Indeterminate, Status};
use crate::refs::Version;
use pep_action::{Advice, Obligation};
use rule::Effect;
use std::fmt;

/// The four decisions a result can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permit,
    Deny,
    NotApplicable,
    Indeterminate,
}

impl fmt::Display for Decision {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Decision::Permit => write!(f, "Permit"),
            Decision::Deny => write!(f, "Deny"),
            Decision::NotApplicable => write!(f, "NotApplicable"),
            Decision::Indeterminate => write!(f, "Indeterminate"),
        }
    }
}

/// The effect a failing element would have produced (the extended
/// Indeterminate of XACML section 7.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedEffect {
    Permit,
    Deny,
    Both,
}

impl From<Effect> for ExtendedEffect {
    fn from(e: Effect) -> ExtendedEffect {
        match e {
            Effect::Permit => ExtendedEffect::Permit,
            Effect::Deny => ExtendedEffect::Deny,
        }
    }
}

impl fmt::Display for ExtendedEffect {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExtendedEffect::Permit => write!(f, "{{P}}"),
            ExtendedEffect::Deny => write!(f, "{{D}}"),
            ExtendedEffect::Both => write!(f, "{{DP}}"),
        }
    }
}

/// Identifies a policy or policy set that contributed to a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyIdentifier {
    pub id: String,
    pub version: Version,
    pub is_policy_set: bool,
}

impl fmt::Display for PolicyIdentifier {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} v{}", self.id, self.version)
    }
}

/// The outcome of evaluating a rule, policy or policy set.
///
/// Obligations and advice are only ever present on `Permit` and
/// `Deny`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    pub decision: Decision,
    /// Present exactly when the decision is `Indeterminate`.
    pub extended: Option<ExtendedEffect>,
    pub status: Status,
    pub obligations: Vec<Obligation>,
    pub advice: Vec<Advice>,
    /// Policies that were applicable, outermost first.
    pub applicable_policies: Vec<PolicyIdentifier>,
}

impl PolicyDecision {
    #[must_use]
    pub fn not_applicable() -> PolicyDecision {
        PolicyDecision {
            decision: Decision::NotApplicable,
            extended: None,
            status: Status::ok(),
            obligations: vec![],
            advice: vec![],
            applicable_policies: vec![],
        }
    }

    /// A bare Permit or Deny with no PEP actions yet.
    #[must_use]
    pub fn effect(effect: Effect) -> PolicyDecision {
        PolicyDecision {
            decision: match effect {
                Effect::Permit => Decision::Permit,
                Effect::Deny => Decision::Deny,
            },
            extended: None,
            status: Status::ok(),
            obligations: vec![],
            advice: vec![],
            applicable_policies: vec![],
        }
    }

    /// An Indeterminate carrying the failure status and the extended
    /// effect.  Never carries obligations or advice.
    #[must_use]
    pub fn indeterminate(error: Indeterminate, extended: ExtendedEffect) -> PolicyDecision {
        PolicyDecision {
            decision: Decision::Indeterminate,
            extended: Some(extended),
            status: error.status,
            obligations: vec![],
            advice: vec![],
            applicable_policies: vec![],
        }
    }
}

impl fmt::Display for PolicyDecision {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.decision)?;
        if let Some(e) = self.extended {
            write!(f, "{e}")?;
        }
        Ok(())
    }
}
