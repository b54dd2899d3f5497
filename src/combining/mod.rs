//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Combining algorithms.
//!
//! Each algorithm folds an ordered list of children (rules inside a
//! policy, policies/sets/references inside a policy set) into one
//! decision, short-circuiting once the outcome is dominated.
//! Obligations and advice flow only from children whose decision
//! matches the combined effect; everything else is dropped.

use crate::context::EvaluationContext;
use crate::errors::{Indeterminate, PolicyError};
use crate::policy::policyset::PolicyChild;
use crate::policy::rule::Rule;
use crate::policy::target::MatchResult;
use crate::policy::{Decision, ExtendedEffect, PolicyDecision};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One combinable child, rule-level or policy-level.
#[derive(Debug, Clone, Copy)]
pub enum Child<'a> {
    Rule(&'a Rule),
    Node(&'a PolicyChild),
}

impl Child<'_> {
    fn evaluate(&self, ctx: &mut EvaluationContext) -> PolicyDecision {
        match self {
            Child::Rule(r) => r.evaluate(ctx),
            Child::Node(n) => n.evaluate(ctx),
        }
    }

    fn applicable(&self, ctx: &mut EvaluationContext) -> MatchResult {
        match self {
            Child::Rule(r) => r.applicable(ctx),
            Child::Node(n) => n.applicable(ctx),
        }
    }
}

/// The behavior family behind a combining algorithm URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgKind {
    DenyOverrides,
    PermitOverrides,
    FirstApplicable,
    OnlyOneApplicable,
    DenyUnlessPermit,
    PermitUnlessDeny,
    OnPermitApplySecond,
}

/// A combining algorithm: URI plus behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombiningAlgorithm {
    pub uri: String,
    pub kind: AlgKind,
}

impl fmt::Display for CombiningAlgorithm {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

impl CombiningAlgorithm {
    /// Combine the children's outcomes into one decision.
    pub fn combine(&self, ctx: &mut EvaluationContext, children: &[Child]) -> PolicyDecision {
        match self.kind {
            AlgKind::DenyOverrides => overrides(ctx, children, Decision::Deny),
            AlgKind::PermitOverrides => overrides(ctx, children, Decision::Permit),
            AlgKind::FirstApplicable => first_applicable(ctx, children),
            AlgKind::OnlyOneApplicable => only_one_applicable(ctx, children),
            AlgKind::DenyUnlessPermit => unless(ctx, children, Decision::Permit),
            AlgKind::PermitUnlessDeny => unless(ctx, children, Decision::Deny),
            AlgKind::OnPermitApplySecond => on_permit_apply_second(ctx, children),
        }
    }
}

/// deny-overrides / permit-overrides (XACML section C.2/C.3): the
/// dominant decision short-circuits; the opposite decisions are
/// collected; extended indeterminates combine per the standard table.
fn overrides(
    ctx: &mut EvaluationContext,
    children: &[Child],
    dominant: Decision,
) -> PolicyDecision {
    let dominant_extended = match dominant {
        Decision::Deny => ExtendedEffect::Deny,
        _ => ExtendedEffect::Permit,
    };
    let mut err_dominant = false;
    let mut err_other = false;
    let mut err_both = false;
    let mut first_error: Option<Indeterminate> = None;
    let mut saw_other = false;
    let mut other_obligations = vec![];
    let mut other_advice = vec![];
    let mut applicable = vec![];

    for child in children {
        let d = child.evaluate(ctx);
        if d.decision == dominant {
            // dominated: no sibling can change the outcome
            debug!("combining short-circuit on {dominant}");
            let mut out = d;
            let mut all = applicable;
            all.extend(std::mem::take(&mut out.applicable_policies));
            out.applicable_policies = all;
            return out;
        }
        applicable.extend(d.applicable_policies.clone());
        match d.decision {
            Decision::Permit | Decision::Deny => {
                saw_other = true;
                other_obligations.extend(d.obligations);
                other_advice.extend(d.advice);
            }
            Decision::NotApplicable => {}
            Decision::Indeterminate => {
                if first_error.is_none() {
                    first_error = Some(Indeterminate {
                        status: d.status.clone(),
                    });
                }
                match d.extended {
                    Some(e) if e == dominant_extended => err_dominant = true,
                    Some(ExtendedEffect::Both) | None => err_both = true,
                    Some(_) => err_other = true,
                }
            }
        }
    }

    let error = || {
        first_error
            .clone()
            .unwrap_or_else(|| Indeterminate::processing("combining error"))
    };
    let mut out = if err_both || (err_dominant && (err_other || saw_other)) {
        PolicyDecision::indeterminate(error(), ExtendedEffect::Both)
    } else if err_dominant {
        PolicyDecision::indeterminate(error(), dominant_extended)
    } else if saw_other {
        let mut d = PolicyDecision::effect(match dominant {
            Decision::Deny => crate::policy::rule::Effect::Permit,
            _ => crate::policy::rule::Effect::Deny,
        });
        d.obligations = other_obligations;
        d.advice = other_advice;
        d
    } else if err_other {
        let other_extended = match dominant_extended {
            ExtendedEffect::Deny => ExtendedEffect::Permit,
            _ => ExtendedEffect::Deny,
        };
        PolicyDecision::indeterminate(error(), other_extended)
    } else {
        PolicyDecision::not_applicable()
    };
    out.applicable_policies = applicable;
    out
}

/// first-applicable (XACML section C.8): document order, first
/// decisive child wins; an indeterminate child stops the scan.
fn first_applicable(ctx: &mut EvaluationContext, children: &[Child]) -> PolicyDecision {
    let mut applicable = vec![];
    for child in children {
        let mut d = child.evaluate(ctx);
        match d.decision {
            Decision::NotApplicable => {
                applicable.extend(d.applicable_policies);
            }
            _ => {
                let mut all = applicable;
                all.extend(std::mem::take(&mut d.applicable_policies));
                d.applicable_policies = all;
                return d;
            }
        }
    }
    PolicyDecision::not_applicable()
}

/// only-one-applicable (XACML section C.9): target applicability is
/// probed first; more than one applicable child is an error.
fn only_one_applicable(ctx: &mut EvaluationContext, children: &[Child]) -> PolicyDecision {
    let mut selected: Option<&Child> = None;
    for child in children {
        match child.applicable(ctx) {
            MatchResult::Indeterminate(e) => {
                return PolicyDecision::indeterminate(e, ExtendedEffect::Both);
            }
            MatchResult::Match => {
                if selected.is_some() {
                    return PolicyDecision::indeterminate(
                        Indeterminate::processing(
                            "more than one applicable child under only-one-applicable",
                        ),
                        ExtendedEffect::Both,
                    );
                }
                selected = Some(child);
            }
            MatchResult::NoMatch => {}
        }
    }
    match selected {
        Some(child) => child.evaluate(ctx),
        None => PolicyDecision::not_applicable(),
    }
}

/// deny-unless-permit / permit-unless-deny (XACML section C.6/C.7):
/// never indeterminate, never not-applicable.
fn unless(
    ctx: &mut EvaluationContext,
    children: &[Child],
    sought: Decision,
) -> PolicyDecision {
    let default_effect = match sought {
        Decision::Permit => crate::policy::rule::Effect::Deny,
        _ => crate::policy::rule::Effect::Permit,
    };
    let mut default_obligations = vec![];
    let mut default_advice = vec![];
    let mut applicable = vec![];
    for child in children {
        let mut d = child.evaluate(ctx);
        if d.decision == sought {
            let mut all = applicable;
            all.extend(std::mem::take(&mut d.applicable_policies));
            d.applicable_policies = all;
            return d;
        }
        applicable.extend(d.applicable_policies);
        // only the default effect's obligations can surface
        if decision_matches_effect(d.decision, default_effect) {
            default_obligations.extend(d.obligations);
            default_advice.extend(d.advice);
        }
    }
    let mut out = PolicyDecision::effect(default_effect);
    out.obligations = default_obligations;
    out.advice = default_advice;
    out.applicable_policies = applicable;
    out
}

fn decision_matches_effect(d: Decision, e: crate::policy::rule::Effect) -> bool {
    matches!(
        (d, e),
        (Decision::Permit, crate::policy::rule::Effect::Permit)
            | (Decision::Deny, crate::policy::rule::Effect::Deny)
    )
}

/// on-permit-apply-second: the first child gates; Permit runs the
/// second, Deny/NotApplicable the third (when present).
fn on_permit_apply_second(ctx: &mut EvaluationContext, children: &[Child]) -> PolicyDecision {
    if children.len() < 2 || children.len() > 3 {
        return PolicyDecision::indeterminate(
            Indeterminate::processing("on-permit-apply-second requires two or three children"),
            ExtendedEffect::Both,
        );
    }
    let gate = children[0].evaluate(ctx);
    let gate_applicable = gate.applicable_policies.clone();
    let mut out = match gate.decision {
        Decision::Permit => children[1].evaluate(ctx),
        Decision::Indeterminate => PolicyDecision::indeterminate(
            Indeterminate {
                status: gate.status,
            },
            ExtendedEffect::Both,
        ),
        Decision::Deny | Decision::NotApplicable => {
            if children.len() == 3 {
                children[2].evaluate(ctx)
            } else {
                PolicyDecision::not_applicable()
            }
        }
    };
    let mut all = gate_applicable;
    all.extend(std::mem::take(&mut out.applicable_policies));
    out.applicable_policies = all;
    out
}

fn alg_uri(version: &str, scope: &str, name: &str) -> String {
    format!("urn:oasis:names:tc:xacml:{version}:{scope}-combining-algorithm:{name}")
}

/// Lookup table of combining algorithms by URI.
#[derive(Debug, Default)]
pub struct CombiningRegistry {
    algorithms: HashMap<String, Arc<CombiningAlgorithm>>,
}

impl CombiningRegistry {
    #[must_use]
    pub fn new() -> CombiningRegistry {
        CombiningRegistry::default()
    }

    /// The standard rule- and policy-combining algorithms, ordered
    /// variants included.
    #[must_use]
    pub fn standard() -> CombiningRegistry {
        let mut r = CombiningRegistry::new();
        for scope in ["rule", "policy"] {
            for (name, kind) in [
                ("deny-overrides", AlgKind::DenyOverrides),
                ("ordered-deny-overrides", AlgKind::DenyOverrides),
                ("permit-overrides", AlgKind::PermitOverrides),
                ("ordered-permit-overrides", AlgKind::PermitOverrides),
                ("deny-unless-permit", AlgKind::DenyUnlessPermit),
                ("permit-unless-deny", AlgKind::PermitUnlessDeny),
            ] {
                r.register(CombiningAlgorithm {
                    uri: alg_uri("3.0", scope, name),
                    kind,
                });
            }
            r.register(CombiningAlgorithm {
                uri: alg_uri("1.0", scope, "first-applicable"),
                kind: AlgKind::FirstApplicable,
            });
        }
        r.register(CombiningAlgorithm {
            uri: alg_uri("1.0", "policy", "only-one-applicable"),
            kind: AlgKind::OnlyOneApplicable,
        });
        r.register(CombiningAlgorithm {
            uri: alg_uri("3.0", "policy", "on-permit-apply-second"),
            kind: AlgKind::OnPermitApplySecond,
        });
        r
    }

    pub fn register(&mut self, algorithm: CombiningAlgorithm) {
        self.algorithms
            .insert(algorithm.uri.clone(), Arc::new(algorithm));
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Arc<CombiningAlgorithm>> {
        self.algorithms.get(uri).cloned()
    }

    /// Look up an algorithm, failing as a load-time error.
    ///
    /// # Errors
    ///
    /// `PolicyError::UnknownCombiningAlgorithm` for unknown URIs.
    pub fn require(&self, uri: &str) -> Result<Arc<CombiningAlgorithm>, PolicyError> {
        self.get(uri)
            .ok_or_else(|| PolicyError::UnknownCombiningAlgorithm(uri.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_uris() {
        let r = CombiningRegistry::standard();
        assert!(
            r.get("urn:oasis:names:tc:xacml:3.0:rule-combining-algorithm:deny-overrides")
                .is_some()
        );
        assert!(
            r.get("urn:oasis:names:tc:xacml:1.0:policy-combining-algorithm:only-one-applicable")
                .is_some()
        );
        assert!(
            r.get("urn:oasis:names:tc:xacml:1.0:rule-combining-algorithm:first-applicable")
                .is_some()
        );
        assert!(r.get("urn:example:nonsense").is_none());
    }
}
