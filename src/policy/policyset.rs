//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Policy sets: a target, children (policies, nested sets or
//! references) under a policy-combining algorithm, and PEP actions.

use super::pep_action::{AdviceExpression, ObligationExpression, evaluate_pep_actions};
use super::policy::{Policy, PolicyLoadOptions, decision_effect};
use super::target::{MatchResult, Target};
use super::{Decision, ExtendedEffect, PolicyDecision, PolicyIdentifier};
use crate::combining::{Child, CombiningAlgorithm};
use crate::context::EvaluationContext;
use crate::errors::{Indeterminate, PolicyError};
use crate::refs::{PolicyReference, Version};
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One child of a policy set.
#[derive(Debug, Clone)]
pub enum PolicyChild {
    Policy(Arc<Policy>),
    PolicySet(Arc<PolicySet>),
    PolicyRef(PolicyReference),
    PolicySetRef(PolicyReference),
}

impl PolicyChild {
    /// Evaluate the child, resolving references dynamically through
    /// the context's provider under the reference-chain checks.
    pub fn evaluate(&self, ctx: &mut EvaluationContext) -> PolicyDecision {
        match self {
            PolicyChild::Policy(p) => p.evaluate(ctx),
            PolicyChild::PolicySet(ps) => ps.evaluate(ctx),
            PolicyChild::PolicyRef(r) => {
                self.with_resolved(ctx, r, false, |child, ctx| child.evaluate(ctx))
            }
            PolicyChild::PolicySetRef(r) => {
                self.with_resolved(ctx, r, true, |child, ctx| child.evaluate(ctx))
            }
        }
    }

    /// The child's target outcome, used by `only-one-applicable`.
    pub fn applicable(&self, ctx: &mut EvaluationContext) -> MatchResult {
        match self {
            PolicyChild::Policy(p) => p.match_target(ctx),
            PolicyChild::PolicySet(ps) => ps.match_target(ctx),
            PolicyChild::PolicyRef(r) => {
                let outcome =
                    self.with_resolved(ctx, r, false, |child, ctx| match child.applicable(ctx) {
                        MatchResult::Match => PolicyDecision::effect(super::rule::Effect::Permit),
                        MatchResult::NoMatch => PolicyDecision::not_applicable(),
                        MatchResult::Indeterminate(e) => {
                            PolicyDecision::indeterminate(e, ExtendedEffect::Both)
                        }
                    });
                decision_to_match(outcome)
            }
            PolicyChild::PolicySetRef(r) => {
                let outcome =
                    self.with_resolved(ctx, r, true, |child, ctx| match child.applicable(ctx) {
                        MatchResult::Match => PolicyDecision::effect(super::rule::Effect::Permit),
                        MatchResult::NoMatch => PolicyDecision::not_applicable(),
                        MatchResult::Indeterminate(e) => {
                            PolicyDecision::indeterminate(e, ExtendedEffect::Both)
                        }
                    });
                decision_to_match(outcome)
            }
        }
    }

    fn with_resolved(
        &self,
        ctx: &mut EvaluationContext,
        reference: &PolicyReference,
        is_set: bool,
        action: impl FnOnce(&PolicyChild, &mut EvaluationContext) -> PolicyDecision,
    ) -> PolicyDecision {
        let Some(provider) = ctx.ref_provider() else {
            warn!("reference {reference} with no reference policy provider");
            return PolicyDecision::indeterminate(
                Indeterminate::processing("no policy reference provider configured"),
                ExtendedEffect::Both,
            );
        };
        if let Err(e) = ctx.follow_reference(&reference.id) {
            return PolicyDecision::indeterminate(e, ExtendedEffect::Both);
        }
        let resolved = if is_set {
            provider
                .policy_set(&reference.id, &reference.constraints)
                .map(PolicyChild::PolicySet)
        } else {
            provider
                .policy(&reference.id, &reference.constraints)
                .map(PolicyChild::Policy)
        };
        let decision = match resolved {
            Some(child) => action(&child, ctx),
            None => {
                warn!("unresolvable reference {reference}");
                PolicyDecision::indeterminate(
                    Indeterminate::processing(format!("unresolvable reference {reference}")),
                    ExtendedEffect::Both,
                )
            }
        };
        ctx.pop_reference();
        decision
    }
}

fn decision_to_match(d: PolicyDecision) -> MatchResult {
    match d.decision {
        Decision::Permit | Decision::Deny => MatchResult::Match,
        Decision::NotApplicable => MatchResult::NoMatch,
        Decision::Indeterminate => MatchResult::Indeterminate(Indeterminate {
            status: d.status,
        }),
    }
}

impl fmt::Display for PolicyChild {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PolicyChild::Policy(p) => write!(f, "{p}"),
            PolicyChild::PolicySet(ps) => write!(f, "{ps}"),
            PolicyChild::PolicyRef(r) | PolicyChild::PolicySetRef(r) => write!(f, "{r}"),
        }
    }
}

/// A validated, immutable policy set.
#[derive(Debug, Clone)]
pub struct PolicySet {
    pub id: String,
    pub version: Version,
    pub description: Option<String>,
    pub target: Option<Target>,
    pub algorithm: Arc<CombiningAlgorithm>,
    pub children: Vec<PolicyChild>,
    pub obligations: Vec<ObligationExpression>,
    pub advice: Vec<AdviceExpression>,
}

/// Assembles and validates a `PolicySet`.
pub struct PolicySetBuilder {
    id: String,
    version: Version,
    description: Option<String>,
    target: Option<Target>,
    algorithm: Arc<CombiningAlgorithm>,
    children: Vec<PolicyChild>,
    obligations: Vec<ObligationExpression>,
    advice: Vec<AdviceExpression>,
}

impl PolicySetBuilder {
    #[must_use]
    pub fn new(id: &str, algorithm: Arc<CombiningAlgorithm>) -> PolicySetBuilder {
        PolicySetBuilder {
            id: id.to_string(),
            version: Version::default(),
            description: None,
            target: None,
            algorithm,
            children: vec![],
            obligations: vec![],
            advice: vec![],
        }
    }

    #[must_use]
    pub fn version(mut self, version: Version) -> PolicySetBuilder {
        self.version = version;
        self
    }

    #[must_use]
    pub fn description(mut self, description: &str) -> PolicySetBuilder {
        self.description = Some(description.to_string());
        self
    }

    #[must_use]
    pub fn target(mut self, target: Target) -> PolicySetBuilder {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: Policy) -> PolicySetBuilder {
        self.children.push(PolicyChild::Policy(Arc::new(policy)));
        self
    }

    #[must_use]
    pub fn policy_set(mut self, policy_set: PolicySet) -> PolicySetBuilder {
        self.children
            .push(PolicyChild::PolicySet(Arc::new(policy_set)));
        self
    }

    #[must_use]
    pub fn child(mut self, child: PolicyChild) -> PolicySetBuilder {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn obligation(mut self, obligation: ObligationExpression) -> PolicySetBuilder {
        self.obligations.push(obligation);
        self
    }

    #[must_use]
    pub fn advice(mut self, advice: AdviceExpression) -> PolicySetBuilder {
        self.advice.push(advice);
        self
    }

    /// Validate and freeze the policy set.  Children were validated
    /// when they were built.
    ///
    /// # Errors
    ///
    /// The first `PolicyError` found in the set's own target or PEP
    /// actions.
    pub fn build(self, opts: &PolicyLoadOptions) -> Result<PolicySet, PolicyError> {
        if !opts.enable_xpath {
            if let Some(t) = &self.target {
                if t.uses_xpath() {
                    return Err(PolicyError::XPathDisabled);
                }
            }
        }
        // policy sets have no variable scope
        let no_vars = HashMap::new();
        let obligations = super::policy::validate_obligations(
            self.obligations,
            &no_vars,
            opts,
        )?;
        let advice = super::policy::validate_advice(self.advice, &no_vars, opts)?;
        Ok(PolicySet {
            id: self.id,
            version: self.version,
            description: self.description,
            target: self.target,
            algorithm: self.algorithm,
            children: self.children,
            obligations,
            advice,
        })
    }
}

impl PolicySet {
    #[must_use]
    pub fn identifier(&self) -> PolicyIdentifier {
        PolicyIdentifier {
            id: self.id.clone(),
            version: self.version.clone(),
            is_policy_set: true,
        }
    }

    /// A copy of this set with different children; used by static
    /// reference linking.
    #[must_use]
    pub fn with_children(&self, children: Vec<PolicyChild>) -> PolicySet {
        PolicySet {
            id: self.id.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            target: self.target.clone(),
            algorithm: self.algorithm.clone(),
            children,
            obligations: self.obligations.clone(),
            advice: self.advice.clone(),
        }
    }

    /// The set's own target outcome, used by `only-one-applicable`.
    pub fn match_target(&self, ctx: &mut EvaluationContext) -> MatchResult {
        match &self.target {
            Some(t) => t.evaluate(ctx),
            None => MatchResult::Match,
        }
    }

    /// Evaluate the policy set under a request context.
    pub fn evaluate(&self, ctx: &mut EvaluationContext) -> PolicyDecision {
        let children: Vec<Child> = self.children.iter().map(Child::Node).collect();
        let decision = match self.match_target(ctx) {
            MatchResult::NoMatch => PolicyDecision::not_applicable(),
            MatchResult::Match => {
                let mut d = self.algorithm.combine(ctx, &children);
                if let Some(effect) = decision_effect(d.decision) {
                    match evaluate_pep_actions(effect, &self.obligations, &self.advice, ctx) {
                        Ok((obligations, advice)) => {
                            d.obligations.extend(obligations);
                            d.advice.extend(advice);
                        }
                        Err(e) => {
                            let applicable = std::mem::take(&mut d.applicable_policies);
                            d = PolicyDecision::indeterminate(e, effect.into());
                            d.applicable_policies = applicable;
                        }
                    }
                }
                if d.decision != Decision::NotApplicable {
                    d.applicable_policies.insert(0, self.identifier());
                }
                d
            }
            MatchResult::Indeterminate(e) => {
                let combined = self.algorithm.combine(ctx, &children);
                let mut d = match combined.decision {
                    Decision::NotApplicable => PolicyDecision::not_applicable(),
                    Decision::Permit => {
                        PolicyDecision::indeterminate(e, ExtendedEffect::Permit)
                    }
                    Decision::Deny => PolicyDecision::indeterminate(e, ExtendedEffect::Deny),
                    Decision::Indeterminate => PolicyDecision::indeterminate(
                        e,
                        combined.extended.unwrap_or(ExtendedEffect::Both),
                    ),
                };
                if d.decision != Decision::NotApplicable {
                    d.applicable_policies.insert(0, self.identifier());
                }
                d
            }
        };
        debug!("policy set {} evaluates to {decision}", self.id);
        decision
    }
}

impl fmt::Display for PolicySet {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PolicySet {} v{} ({} children)",
            self.id,
            self.version,
            self.children.len()
        )
    }
}
