//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Rules: effect, optional target, optional boolean condition, PEP
//! actions.

use super::pep_action::{AdviceExpression, ObligationExpression, evaluate_pep_actions};
use super::target::{MatchResult, Target};
use super::{Decision, PolicyDecision};
use crate::context::EvaluationContext;
use crate::errors::PolicyError;
use crate::expr::Expression;
use crate::function::StaticType;
use crate::value::DataType;
use log::debug;
use std::collections::HashMap;
use std::fmt;

/// The effect of a rule.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Effect {
    Permit,
    Deny,
}

impl fmt::Display for Effect {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Effect::Permit => write!(f, "Permit"),
            Effect::Deny => write!(f, "Deny"),
        }
    }
}

/// A rule condition: a strictly boolean, non-bag expression.
#[derive(Debug, Clone)]
pub struct Condition {
    pub expression: Expression,
}

impl Condition {
    #[must_use]
    pub fn new(expression: Expression) -> Condition {
        Condition { expression }
    }

    /// Enforce the boolean/non-bag invariant under the policy's
    /// variable scope.
    pub(crate) fn validate(
        &self,
        vars: &HashMap<String, StaticType>,
    ) -> Result<(), PolicyError> {
        match self.expression.static_type(vars)? {
            StaticType::Atomic(DataType::Boolean) => Ok(()),
            _ => Err(PolicyError::ConditionNotBoolean),
        }
    }
}

/// A rule definition.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub description: Option<String>,
    pub effect: Effect,
    pub target: Option<Target>,
    pub condition: Option<Condition>,
    pub obligations: Vec<ObligationExpression>,
    pub advice: Vec<AdviceExpression>,
}

impl Rule {
    /// A bare rule with just an id and effect; targets, conditions and
    /// PEP actions are attached by the builder-style methods.
    #[must_use]
    pub fn new(id: &str, effect: Effect) -> Rule {
        Rule {
            id: id.to_string(),
            description: None,
            effect,
            target: None,
            condition: None,
            obligations: vec![],
            advice: vec![],
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: Target) -> Rule {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Rule {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn with_obligation(mut self, obligation: ObligationExpression) -> Rule {
        self.obligations.push(obligation);
        self
    }

    #[must_use]
    pub fn with_advice(mut self, advice: AdviceExpression) -> Rule {
        self.advice.push(advice);
        self
    }

    /// Evaluate the rule under a request context.
    pub fn evaluate(&self, ctx: &mut EvaluationContext) -> PolicyDecision {
        if let Some(t) = &self.target {
            match t.evaluate(ctx) {
                MatchResult::NoMatch => {
                    debug!("rule {} target did not match", self.id);
                    return PolicyDecision::not_applicable();
                }
                MatchResult::Indeterminate(e) => {
                    debug!("rule {} target indeterminate: {e}", self.id);
                    return PolicyDecision::indeterminate(e, self.effect.into());
                }
                MatchResult::Match => {}
            }
        }
        if let Some(c) = &self.condition {
            match c.expression.evaluate(ctx).and_then(|v| v.expect_boolean()) {
                Ok(false) => {
                    debug!("rule {} condition is false", self.id);
                    return PolicyDecision::not_applicable();
                }
                Ok(true) => {}
                Err(e) => {
                    debug!("rule {} condition indeterminate: {e}", self.id);
                    return PolicyDecision::indeterminate(e, self.effect.into());
                }
            }
        }
        match evaluate_pep_actions(self.effect, &self.obligations, &self.advice, ctx) {
            Ok((obligations, advice)) => {
                let mut d = PolicyDecision::effect(self.effect);
                d.obligations = obligations;
                d.advice = advice;
                debug!("rule {} evaluates to {}", self.id, d.decision);
                d
            }
            // a failing obligation/advice expression poisons the
            // whole rule outcome
            Err(e) => PolicyDecision::indeterminate(e, self.effect.into()),
        }
    }

    /// The rule's target outcome, used by `only-one-applicable`.
    pub fn applicable(&self, ctx: &mut EvaluationContext) -> MatchResult {
        match &self.target {
            Some(t) => t.evaluate(ctx),
            None => MatchResult::Match,
        }
    }
}

impl fmt::Display for Rule {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Rule {}, effect: {}", self.id, self.effect)
    }
}

// used by PolicyDecision::effect
impl From<Effect> for Decision {
    fn from(e: Effect) -> Decision {
        match e {
            Effect::Permit => Decision::Permit,
            Effect::Deny => Decision::Deny,
        }
    }
}
