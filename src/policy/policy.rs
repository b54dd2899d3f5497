//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Policies: a target, local variable definitions, rules under a
//! rule-combining algorithm, and PEP actions.

use super::pep_action::{
    AdviceExpression, AttributeAssignmentExpression, ObligationExpression, evaluate_pep_actions,
};
use super::rule::{Condition, Effect, Rule};
use super::target::{MatchResult, Target};
use super::{Decision, ExtendedEffect, PolicyDecision, PolicyIdentifier};
use crate::combining::{Child, CombiningAlgorithm};
use crate::context::EvaluationContext;
use crate::errors::PolicyError;
use crate::expr::{Expression, VarScope, VariableDefinition};
use crate::function::StaticType;
use crate::refs::Version;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Load-time validation options; the PDP configuration owns the
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyLoadOptions {
    pub max_variable_reference_depth: usize,
    pub enable_xpath: bool,
}

impl Default for PolicyLoadOptions {
    fn default() -> Self {
        PolicyLoadOptions {
            max_variable_reference_depth: 10,
            enable_xpath: false,
        }
    }
}

/// A validated, immutable policy.
#[derive(Debug, Clone)]
pub struct Policy {
    pub id: String,
    pub version: Version,
    pub description: Option<String>,
    pub target: Option<Target>,
    pub(crate) var_scope: Arc<VarScope>,
    pub algorithm: Arc<CombiningAlgorithm>,
    pub rules: Vec<Rule>,
    pub obligations: Vec<ObligationExpression>,
    pub advice: Vec<AdviceExpression>,
}

/// Assembles and validates a `Policy`.
pub struct PolicyBuilder {
    id: String,
    version: Version,
    description: Option<String>,
    target: Option<Target>,
    variables: Vec<VariableDefinition>,
    algorithm: Arc<CombiningAlgorithm>,
    rules: Vec<Rule>,
    obligations: Vec<ObligationExpression>,
    advice: Vec<AdviceExpression>,
}

impl PolicyBuilder {
    #[must_use]
    pub fn new(id: &str, algorithm: Arc<CombiningAlgorithm>) -> PolicyBuilder {
        PolicyBuilder {
            id: id.to_string(),
            version: Version::default(),
            description: None,
            target: None,
            variables: vec![],
            algorithm,
            rules: vec![],
            obligations: vec![],
            advice: vec![],
        }
    }

    #[must_use]
    pub fn version(mut self, version: Version) -> PolicyBuilder {
        self.version = version;
        self
    }

    #[must_use]
    pub fn description(mut self, description: &str) -> PolicyBuilder {
        self.description = Some(description.to_string());
        self
    }

    #[must_use]
    pub fn target(mut self, target: Target) -> PolicyBuilder {
        self.target = Some(target);
        self
    }

    /// Define a variable.  Definitions are ordered; later definitions
    /// may reference earlier ones, never the reverse.
    #[must_use]
    pub fn variable(mut self, id: &str, expression: Expression) -> PolicyBuilder {
        self.variables.push(VariableDefinition {
            id: id.to_string(),
            expression: Arc::new(expression),
        });
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: Rule) -> PolicyBuilder {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn obligation(mut self, obligation: ObligationExpression) -> PolicyBuilder {
        self.obligations.push(obligation);
        self
    }

    #[must_use]
    pub fn advice(mut self, advice: AdviceExpression) -> PolicyBuilder {
        self.advice.push(advice);
        self
    }

    /// Validate and freeze the policy.
    ///
    /// Checks performed: duplicate/forward variable references,
    /// variable chain depth, condition type, assignment expression
    /// types, and the XPath gate.  Constant subtrees are folded on
    /// the way out.
    ///
    /// # Errors
    ///
    /// The first `PolicyError` found.
    pub fn build(self, opts: &PolicyLoadOptions) -> Result<Policy, PolicyError> {
        let mut var_types: HashMap<String, StaticType> = HashMap::new();
        let mut var_depths: HashMap<String, usize> = HashMap::new();
        let mut folded_vars = vec![];
        for def in self.variables {
            if var_types.contains_key(&def.id) {
                return Err(PolicyError::DuplicateVariable(def.id));
            }
            if !opts.enable_xpath && def.expression.uses_xpath() {
                return Err(PolicyError::XPathDisabled);
            }
            let t = def.expression.static_type(&var_types)?;
            if t == StaticType::Fun {
                return Err(PolicyError::MisplacedFunctionReference);
            }
            let depth = def.expression.variable_depth(&var_depths);
            if depth > opts.max_variable_reference_depth {
                return Err(PolicyError::VariableDepthExceeded(
                    opts.max_variable_reference_depth,
                ));
            }
            var_types.insert(def.id.clone(), t);
            var_depths.insert(def.id.clone(), depth);
            let expression = Arc::try_unwrap(def.expression)
                .unwrap_or_else(|arc| (*arc).clone())
                .fold();
            folded_vars.push(VariableDefinition {
                id: def.id,
                expression: Arc::new(expression),
            });
        }

        if !opts.enable_xpath {
            if let Some(t) = &self.target {
                if t.uses_xpath() {
                    return Err(PolicyError::XPathDisabled);
                }
            }
        }

        let mut rules = vec![];
        for mut rule in self.rules {
            if let Some(t) = &rule.target {
                if !opts.enable_xpath && t.uses_xpath() {
                    return Err(PolicyError::XPathDisabled);
                }
            }
            if let Some(c) = rule.condition.take() {
                if !opts.enable_xpath && c.expression.uses_xpath() {
                    return Err(PolicyError::XPathDisabled);
                }
                c.validate(&var_types)?;
                rule.condition = Some(Condition::new(c.expression.fold()));
            }
            rule.obligations = validate_obligations(rule.obligations, &var_types, opts)?;
            rule.advice = validate_advice(rule.advice, &var_types, opts)?;
            rules.push(rule);
        }

        let obligations = validate_obligations(self.obligations, &var_types, opts)?;
        let advice = validate_advice(self.advice, &var_types, opts)?;

        Ok(Policy {
            id: self.id.clone(),
            version: self.version,
            description: self.description,
            target: self.target,
            var_scope: Arc::new(VarScope {
                scope_id: self.id,
                defs: folded_vars,
            }),
            algorithm: self.algorithm,
            rules,
            obligations,
            advice,
        })
    }
}

fn validate_assignment_exprs(
    assignments: Vec<AttributeAssignmentExpression>,
    vars: &HashMap<String, StaticType>,
    opts: &PolicyLoadOptions,
) -> Result<Vec<AttributeAssignmentExpression>, PolicyError> {
    let mut out = vec![];
    for a in assignments {
        let AttributeAssignmentExpression {
            attribute_id,
            category,
            issuer,
            expression,
        } = a;
        if !opts.enable_xpath && expression.uses_xpath() {
            return Err(PolicyError::XPathDisabled);
        }
        if expression.static_type(vars)? == StaticType::Fun {
            return Err(PolicyError::MisplacedFunctionReference);
        }
        out.push(AttributeAssignmentExpression {
            attribute_id,
            category,
            issuer,
            expression: expression.fold(),
        });
    }
    Ok(out)
}

pub(crate) fn validate_obligations(
    obligations: Vec<ObligationExpression>,
    vars: &HashMap<String, StaticType>,
    opts: &PolicyLoadOptions,
) -> Result<Vec<ObligationExpression>, PolicyError> {
    obligations
        .into_iter()
        .map(|o| {
            Ok(ObligationExpression {
                id: o.id,
                applies_to: o.applies_to,
                assignments: validate_assignment_exprs(o.assignments, vars, opts)?,
            })
        })
        .collect()
}

pub(crate) fn validate_advice(
    advice: Vec<AdviceExpression>,
    vars: &HashMap<String, StaticType>,
    opts: &PolicyLoadOptions,
) -> Result<Vec<AdviceExpression>, PolicyError> {
    advice
        .into_iter()
        .map(|a| {
            Ok(AdviceExpression {
                id: a.id,
                applies_to: a.applies_to,
                assignments: validate_assignment_exprs(a.assignments, vars, opts)?,
            })
        })
        .collect()
}

impl Policy {
    #[must_use]
    pub fn identifier(&self) -> PolicyIdentifier {
        PolicyIdentifier {
            id: self.id.clone(),
            version: self.version.clone(),
            is_policy_set: false,
        }
    }

    /// The policy's own target outcome, used by
    /// `only-one-applicable`.
    pub fn match_target(&self, ctx: &mut EvaluationContext) -> MatchResult {
        match &self.target {
            Some(t) => t.evaluate(ctx),
            None => MatchResult::Match,
        }
    }

    /// Evaluate the policy under a request context.
    pub fn evaluate(&self, ctx: &mut EvaluationContext) -> PolicyDecision {
        ctx.push_variable_scope(self.var_scope.clone());
        let decision = self.evaluate_in_scope(ctx);
        ctx.pop_variable_scope();
        debug!("policy {} evaluates to {decision}", self.id);
        decision
    }

    fn evaluate_in_scope(&self, ctx: &mut EvaluationContext) -> PolicyDecision {
        let children: Vec<Child> = self.rules.iter().map(Child::Rule).collect();
        match self.match_target(ctx) {
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
                // the combining outcome decides which extended effect
                // the target failure carries
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
        }
    }
}

pub(crate) fn decision_effect(decision: Decision) -> Option<Effect> {
    match decision {
        Decision::Permit => Some(Effect::Permit),
        Decision::Deny => Some(Effect::Deny),
        _ => None,
    }
}

impl fmt::Display for Policy {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Policy {} v{} ({} rules)",
            self.id,
            self.version,
            self.rules.len()
        )
    }
}
