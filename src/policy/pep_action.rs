//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! PEP actions: obligation and advice expressions and their evaluated
//! forms.
//!
//! Expressions are only evaluated after the owning rule/policy has
//! produced a matching decision; a failing assignment turns the whole
//! decision `Indeterminate` and suppresses every PEP action from that
//! source.

use super::rule::Effect;
use crate::context::EvaluationContext;
use crate::errors::EvalResult;
use crate::expr::{EvalValue, Expression};
use crate::value::Value;
use std::fmt;

/// One attribute assignment inside an obligation/advice expression.
#[derive(Debug, Clone)]
pub struct AttributeAssignmentExpression {
    pub attribute_id: String,
    pub category: Option<String>,
    pub issuer: Option<String>,
    pub expression: Expression,
}

/// An obligation template attached to a rule, policy or policy set.
#[derive(Debug, Clone)]
pub struct ObligationExpression {
    pub id: String,
    pub applies_to: Effect,
    pub assignments: Vec<AttributeAssignmentExpression>,
}

/// An advice template; same shape as an obligation but not binding on
/// the PEP.
#[derive(Debug, Clone)]
pub struct AdviceExpression {
    pub id: String,
    pub applies_to: Effect,
    pub assignments: Vec<AttributeAssignmentExpression>,
}

/// A fully evaluated attribute assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeAssignment {
    pub attribute_id: String,
    pub category: Option<String>,
    pub issuer: Option<String>,
    pub value: Value,
}

/// An obligation handed to the enforcement point.
#[derive(Debug, Clone, PartialEq)]
pub struct Obligation {
    pub id: String,
    pub assignments: Vec<AttributeAssignment>,
}

impl fmt::Display for Obligation {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Obligation: {}", self.id)
    }
}

/// Advice handed to the enforcement point.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    pub id: String,
    pub assignments: Vec<AttributeAssignment>,
}

impl fmt::Display for Advice {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Advice: {}", self.id)
    }
}

fn evaluate_assignments(
    assignments: &[AttributeAssignmentExpression],
    ctx: &mut EvaluationContext,
) -> EvalResult<Vec<AttributeAssignment>> {
    let mut out = vec![];
    for a in assignments {
        let values: Vec<Value> = match a.expression.evaluate(ctx)? {
            EvalValue::Atomic(v) => vec![v],
            // a bag contributes one assignment per element; an empty
            // bag contributes none
            EvalValue::Bag(b) => b.iter().cloned().collect(),
        };
        for value in values {
            out.push(AttributeAssignment {
                attribute_id: a.attribute_id.clone(),
                category: a.category.clone(),
                issuer: a.issuer.clone(),
                value,
            });
        }
    }
    Ok(out)
}

/// Evaluate the obligation/advice expressions whose `AppliesTo`
/// matches the decision's effect, preserving document order.
///
/// # Errors
///
/// The first assignment failure; the caller must then emit no PEP
/// actions at all.
pub(crate) fn evaluate_pep_actions(
    effect: Effect,
    obligations: &[ObligationExpression],
    advice: &[AdviceExpression],
    ctx: &mut EvaluationContext,
) -> EvalResult<(Vec<Obligation>, Vec<Advice>)> {
    let mut out_obligations = vec![];
    for o in obligations.iter().filter(|o| o.applies_to == effect) {
        out_obligations.push(Obligation {
            id: o.id.clone(),
            assignments: evaluate_assignments(&o.assignments, ctx)?,
        });
    }
    let mut out_advice = vec![];
    for a in advice.iter().filter(|a| a.applies_to == effect) {
        out_advice.push(Advice {
            id: a.id.clone(),
            assignments: evaluate_assignments(&a.assignments, ctx)?,
        });
    }
    Ok((out_obligations, out_advice))
}
