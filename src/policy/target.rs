//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Targets: a disjunction of `AnyOf` over a conjunction of `AllOf`
//! over `Match` leaves.

use crate::context::EvaluationContext;
use crate::errors::{Indeterminate, PolicyError};
use crate::expr::{AttributeDesignator, AttributeSelector, EvalValue};
use crate::function::{Function, ParamSpec, Signature};
use crate::value::{DataType, Value};
use log::debug;
use std::fmt;
use std::sync::Arc;

/// The three-valued outcome of target matching.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Match,
    NoMatch,
    Indeterminate(Indeterminate),
}

/// Where a match draws its request-side values from.
#[derive(Debug, Clone)]
pub enum MatchSource {
    Designator(AttributeDesignator),
    Selector(AttributeSelector),
}

impl MatchSource {
    fn data_type(&self) -> DataType {
        match self {
            MatchSource::Designator(d) => d.key.data_type,
            MatchSource::Selector(s) => s.data_type,
        }
    }

    fn uses_xpath(&self) -> bool {
        matches!(self, MatchSource::Selector(_))
    }
}

/// One match leaf: a literal paired with a designator or selector
/// under an equality-like boolean function.
#[derive(Debug, Clone)]
pub struct Match {
    function: Arc<Function>,
    literal: Value,
    source: MatchSource,
}

impl Match {
    /// Build a match, validating the function shape: two atomic
    /// parameters (literal type, then attribute type) returning
    /// boolean.
    ///
    /// # Errors
    ///
    /// `PolicyError::InvalidMatchFunction` when the shapes disagree.
    pub fn new(
        function: Arc<Function>,
        literal: Value,
        source: MatchSource,
    ) -> Result<Match, PolicyError> {
        let expected = [
            ParamSpec::atomic(literal.data_type()),
            ParamSpec::atomic(source.data_type()),
        ];
        let valid = match function.signature() {
            Signature::Fixed { params, returns } => {
                params[..] == expected[..]
                    && *returns == ParamSpec::atomic(DataType::Boolean)
            }
            _ => false,
        };
        if !valid {
            return Err(PolicyError::InvalidMatchFunction(
                function.uri().to_string(),
            ));
        }
        Ok(Match {
            function,
            literal,
            source,
        })
    }

    pub(crate) fn uses_xpath(&self) -> bool {
        self.source.uses_xpath()
    }

    /// Apply the match function to the literal and each request value.
    ///
    /// An empty bag is `NoMatch` unless the source demands presence,
    /// in which case the designator/selector already reported
    /// missing-attribute.
    pub fn evaluate(&self, ctx: &mut EvaluationContext) -> MatchResult {
        let bag = match &self.source {
            MatchSource::Designator(d) => ctx.designate(&d.key, d.must_be_present),
            MatchSource::Selector(s) => {
                let expr = crate::expr::Expression::Selector(s.clone());
                match expr.evaluate(ctx) {
                    Ok(EvalValue::Bag(b)) => Ok(b),
                    Ok(_) => Err(Indeterminate::processing("selector produced a non-bag")),
                    Err(e) => Err(e),
                }
            }
        };
        let bag = match bag {
            Ok(b) => b,
            Err(e) => return MatchResult::Indeterminate(e),
        };
        let mut pending: Option<Indeterminate> = None;
        for value in bag.iter() {
            let args = [
                EvalValue::Atomic(self.literal.clone()),
                EvalValue::Atomic(value.clone()),
            ];
            match self
                .function
                .invoke(ctx, &args)
                .and_then(|r| r.expect_boolean())
            {
                Ok(true) => return MatchResult::Match,
                Ok(false) => {}
                Err(e) => {
                    if pending.is_none() {
                        pending = Some(e);
                    }
                }
            }
        }
        match pending {
            Some(e) => MatchResult::Indeterminate(e),
            None => MatchResult::NoMatch,
        }
    }
}

impl fmt::Display for Match {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Match[{}]", self.function.uri())
    }
}

/// Conjunctive sequence of matches.
#[derive(Debug, Clone, Default)]
pub struct AllOf {
    pub matches: Vec<Match>,
}

impl AllOf {
    fn evaluate(&self, ctx: &mut EvaluationContext) -> MatchResult {
        let mut pending: Option<Indeterminate> = None;
        for m in &self.matches {
            match m.evaluate(ctx) {
                MatchResult::NoMatch => return MatchResult::NoMatch,
                MatchResult::Match => {}
                MatchResult::Indeterminate(e) => {
                    if pending.is_none() {
                        pending = Some(e);
                    }
                }
            }
        }
        match pending {
            Some(e) => MatchResult::Indeterminate(e),
            None => MatchResult::Match,
        }
    }
}

/// Disjunctive sequence of `AllOf`.
#[derive(Debug, Clone, Default)]
pub struct AnyOf {
    pub all_ofs: Vec<AllOf>,
}

impl AnyOf {
    fn evaluate(&self, ctx: &mut EvaluationContext) -> MatchResult {
        let mut pending: Option<Indeterminate> = None;
        for a in &self.all_ofs {
            match a.evaluate(ctx) {
                MatchResult::Match => return MatchResult::Match,
                MatchResult::NoMatch => {}
                MatchResult::Indeterminate(e) => {
                    if pending.is_none() {
                        pending = Some(e);
                    }
                }
            }
        }
        match pending {
            Some(e) => MatchResult::Indeterminate(e),
            None => MatchResult::NoMatch,
        }
    }
}

/// A target: conjunctive over its `AnyOf` children; an empty target
/// always matches.
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub any_ofs: Vec<AnyOf>,
}

impl Target {
    /// The always-matching empty target.
    #[must_use]
    pub fn empty() -> Target {
        Target::default()
    }

    #[must_use]
    pub fn new(any_ofs: Vec<AnyOf>) -> Target {
        Target { any_ofs }
    }

    pub(crate) fn uses_xpath(&self) -> bool {
        self.any_ofs
            .iter()
            .flat_map(|a| &a.all_ofs)
            .flat_map(|a| &a.matches)
            .any(Match::uses_xpath)
    }

    pub fn evaluate(&self, ctx: &mut EvaluationContext) -> MatchResult {
        let mut pending: Option<Indeterminate> = None;
        for a in &self.any_ofs {
            match a.evaluate(ctx) {
                MatchResult::NoMatch => {
                    debug!("target anyof produced NoMatch");
                    return MatchResult::NoMatch;
                }
                MatchResult::Match => {}
                MatchResult::Indeterminate(e) => {
                    if pending.is_none() {
                        pending = Some(e);
                    }
                }
            }
        }
        match pending {
            Some(e) => MatchResult::Indeterminate(e),
            None => MatchResult::Match,
        }
    }
}

impl fmt::Display for Target {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Target: {} AnyOf", self.any_ofs.len())
    }
}
