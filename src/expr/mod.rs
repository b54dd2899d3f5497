//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The typed expression tree.
//!
//! Nodes are a closed sum: literal values, attribute designators,
//! attribute selectors, variable references, function applications and
//! function references.  Trees are statically type-checked when a
//! policy is built; a run-time type mismatch inside the engine is a
//! bug, not a policy error.

use crate::context::{AttributeKey, ClockSample, EvaluationContext};
use crate::errors::{EvalResult, Indeterminate, PolicyError};
use crate::function::{Function, FunctionKind, HigherOrderKind, ParamSpec, Signature, StaticType};
use crate::value::{Bag, DataType, Value};
use crate::xpath::XmlContent;
use log::debug;
use num_traits::ToPrimitive;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An evaluated expression result: a single value or a bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalValue {
    Atomic(Value),
    Bag(Bag),
}

impl EvalValue {
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            EvalValue::Atomic(v) => v.data_type(),
            EvalValue::Bag(b) => b.data_type(),
        }
    }

    #[must_use]
    pub fn is_bag(&self) -> bool {
        matches!(self, EvalValue::Bag(_))
    }

    #[must_use]
    pub fn static_type(&self) -> StaticType {
        match self {
            EvalValue::Atomic(v) => StaticType::Atomic(v.data_type()),
            EvalValue::Bag(b) => StaticType::Bag(b.data_type()),
        }
    }

    /// The boolean inside, for condition and predicate results.
    ///
    /// # Errors
    ///
    /// `ProcessingError` when the value is not an atomic boolean.
    pub fn expect_boolean(&self) -> EvalResult<bool> {
        match self {
            EvalValue::Atomic(Value::Boolean(b)) => Ok(*b),
            _ => Err(Indeterminate::processing(
                "expression did not produce a boolean",
            )),
        }
    }
}

impl fmt::Display for EvalValue {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EvalValue::Atomic(v) => write!(f, "{v}"),
            EvalValue::Bag(b) => write!(f, "{b}"),
        }
    }
}

/// A named expression local to one policy.
#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub id: String,
    pub expression: Arc<Expression>,
}

/// The variable definitions visible while evaluating one policy.
#[derive(Debug, Clone)]
pub struct VarScope {
    /// Unique per policy; memo entries are keyed by it.
    pub scope_id: String,
    pub defs: Vec<VariableDefinition>,
}

/// Reference by name to request attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDesignator {
    pub key: AttributeKey,
    pub must_be_present: bool,
}

impl AttributeDesignator {
    #[must_use]
    pub fn new(key: AttributeKey, must_be_present: bool) -> AttributeDesignator {
        AttributeDesignator {
            key,
            must_be_present,
        }
    }
}

impl fmt::Display for AttributeDesignator {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.must_be_present {
            write!(f, "{}[mustbepresent]", self.key)
        } else {
            write!(f, "{}", self.key)
        }
    }
}

/// XPath-based extraction from request content.
#[derive(Debug, Clone)]
pub struct AttributeSelector {
    pub category: String,
    pub path: String,
    /// (prefix, URI) bindings the path is compiled under.
    pub namespaces: Vec<(String, String)>,
    /// Optional attribute (of datatype xpathExpression, same
    /// category) whose value narrows the content root.
    pub context_selector_id: Option<String>,
    pub data_type: DataType,
    pub must_be_present: bool,
}

impl AttributeSelector {
    fn content_roots(&self, ctx: &mut EvaluationContext) -> EvalResult<Vec<XmlContent>> {
        let Some(content) = ctx.content(&self.category) else {
            return Ok(vec![]);
        };
        match &self.context_selector_id {
            None => Ok(vec![content]),
            Some(id) => {
                let key = AttributeKey::new(&self.category, id, DataType::XPathExpression);
                let bag = ctx.designate(&key, true)?;
                let selector = bag.one_and_only()?;
                let Value::XPathExpression(xp) = selector else {
                    return Err(Indeterminate::processing(
                        "context selector attribute is not an xpathExpression",
                    ));
                };
                let compiled = ctx.compile_xpath(&xp.path, &xp.namespaces)?;
                compiled.select_nodes(&content)
            }
        }
    }

    fn evaluate(&self, ctx: &mut EvaluationContext) -> EvalResult<Bag> {
        let roots = self.content_roots(ctx)?;
        let mut values = vec![];
        if !roots.is_empty() {
            let compiled = ctx.compile_xpath(&self.path, &self.namespaces)?;
            for root in &roots {
                for lexical in compiled.select_values(root)? {
                    let value = Value::parse(self.data_type, &lexical)
                        .map_err(|e| Indeterminate::syntax(e.to_string()))?;
                    values.push(value);
                }
            }
        }
        if values.is_empty() && self.must_be_present {
            let detail = AttributeKey::new(&self.category, &self.path, self.data_type)
                .missing_detail();
            ctx.record_missing(detail.clone());
            return Err(Indeterminate::missing_attribute(detail));
        }
        Ok(Bag::new(self.data_type, values))
    }
}

/// One expression node.
#[derive(Debug, Clone)]
pub enum Expression {
    /// A constant; evaluation returns it unchanged.
    Literal(EvalValue),
    Designator(AttributeDesignator),
    Selector(AttributeSelector),
    VariableRef(String),
    Apply(Apply),
    /// Only valid as the first argument of a higher-order function.
    FunctionRef(Arc<Function>),
}

/// A function application over argument expressions.
#[derive(Debug, Clone)]
pub struct Apply {
    pub function: Arc<Function>,
    pub args: Vec<Expression>,
}

impl Expression {
    /// A literal atomic value.
    #[must_use]
    pub fn value(v: Value) -> Expression {
        Expression::Literal(EvalValue::Atomic(v))
    }

    /// A function application.
    #[must_use]
    pub fn apply(function: Arc<Function>, args: Vec<Expression>) -> Expression {
        Expression::Apply(Apply { function, args })
    }

    /// Compute the static type, validating call sites along the way.
    ///
    /// `vars` maps the variable ids already defined in the enclosing
    /// policy to their types; referencing anything else is a forward
    /// or unknown reference and fails.
    ///
    /// # Errors
    ///
    /// The first arity, type or reference problem found.
    pub fn static_type(
        &self,
        vars: &HashMap<String, StaticType>,
    ) -> Result<StaticType, PolicyError> {
        match self {
            Expression::Literal(v) => Ok(v.static_type()),
            Expression::Designator(d) => Ok(StaticType::Bag(d.key.data_type)),
            Expression::Selector(s) => Ok(StaticType::Bag(s.data_type)),
            Expression::VariableRef(id) => vars
                .get(id)
                .copied()
                .ok_or_else(|| PolicyError::UndefinedVariable(id.clone())),
            Expression::FunctionRef(_) => Ok(StaticType::Fun),
            Expression::Apply(a) => a.check(vars),
        }
    }

    /// Whether this subtree touches XPath machinery (selectors or
    /// xpathExpression literals).  Used to reject policies when XPath
    /// support is disabled.
    #[must_use]
    pub fn uses_xpath(&self) -> bool {
        match self {
            Expression::Selector(_) => true,
            Expression::Literal(v) => v.data_type() == DataType::XPathExpression,
            Expression::Apply(a) => a.args.iter().any(Expression::uses_xpath),
            _ => false,
        }
    }

    /// The maximum chain of variable references rooted at this
    /// expression, given the depths of previously defined variables.
    #[must_use]
    pub(crate) fn variable_depth(&self, depths: &HashMap<String, usize>) -> usize {
        match self {
            Expression::VariableRef(id) => depths.get(id).copied().unwrap_or(0) + 1,
            Expression::Apply(a) => a
                .args
                .iter()
                .map(|e| e.variable_depth(depths))
                .max()
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Evaluate under a request context.
    ///
    /// # Errors
    ///
    /// `Indeterminate` with a status describing the failure.
    pub fn evaluate(&self, ctx: &mut EvaluationContext) -> EvalResult<EvalValue> {
        match self {
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Designator(d) => ctx
                .designate(&d.key, d.must_be_present)
                .map(EvalValue::Bag),
            Expression::Selector(s) => s.evaluate(ctx).map(EvalValue::Bag),
            Expression::VariableRef(id) => evaluate_variable(id, ctx),
            Expression::FunctionRef(f) => Err(Indeterminate::processing(format!(
                "function reference {} evaluated outside a higher-order call",
                f.uri()
            ))),
            Expression::Apply(a) => a.evaluate(ctx),
        }
    }

    /// Replace constant subtrees with the literal they evaluate to.
    ///
    /// A subtree is constant when it contains no designator, selector
    /// or variable reference and no context-dependent function.  A
    /// constant subtree that fails to evaluate is kept as-is so the
    /// error surfaces per-request with full status detail.
    #[must_use]
    pub fn fold(self) -> Expression {
        match self {
            Expression::Apply(a) => {
                let folded = Apply {
                    function: a.function,
                    args: a.args.into_iter().map(Expression::fold).collect(),
                };
                let foldable = !folded.function.is_ctx_dependent()
                    && folded.args.iter().all(|e| match e {
                        Expression::Literal(_) => true,
                        Expression::FunctionRef(f) => !f.is_ctx_dependent(),
                        _ => false,
                    });
                let expr = Expression::Apply(folded);
                if foldable {
                    let mut scratch = EvaluationContext::new(ClockSample::at(
                        chrono::DateTime::UNIX_EPOCH.fixed_offset(),
                    ));
                    match expr.evaluate(&mut scratch) {
                        Ok(v) => {
                            debug!("folded constant expression to {v}");
                            Expression::Literal(v)
                        }
                        Err(_) => expr,
                    }
                } else {
                    expr
                }
            }
            other => other,
        }
    }
}

fn evaluate_variable(id: &str, ctx: &mut EvaluationContext) -> EvalResult<EvalValue> {
    let Some((scope_id, expression)) = ctx.find_variable(id) else {
        return Err(Indeterminate::processing(format!(
            "variable {id} is not defined in the current policy"
        )));
    };
    if let Some(memoized) = ctx.variable_memo(&scope_id, id) {
        return memoized;
    }
    let result = expression.evaluate(ctx);
    ctx.memoize_variable(&scope_id, id, result.clone());
    result
}

impl Apply {
    /// Validate this call site and compute its return type.
    fn check(&self, vars: &HashMap<String, StaticType>) -> Result<StaticType, PolicyError> {
        if matches!(self.function.signature(), Signature::HigherOrder) {
            return self.check_higher_order(vars);
        }
        let mut arg_types = Vec::with_capacity(self.args.len());
        for a in &self.args {
            let t = a.static_type(vars)?;
            if t == StaticType::Fun {
                return Err(PolicyError::MisplacedFunctionReference);
            }
            arg_types.push(t);
        }
        self.function.signature().check(self.function.uri(), &arg_types)
    }

    fn check_higher_order(
        &self,
        vars: &HashMap<String, StaticType>,
    ) -> Result<StaticType, PolicyError> {
        let uri = self.function.uri().to_string();
        let FunctionKind::HigherOrder(kind) = self.function.kind() else {
            return Err(PolicyError::MissingFunctionReference(uri));
        };
        let Some(Expression::FunctionRef(sub)) = self.args.first() else {
            return Err(PolicyError::MissingFunctionReference(uri));
        };
        if !sub.is_first_order() {
            return Err(PolicyError::MissingFunctionReference(uri));
        }
        let (params, returns) = match sub.signature() {
            Signature::Fixed { params, returns } => (params.clone(), *returns),
            _ => return Err(PolicyError::MissingFunctionReference(uri)),
        };
        if params.iter().any(|p| p.is_bag) {
            return Err(PolicyError::MissingFunctionReference(uri));
        }
        let rest: Vec<StaticType> = self.args[1..]
            .iter()
            .map(|a| a.static_type(vars))
            .collect::<Result<_, _>>()?;
        let boolean = ParamSpec::atomic(DataType::Boolean);
        match kind {
            HigherOrderKind::AnyOf | HigherOrderKind::AllOf => {
                if returns != boolean {
                    return Err(PolicyError::MissingFunctionReference(uri));
                }
                if rest.len() != params.len() {
                    return Err(PolicyError::ArityMismatch(
                        uri,
                        params.len() + 1,
                        self.args.len(),
                    ));
                }
                let mut bags = 0usize;
                for (i, (t, p)) in rest.iter().zip(&params).enumerate() {
                    match t {
                        StaticType::Atomic(dt) if *dt == p.data_type => {}
                        StaticType::Bag(dt) if *dt == p.data_type => bags += 1,
                        other => {
                            return Err(PolicyError::ArgumentTypeMismatch(
                                uri,
                                i + 1,
                                other.to_string(),
                                p.static_type().to_string(),
                            ));
                        }
                    }
                }
                if bags != 1 {
                    return Err(PolicyError::ArgumentTypeMismatch(
                        uri,
                        1,
                        "expected exactly one bag argument".to_string(),
                        "one bag".to_string(),
                    ));
                }
                Ok(StaticType::Atomic(DataType::Boolean))
            }
            HigherOrderKind::AnyOfAny
            | HigherOrderKind::AllOfAny
            | HigherOrderKind::AnyOfAll
            | HigherOrderKind::AllOfAll => {
                if returns != boolean || params.len() != 2 {
                    return Err(PolicyError::MissingFunctionReference(uri));
                }
                if rest.len() != 2 {
                    return Err(PolicyError::ArityMismatch(uri, 3, self.args.len()));
                }
                for (i, (t, p)) in rest.iter().zip(&params).enumerate() {
                    if *t != StaticType::Bag(p.data_type) {
                        return Err(PolicyError::ArgumentTypeMismatch(
                            uri,
                            i + 1,
                            t.to_string(),
                            format!("bag[{}]", p.data_type),
                        ));
                    }
                }
                Ok(StaticType::Atomic(DataType::Boolean))
            }
            HigherOrderKind::Map => {
                if params.len() != 1 {
                    return Err(PolicyError::MissingFunctionReference(uri));
                }
                if returns.is_bag {
                    return Err(PolicyError::MissingFunctionReference(uri));
                }
                if rest.len() != 1 {
                    return Err(PolicyError::ArityMismatch(uri, 2, self.args.len()));
                }
                if rest[0] != StaticType::Bag(params[0].data_type) {
                    return Err(PolicyError::ArgumentTypeMismatch(
                        uri,
                        1,
                        rest[0].to_string(),
                        format!("bag[{}]", params[0].data_type),
                    ));
                }
                Ok(StaticType::Bag(returns.data_type))
            }
        }
    }

    fn evaluate(&self, ctx: &mut EvaluationContext) -> EvalResult<EvalValue> {
        match self.function.kind() {
            FunctionKind::Eager(_) => {
                let mut values = Vec::with_capacity(self.args.len());
                for a in &self.args {
                    values.push(a.evaluate(ctx)?);
                }
                self.function.invoke(ctx, &values)
            }
            FunctionKind::And => {
                // false dominates any error; errors dominate true
                let mut pending: Option<Indeterminate> = None;
                for a in &self.args {
                    match a.evaluate(ctx).and_then(|v| v.expect_boolean()) {
                        Ok(false) => return boolean(false),
                        Ok(true) => {}
                        Err(e) => {
                            if pending.is_none() {
                                pending = Some(e);
                            }
                        }
                    }
                }
                match pending {
                    Some(e) => Err(e),
                    None => boolean(true),
                }
            }
            FunctionKind::Or => {
                let mut pending: Option<Indeterminate> = None;
                for a in &self.args {
                    match a.evaluate(ctx).and_then(|v| v.expect_boolean()) {
                        Ok(true) => return boolean(true),
                        Ok(false) => {}
                        Err(e) => {
                            if pending.is_none() {
                                pending = Some(e);
                            }
                        }
                    }
                }
                match pending {
                    Some(e) => Err(e),
                    None => boolean(false),
                }
            }
            FunctionKind::NOf => self.evaluate_n_of(ctx),
            FunctionKind::HigherOrder(kind) => self.evaluate_higher_order(*kind, ctx),
        }
    }

    fn evaluate_n_of(&self, ctx: &mut EvaluationContext) -> EvalResult<EvalValue> {
        let Some(first) = self.args.first() else {
            return Err(Indeterminate::processing("n-of without a threshold"));
        };
        let threshold = first.evaluate(ctx)?;
        let EvalValue::Atomic(Value::Integer(n)) = threshold else {
            return Err(Indeterminate::processing("n-of threshold is not an integer"));
        };
        let Some(n) = n.to_usize() else {
            return Err(Indeterminate::processing("n-of threshold out of range"));
        };
        if n == 0 {
            return boolean(true);
        }
        let candidates = self.args.len() - 1;
        if n > candidates {
            return Err(Indeterminate::processing(
                "n-of threshold exceeds argument count",
            ));
        }
        let mut trues = 0usize;
        let mut errors = 0usize;
        let mut first_error: Option<Indeterminate> = None;
        for a in &self.args[1..] {
            match a.evaluate(ctx).and_then(|v| v.expect_boolean()) {
                Ok(true) => {
                    trues += 1;
                    if trues >= n {
                        return boolean(true);
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    errors += 1;
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if trues + errors >= n {
            // enough indeterminate arguments to have reached the
            // threshold
            Err(first_error.unwrap_or_else(|| {
                Indeterminate::processing("n-of could not be decided")
            }))
        } else {
            boolean(false)
        }
    }

    fn evaluate_higher_order(
        &self,
        kind: HigherOrderKind,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<EvalValue> {
        let Some(Expression::FunctionRef(f)) = self.args.first() else {
            return Err(Indeterminate::processing(
                "higher-order call without a function reference",
            ));
        };
        let f = f.clone();
        let mut rest = Vec::with_capacity(self.args.len() - 1);
        for a in &self.args[1..] {
            rest.push(a.evaluate(ctx)?);
        }
        match kind {
            HigherOrderKind::AnyOf | HigherOrderKind::AllOf => {
                let Some(bag_idx) = rest.iter().position(EvalValue::is_bag) else {
                    return Err(Indeterminate::processing("any-of/all-of without a bag"));
                };
                let EvalValue::Bag(bag) = rest[bag_idx].clone() else {
                    unreachable!("position() just found a bag");
                };
                let want_any = kind == HigherOrderKind::AnyOf;
                let mut pending: Option<Indeterminate> = None;
                for v in bag.iter() {
                    let mut call = rest.clone();
                    call[bag_idx] = EvalValue::Atomic(v.clone());
                    match f.invoke(ctx, &call).and_then(|r| r.expect_boolean()) {
                        Ok(b) if b == want_any => return boolean(want_any),
                        Ok(_) => {}
                        Err(e) => {
                            if pending.is_none() {
                                pending = Some(e);
                            }
                        }
                    }
                }
                match pending {
                    Some(e) => Err(e),
                    None => boolean(!want_any),
                }
            }
            HigherOrderKind::AnyOfAny
            | HigherOrderKind::AllOfAny
            | HigherOrderKind::AnyOfAll
            | HigherOrderKind::AllOfAll => {
                let (Some(EvalValue::Bag(first)), Some(EvalValue::Bag(second))) =
                    (rest.first(), rest.get(1))
                else {
                    return Err(Indeterminate::processing(
                        "two-bag higher-order call without two bags",
                    ));
                };
                // outer quantifier ranges over the first bag, inner
                // over the second
                let (outer_any, inner_any) = match kind {
                    HigherOrderKind::AnyOfAny => (true, true),
                    HigherOrderKind::AllOfAny => (false, true),
                    HigherOrderKind::AnyOfAll => (true, false),
                    HigherOrderKind::AllOfAll => (false, false),
                    _ => unreachable!("outer match restricted the kind"),
                };
                let first = first.clone();
                let second = second.clone();
                let mut pending: Option<Indeterminate> = None;
                for x in first.iter() {
                    let mut inner_pending: Option<Indeterminate> = None;
                    let mut inner_decided: Option<bool> = None;
                    for y in second.iter() {
                        let call = [
                            EvalValue::Atomic(x.clone()),
                            EvalValue::Atomic(y.clone()),
                        ];
                        match f.invoke(ctx, &call).and_then(|r| r.expect_boolean()) {
                            Ok(b) if b == inner_any => {
                                inner_decided = Some(inner_any);
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                if inner_pending.is_none() {
                                    inner_pending = Some(e);
                                }
                            }
                        }
                    }
                    let inner = match (inner_decided, inner_pending) {
                        (Some(b), _) => Ok(b),
                        (None, Some(e)) => Err(e),
                        (None, None) => Ok(!inner_any),
                    };
                    match inner {
                        Ok(b) if b == outer_any => return boolean(outer_any),
                        Ok(_) => {}
                        Err(e) => {
                            if pending.is_none() {
                                pending = Some(e);
                            }
                        }
                    }
                }
                match pending {
                    Some(e) => Err(e),
                    None => boolean(!outer_any),
                }
            }
            HigherOrderKind::Map => {
                let Some(EvalValue::Bag(bag)) = rest.first().cloned() else {
                    return Err(Indeterminate::processing("map without a bag"));
                };
                let out_type = f
                    .returns()
                    .ok_or_else(|| Indeterminate::processing("map over an untyped function"))?
                    .data_type;
                let mut out = Vec::with_capacity(bag.len());
                for v in bag.iter() {
                    let result = f.invoke(ctx, &[EvalValue::Atomic(v.clone())])?;
                    let EvalValue::Atomic(value) = result else {
                        return Err(Indeterminate::processing("map function returned a bag"));
                    };
                    out.push(value);
                }
                Ok(EvalValue::Bag(Bag::new(out_type, out)))
            }
        }
    }
}

fn boolean(b: bool) -> EvalResult<EvalValue> {
    Ok(EvalValue::Atomic(Value::Boolean(b)))
}
