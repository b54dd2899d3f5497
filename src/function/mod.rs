//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The function registry: typed signatures, evaluation strategies and
//! the standard XACML function set.
//!
//! A function is identified by URI.  Call sites bind argument
//! expressions at load time and pick an evaluation strategy: eager,
//! short-circuit boolean, or higher-order iteration over bags.  The
//! registry is immutable once built and shared read-only.

pub mod std_arithmetic;
pub mod std_bag;
pub mod std_comparison;
pub mod std_conversion;
pub mod std_equality;
pub mod std_higher_order;
pub mod std_logical;
pub mod std_regexp;
pub mod std_set;
pub mod std_special;
pub mod std_string;
pub mod std_temporal;

use crate::context::EvaluationContext;
use crate::errors::{EvalResult, Indeterminate, PolicyError};
use crate::expr::EvalValue;
use crate::value::{Bag, DataType, Value};
use num_bigint::BigInt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Build a standard function URI from an XACML version and short name.
#[must_use]
pub(crate) fn xacml_fn_uri(version: &str, name: &str) -> String {
    format!("urn:oasis:names:tc:xacml:{version}:function:{name}")
}

/// The static type of an expression: an atomic value, a bag, or a
/// function reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticType {
    Atomic(DataType),
    Bag(DataType),
    Fun,
}

impl fmt::Display for StaticType {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StaticType::Atomic(dt) => write!(f, "{dt}"),
            StaticType::Bag(dt) => write!(f, "bag[{dt}]"),
            StaticType::Fun => write!(f, "function"),
        }
    }
}

/// One parameter or return slot of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub data_type: DataType,
    pub is_bag: bool,
}

impl ParamSpec {
    #[must_use]
    pub fn atomic(data_type: DataType) -> ParamSpec {
        ParamSpec {
            data_type,
            is_bag: false,
        }
    }

    #[must_use]
    pub fn bag(data_type: DataType) -> ParamSpec {
        ParamSpec {
            data_type,
            is_bag: true,
        }
    }

    #[must_use]
    pub fn static_type(&self) -> StaticType {
        if self.is_bag {
            StaticType::Bag(self.data_type)
        } else {
            StaticType::Atomic(self.data_type)
        }
    }

    fn accepts(&self, t: &StaticType) -> bool {
        self.static_type() == *t
    }
}

/// A function's arity and types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    /// Exactly these parameters.
    Fixed {
        params: Vec<ParamSpec>,
        returns: ParamSpec,
    },
    /// A fixed lead followed by `min_repeat` or more of one parameter.
    Variadic {
        lead: Vec<ParamSpec>,
        repeat: ParamSpec,
        min_repeat: usize,
        returns: ParamSpec,
    },
    /// First argument is a function reference; arity and types depend
    /// on it and are validated by the call site.
    HigherOrder,
}

impl Signature {
    /// Validate call-site argument types and compute the return type.
    ///
    /// Higher-order signatures are validated by the expression layer,
    /// not here.
    ///
    /// # Errors
    ///
    /// Arity or argument-type mismatches as `PolicyError`.
    pub fn check(&self, uri: &str, args: &[StaticType]) -> Result<StaticType, PolicyError> {
        match self {
            Signature::Fixed { params, returns } => {
                if args.len() != params.len() {
                    return Err(PolicyError::ArityMismatch(
                        uri.to_string(),
                        params.len(),
                        args.len(),
                    ));
                }
                for (i, (p, a)) in params.iter().zip(args).enumerate() {
                    if !p.accepts(a) {
                        return Err(PolicyError::ArgumentTypeMismatch(
                            uri.to_string(),
                            i,
                            a.to_string(),
                            p.static_type().to_string(),
                        ));
                    }
                }
                Ok(returns.static_type())
            }
            Signature::Variadic {
                lead,
                repeat,
                min_repeat,
                returns,
            } => {
                let min = lead.len() + min_repeat;
                if args.len() < min {
                    return Err(PolicyError::ArityMismatch(uri.to_string(), min, args.len()));
                }
                for (i, a) in args.iter().enumerate() {
                    let p = lead.get(i).unwrap_or(repeat);
                    if !p.accepts(a) {
                        return Err(PolicyError::ArgumentTypeMismatch(
                            uri.to_string(),
                            i,
                            a.to_string(),
                            p.static_type().to_string(),
                        ));
                    }
                }
                Ok(returns.static_type())
            }
            Signature::HigherOrder => Err(PolicyError::MissingFunctionReference(uri.to_string())),
        }
    }
}

/// Implementation of an eager function over fully evaluated arguments.
pub type EagerFn =
    dyn Fn(&mut EvaluationContext, &[EvalValue]) -> EvalResult<EvalValue> + Send + Sync;

/// The higher-order iteration shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HigherOrderKind {
    AnyOf,
    AllOf,
    AnyOfAny,
    AllOfAny,
    AnyOfAll,
    AllOfAll,
    Map,
}

/// How a call site evaluates this function.
pub enum FunctionKind {
    /// Evaluate all arguments, then apply.
    Eager(Box<EagerFn>),
    /// Short-circuit conjunction.
    And,
    /// Short-circuit disjunction.
    Or,
    /// `n-of`: integer threshold over lazily evaluated booleans.
    NOf,
    /// Iterate a function argument over one or two bags.
    HigherOrder(HigherOrderKind),
}

/// A registered function.
pub struct Function {
    uri: String,
    signature: Signature,
    kind: FunctionKind,
    /// Reads request state beyond its arguments (blocks constant
    /// folding).
    ctx_dependent: bool,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Function").field("uri", &self.uri).finish()
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Function {
    /// An eager function with a fixed signature.
    #[must_use]
    pub fn eager(
        uri: String,
        params: Vec<ParamSpec>,
        returns: ParamSpec,
        body: Box<EagerFn>,
    ) -> Function {
        Function {
            uri,
            signature: Signature::Fixed { params, returns },
            kind: FunctionKind::Eager(body),
            ctx_dependent: false,
        }
    }

    /// An eager function with a variadic signature.
    #[must_use]
    pub fn eager_variadic(
        uri: String,
        lead: Vec<ParamSpec>,
        repeat: ParamSpec,
        min_repeat: usize,
        returns: ParamSpec,
        body: Box<EagerFn>,
    ) -> Function {
        Function {
            uri,
            signature: Signature::Variadic {
                lead,
                repeat,
                min_repeat,
                returns,
            },
            kind: FunctionKind::Eager(body),
            ctx_dependent: false,
        }
    }

    #[must_use]
    pub fn special(uri: String, signature: Signature, kind: FunctionKind) -> Function {
        Function {
            uri,
            signature,
            kind,
            ctx_dependent: false,
        }
    }

    #[must_use]
    pub fn context_dependent(mut self) -> Function {
        self.ctx_dependent = true;
        self
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    #[must_use]
    pub fn kind(&self) -> &FunctionKind {
        &self.kind
    }

    #[must_use]
    pub fn is_ctx_dependent(&self) -> bool {
        self.ctx_dependent
    }

    /// Whether this function may be passed as the function argument of
    /// a higher-order function.
    #[must_use]
    pub fn is_first_order(&self) -> bool {
        !matches!(self.kind, FunctionKind::HigherOrder(_))
    }

    /// The return slot for first-order signatures.
    #[must_use]
    pub fn returns(&self) -> Option<ParamSpec> {
        match &self.signature {
            Signature::Fixed { returns, .. } | Signature::Variadic { returns, .. } => {
                Some(*returns)
            }
            Signature::HigherOrder => None,
        }
    }

    /// Apply this function to already-evaluated arguments.  Used by
    /// higher-order iteration and target matches, both of which only
    /// accept fixed-signature functions; the lazy strategies evaluate
    /// at their own call sites and never arrive here.
    ///
    /// # Errors
    ///
    /// Whatever the implementation reports, or `ProcessingError` when
    /// the function has no eager application.
    pub fn invoke(
        &self,
        ctx: &mut EvaluationContext,
        args: &[EvalValue],
    ) -> EvalResult<EvalValue> {
        match &self.kind {
            FunctionKind::Eager(body) => body(ctx, args),
            FunctionKind::And | FunctionKind::Or | FunctionKind::NOf => {
                Err(Indeterminate::processing(format!(
                    "short-circuit function {} used as an argument function",
                    self.uri
                )))
            }
            FunctionKind::HigherOrder(_) => Err(Indeterminate::processing(format!(
                "higher-order function {} used as an argument function",
                self.uri
            ))),
        }
    }
}

/// Lookup table of functions by URI.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<Function>>,
}

impl FunctionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> FunctionRegistry {
        FunctionRegistry::default()
    }

    /// The full standard function set.
    ///
    /// `enable_xpath` also registers `xpath-node-count`; the
    /// node-comparison xpath functions are intentionally absent, so a
    /// policy naming them fails lookup like any unknown function.
    #[must_use]
    pub fn standard(enable_xpath: bool) -> FunctionRegistry {
        let mut r = FunctionRegistry::new();
        std_logical::register(&mut r);
        std_equality::register(&mut r);
        std_arithmetic::register(&mut r);
        std_comparison::register(&mut r);
        std_conversion::register(&mut r);
        std_bag::register(&mut r);
        std_set::register(&mut r);
        std_string::register(&mut r);
        std_temporal::register(&mut r);
        std_regexp::register(&mut r);
        std_special::register(&mut r, enable_xpath);
        std_higher_order::register(&mut r);
        r
    }

    /// Register a function, replacing any previous holder of its URI.
    pub fn register(&mut self, function: Function) {
        self.functions
            .insert(function.uri.clone(), Arc::new(function));
    }

    /// Look up a function by URI.
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Arc<Function>> {
        self.functions.get(uri).cloned()
    }

    /// Look up a function, failing as a load-time error.
    ///
    /// # Errors
    ///
    /// `PolicyError::UnknownFunction` when the URI is not registered.
    pub fn require(&self, uri: &str) -> Result<Arc<Function>, PolicyError> {
        self.get(uri)
            .ok_or_else(|| PolicyError::UnknownFunction(uri.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

pub(crate) fn internal_type_error() -> Indeterminate {
    Indeterminate::processing("argument type did not match the checked signature")
}

/// Argument accessors for eager implementations.  The expression layer
/// type-checks call sites at load time, so a mismatch here is an
/// internal error, not a policy error.
pub(crate) fn want_atomic<'a>(args: &'a [EvalValue], i: usize) -> EvalResult<&'a Value> {
    match args.get(i) {
        Some(EvalValue::Atomic(v)) => Ok(v),
        _ => Err(internal_type_error()),
    }
}

pub(crate) fn want_bag<'a>(args: &'a [EvalValue], i: usize) -> EvalResult<&'a Bag> {
    match args.get(i) {
        Some(EvalValue::Bag(b)) => Ok(b),
        _ => Err(internal_type_error()),
    }
}

pub(crate) fn want_boolean(args: &[EvalValue], i: usize) -> EvalResult<bool> {
    match want_atomic(args, i)? {
        Value::Boolean(b) => Ok(*b),
        _ => Err(internal_type_error()),
    }
}

pub(crate) fn want_integer<'a>(args: &'a [EvalValue], i: usize) -> EvalResult<&'a BigInt> {
    match want_atomic(args, i)? {
        Value::Integer(v) => Ok(v),
        _ => Err(internal_type_error()),
    }
}

pub(crate) fn want_double(args: &[EvalValue], i: usize) -> EvalResult<f64> {
    match want_atomic(args, i)? {
        Value::Double(d) => Ok(*d),
        _ => Err(internal_type_error()),
    }
}

pub(crate) fn want_string<'a>(args: &'a [EvalValue], i: usize) -> EvalResult<&'a str> {
    match want_atomic(args, i)? {
        Value::String(s) => Ok(s),
        _ => Err(internal_type_error()),
    }
}

pub(crate) fn boolean_result(b: bool) -> EvalResult<EvalValue> {
    Ok(EvalValue::Atomic(Value::Boolean(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let r = FunctionRegistry::standard(false);
        assert!(
            r.get("urn:oasis:names:tc:xacml:1.0:function:string-equal")
                .is_some()
        );
        assert!(r.get("urn:oasis:names:tc:xacml:3.0:function:xpath-node-count").is_none());
        assert!(matches!(
            r.require("urn:example:no-such-function"),
            Err(PolicyError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_xpath_function_gated() {
        let r = FunctionRegistry::standard(true);
        assert!(
            r.get("urn:oasis:names:tc:xacml:3.0:function:xpath-node-count")
                .is_some()
        );
    }

    #[test]
    fn test_signature_check() {
        let sig = Signature::Fixed {
            params: vec![
                ParamSpec::atomic(DataType::String),
                ParamSpec::atomic(DataType::String),
            ],
            returns: ParamSpec::atomic(DataType::Boolean),
        };
        assert_eq!(
            sig.check(
                "urn:x",
                &[
                    StaticType::Atomic(DataType::String),
                    StaticType::Atomic(DataType::String)
                ]
            ),
            Ok(StaticType::Atomic(DataType::Boolean))
        );
        assert!(
            sig.check("urn:x", &[StaticType::Atomic(DataType::String)])
                .is_err()
        );
        assert!(
            sig.check(
                "urn:x",
                &[
                    StaticType::Bag(DataType::String),
                    StaticType::Atomic(DataType::String)
                ]
            )
            .is_err()
        );
    }
}
