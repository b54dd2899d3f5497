//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The per-type set operations over bags.
//!
//! These are set-semantics functions: results are deduplicated and
//! multiplicity is ignored, using each datatype's XACML equality.

use super::{Function, FunctionRegistry, ParamSpec, boolean_result, want_bag, xacml_fn_uri};
use crate::expr::EvalValue;
use crate::value::{ALL_DATATYPES, Bag, DataType, Value};

fn dedup(values: impl Iterator<Item = Value>) -> Vec<Value> {
    let mut out: Vec<Value> = vec![];
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

fn is_subset(a: &Bag, b: &Bag) -> bool {
    a.iter().all(|v| b.contains(v))
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let boolean = ParamSpec::atomic(DataType::Boolean);
    for dt in ALL_DATATYPES {
        if dt == DataType::XPathExpression {
            continue;
        }
        let bag = ParamSpec::bag(dt);
        let version = dt.std_version();
        let short = dt.short_name();

        registry.register(Function::eager(
            xacml_fn_uri(version, &format!("{short}-intersection")),
            vec![bag, bag],
            bag,
            Box::new(move |_ctx, args| {
                let a = want_bag(args, 0)?;
                let b = want_bag(args, 1)?;
                let values = dedup(a.iter().filter(|v| b.contains(v)).cloned());
                Ok(EvalValue::Bag(Bag::new(dt, values)))
            }),
        ));
        registry.register(Function::eager(
            xacml_fn_uri(version, &format!("{short}-union")),
            vec![bag, bag],
            bag,
            Box::new(move |_ctx, args| {
                let a = want_bag(args, 0)?;
                let b = want_bag(args, 1)?;
                let values = dedup(a.iter().chain(b.iter()).cloned());
                Ok(EvalValue::Bag(Bag::new(dt, values)))
            }),
        ));
        registry.register(Function::eager(
            xacml_fn_uri(version, &format!("{short}-subset")),
            vec![bag, bag],
            boolean,
            Box::new(|_ctx, args| {
                boolean_result(is_subset(want_bag(args, 0)?, want_bag(args, 1)?))
            }),
        ));
        registry.register(Function::eager(
            xacml_fn_uri(version, &format!("{short}-at-least-one-member-of")),
            vec![bag, bag],
            boolean,
            Box::new(|_ctx, args| {
                let a = want_bag(args, 0)?;
                let b = want_bag(args, 1)?;
                boolean_result(a.iter().any(|v| b.contains(v)))
            }),
        ));
        registry.register(Function::eager(
            xacml_fn_uri(version, &format!("{short}-set-equals")),
            vec![bag, bag],
            boolean,
            Box::new(|_ctx, args| {
                let a = want_bag(args, 0)?;
                let b = want_bag(args, 1)?;
                boolean_result(is_subset(a, b) && is_subset(b, a))
            }),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::super::FunctionRegistry;
    use crate::context::{ClockSample, EvaluationContext};
    use crate::expr::EvalValue;
    use crate::value::{Bag, DataType, Value};
    use chrono::DateTime;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(ClockSample::at(DateTime::UNIX_EPOCH.fixed_offset()))
    }

    fn bag(values: &[&str]) -> EvalValue {
        EvalValue::Bag(Bag::new(
            DataType::String,
            values.iter().map(|v| Value::String((*v).to_string())).collect(),
        ))
    }

    #[test]
    fn test_intersection_deduplicates() {
        let r = FunctionRegistry::standard(false);
        let f = r
            .get("urn:oasis:names:tc:xacml:1.0:function:string-intersection")
            .unwrap();
        let mut c = ctx();
        let out = f
            .invoke(&mut c, &[bag(&["a", "a", "b"]), bag(&["a", "c", "a"])])
            .unwrap();
        assert_eq!(out, bag(&["a"]));
    }

    #[test]
    fn test_set_equals_ignores_multiplicity() {
        let r = FunctionRegistry::standard(false);
        let f = r
            .get("urn:oasis:names:tc:xacml:1.0:function:string-set-equals")
            .unwrap();
        let mut c = ctx();
        let out = f
            .invoke(&mut c, &[bag(&["a", "b", "b"]), bag(&["b", "a"])])
            .unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(true)));
    }

    #[test]
    fn test_subset() {
        let r = FunctionRegistry::standard(false);
        let f = r
            .get("urn:oasis:names:tc:xacml:1.0:function:string-subset")
            .unwrap();
        let mut c = ctx();
        let out = f
            .invoke(&mut c, &[bag(&["a"]), bag(&["a", "b"])])
            .unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(true)));
        let out = f
            .invoke(&mut c, &[bag(&["a", "z"]), bag(&["a", "b"])])
            .unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(false)));
    }
}
