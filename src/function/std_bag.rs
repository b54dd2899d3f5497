//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The per-type bag primitives: `one-and-only`, `bag-size`, `is-in`
//! and the `bag` constructor.

use super::{
    Function, FunctionRegistry, ParamSpec, boolean_result, want_atomic, want_bag, xacml_fn_uri,
};
use crate::expr::EvalValue;
use crate::value::{ALL_DATATYPES, Bag, DataType, Value};
use num_bigint::BigInt;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let boolean = ParamSpec::atomic(DataType::Boolean);
    let integer = ParamSpec::atomic(DataType::Integer);
    for dt in ALL_DATATYPES {
        if dt == DataType::XPathExpression {
            continue;
        }
        let atomic = ParamSpec::atomic(dt);
        let bag = ParamSpec::bag(dt);
        let version = dt.std_version();
        let short = dt.short_name();

        registry.register(Function::eager(
            xacml_fn_uri(version, &format!("{short}-one-and-only")),
            vec![bag],
            atomic,
            Box::new(|_ctx, args| {
                want_bag(args, 0)?
                    .one_and_only()
                    .map(|v| EvalValue::Atomic(v.clone()))
            }),
        ));
        registry.register(Function::eager(
            xacml_fn_uri(version, &format!("{short}-bag-size")),
            vec![bag],
            integer,
            Box::new(|_ctx, args| {
                Ok(EvalValue::Atomic(Value::Integer(BigInt::from(
                    want_bag(args, 0)?.len(),
                ))))
            }),
        ));
        registry.register(Function::eager(
            xacml_fn_uri(version, &format!("{short}-is-in")),
            vec![atomic, bag],
            boolean,
            Box::new(|_ctx, args| {
                boolean_result(want_bag(args, 1)?.contains(want_atomic(args, 0)?))
            }),
        ));
        registry.register(Function::eager_variadic(
            xacml_fn_uri(version, &format!("{short}-bag")),
            vec![],
            atomic,
            0,
            bag,
            Box::new(move |_ctx, args| {
                let mut values = Vec::with_capacity(args.len());
                for i in 0..args.len() {
                    values.push(want_atomic(args, i)?.clone());
                }
                Ok(EvalValue::Bag(Bag::new(dt, values)))
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
    use num_bigint::BigInt;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(ClockSample::at(DateTime::UNIX_EPOCH.fixed_offset()))
    }

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_bag_constructor_and_size() {
        let r = FunctionRegistry::standard(false);
        let mk = r
            .get("urn:oasis:names:tc:xacml:1.0:function:string-bag")
            .unwrap();
        let size = r
            .get("urn:oasis:names:tc:xacml:1.0:function:string-bag-size")
            .unwrap();
        let mut c = ctx();
        let bag = mk
            .invoke(
                &mut c,
                &[EvalValue::Atomic(s("a")), EvalValue::Atomic(s("b"))],
            )
            .unwrap();
        let out = size.invoke(&mut c, &[bag]).unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Integer(BigInt::from(2))));
        // a zero-argument call builds the empty bag
        let empty = mk.invoke(&mut c, &[]).unwrap();
        assert_eq!(
            empty,
            EvalValue::Bag(Bag::empty(DataType::String))
        );
    }

    #[test]
    fn test_is_in() {
        let r = FunctionRegistry::standard(false);
        let is_in = r
            .get("urn:oasis:names:tc:xacml:1.0:function:string-is-in")
            .unwrap();
        let mut c = ctx();
        let bag = EvalValue::Bag(Bag::new(DataType::String, vec![s("x"), s("y")]));
        let out = is_in
            .invoke(&mut c, &[EvalValue::Atomic(s("y")), bag.clone()])
            .unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(true)));
        let out = is_in
            .invoke(&mut c, &[EvalValue::Atomic(s("z")), bag])
            .unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(false)));
    }
}
