//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Integer and double arithmetic.
//!
//! Integer arithmetic is exact; only division and mod by zero report
//! errors.  Double arithmetic is IEEE-754: division by zero yields an
//! infinity or NaN, never an error.

use super::{
    Function, FunctionRegistry, ParamSpec, want_double, want_integer, xacml_fn_uri,
};
use crate::expr::EvalValue;
use crate::value::numeric;
use crate::value::{DataType, Value};
use num_bigint::BigInt;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let integer = ParamSpec::atomic(DataType::Integer);
    let double = ParamSpec::atomic(DataType::Double);

    // integer-add and integer-multiply accept two or more arguments
    registry.register(Function::eager_variadic(
        xacml_fn_uri("1.0", "integer-add"),
        vec![integer, integer],
        integer,
        0,
        integer,
        Box::new(|_ctx, args| {
            let mut sum = BigInt::from(0u8);
            for i in 0..args.len() {
                sum += want_integer(args, i)?;
            }
            Ok(EvalValue::Atomic(Value::Integer(sum)))
        }),
    ));
    registry.register(Function::eager_variadic(
        xacml_fn_uri("1.0", "integer-multiply"),
        vec![integer, integer],
        integer,
        0,
        integer,
        Box::new(|_ctx, args| {
            let mut product = BigInt::from(1u8);
            for i in 0..args.len() {
                product *= want_integer(args, i)?;
            }
            Ok(EvalValue::Atomic(Value::Integer(product)))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "integer-subtract"),
        vec![integer, integer],
        integer,
        Box::new(|_ctx, args| {
            Ok(EvalValue::Atomic(Value::Integer(
                want_integer(args, 0)? - want_integer(args, 1)?,
            )))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "integer-divide"),
        vec![integer, integer],
        integer,
        Box::new(|_ctx, args| {
            numeric::integer_divide(want_integer(args, 0)?, want_integer(args, 1)?)
                .map(|v| EvalValue::Atomic(Value::Integer(v)))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "integer-mod"),
        vec![integer, integer],
        integer,
        Box::new(|_ctx, args| {
            numeric::integer_mod(want_integer(args, 0)?, want_integer(args, 1)?)
                .map(|v| EvalValue::Atomic(Value::Integer(v)))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "integer-abs"),
        vec![integer],
        integer,
        Box::new(|_ctx, args| {
            Ok(EvalValue::Atomic(Value::Integer(numeric::integer_abs(
                want_integer(args, 0)?,
            ))))
        }),
    ));

    registry.register(Function::eager_variadic(
        xacml_fn_uri("1.0", "double-add"),
        vec![double, double],
        double,
        0,
        double,
        Box::new(|_ctx, args| {
            let mut sum = 0.0f64;
            for i in 0..args.len() {
                sum += want_double(args, i)?;
            }
            Ok(EvalValue::Atomic(Value::Double(sum)))
        }),
    ));
    registry.register(Function::eager_variadic(
        xacml_fn_uri("1.0", "double-multiply"),
        vec![double, double],
        double,
        0,
        double,
        Box::new(|_ctx, args| {
            let mut product = 1.0f64;
            for i in 0..args.len() {
                product *= want_double(args, i)?;
            }
            Ok(EvalValue::Atomic(Value::Double(product)))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "double-subtract"),
        vec![double, double],
        double,
        Box::new(|_ctx, args| {
            Ok(EvalValue::Atomic(Value::Double(
                want_double(args, 0)? - want_double(args, 1)?,
            )))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "double-divide"),
        vec![double, double],
        double,
        Box::new(|_ctx, args| {
            Ok(EvalValue::Atomic(Value::Double(
                want_double(args, 0)? / want_double(args, 1)?,
            )))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "double-abs"),
        vec![double],
        double,
        Box::new(|_ctx, args| {
            Ok(EvalValue::Atomic(Value::Double(want_double(args, 0)?.abs())))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "round"),
        vec![double],
        double,
        Box::new(|_ctx, args| {
            Ok(EvalValue::Atomic(Value::Double(numeric::double_round(
                want_double(args, 0)?,
            ))))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "floor"),
        vec![double],
        double,
        Box::new(|_ctx, args| {
            Ok(EvalValue::Atomic(Value::Double(numeric::double_floor(
                want_double(args, 0)?,
            ))))
        }),
    ));
}

#[cfg(test)]
mod tests {
    use super::super::FunctionRegistry;
    use crate::context::{ClockSample, EvaluationContext};
    use crate::expr::EvalValue;
    use crate::value::Value;
    use chrono::DateTime;
    use num_bigint::BigInt;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(ClockSample::at(DateTime::UNIX_EPOCH.fixed_offset()))
    }

    fn int(v: i64) -> EvalValue {
        EvalValue::Atomic(Value::Integer(BigInt::from(v)))
    }

    #[test]
    fn test_variadic_add() {
        let r = FunctionRegistry::standard(false);
        let add = r
            .get("urn:oasis:names:tc:xacml:1.0:function:integer-add")
            .unwrap();
        let mut c = ctx();
        let out = add.invoke(&mut c, &[int(1), int(2), int(3)]).unwrap();
        assert_eq!(out, int(6));
    }

    #[test]
    fn test_double_divide_by_zero_is_infinite() {
        let r = FunctionRegistry::standard(false);
        let div = r
            .get("urn:oasis:names:tc:xacml:1.0:function:double-divide")
            .unwrap();
        let mut c = ctx();
        let out = div
            .invoke(
                &mut c,
                &[
                    EvalValue::Atomic(Value::Double(1.0)),
                    EvalValue::Atomic(Value::Double(0.0)),
                ],
            )
            .unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Double(f64::INFINITY)));
    }

    #[test]
    fn test_integer_divide_by_zero_reports() {
        let r = FunctionRegistry::standard(false);
        let div = r
            .get("urn:oasis:names:tc:xacml:1.0:function:integer-divide")
            .unwrap();
        let mut c = ctx();
        assert!(div.invoke(&mut c, &[int(1), int(0)]).is_err());
    }
}
