//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Numeric widening/narrowing and the `*-from-string` /
//! `string-from-*` families.

use super::{Function, FunctionRegistry, ParamSpec, want_atomic, want_double, want_integer, want_string, xacml_fn_uri};
use crate::errors::Indeterminate;
use crate::expr::EvalValue;
use crate::value::numeric;
use crate::value::{ALL_DATATYPES, DataType, Value};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let integer = ParamSpec::atomic(DataType::Integer);
    let double = ParamSpec::atomic(DataType::Double);
    let string = ParamSpec::atomic(DataType::String);

    registry.register(Function::eager(
        xacml_fn_uri("1.0", "double-to-integer"),
        vec![double],
        integer,
        Box::new(|_ctx, args| {
            numeric::double_to_integer(want_double(args, 0)?)
                .map(|v| EvalValue::Atomic(Value::Integer(v)))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "integer-to-double"),
        vec![integer],
        double,
        Box::new(|_ctx, args| {
            Ok(EvalValue::Atomic(Value::Double(
                numeric::integer_to_double(want_integer(args, 0)?),
            )))
        }),
    ));

    for dt in ALL_DATATYPES {
        if dt == DataType::String || dt == DataType::XPathExpression {
            continue;
        }
        let short = dt.short_name();
        registry.register(Function::eager(
            xacml_fn_uri("3.0", &format!("{short}-from-string")),
            vec![string],
            ParamSpec::atomic(dt),
            Box::new(move |_ctx, args| {
                Value::parse(dt, want_string(args, 0)?)
                    .map(EvalValue::Atomic)
                    .map_err(|e| Indeterminate::syntax(e.to_string()))
            }),
        ));
        registry.register(Function::eager(
            xacml_fn_uri("3.0", &format!("string-from-{short}")),
            vec![ParamSpec::atomic(dt)],
            string,
            Box::new(|_ctx, args| {
                Ok(EvalValue::Atomic(Value::String(
                    want_atomic(args, 0)?.print(),
                )))
            }),
        ));
    }
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

    #[test]
    fn test_integer_from_string_rejects_garbage() {
        let r = FunctionRegistry::standard(false);
        let f = r
            .get("urn:oasis:names:tc:xacml:3.0:function:integer-from-string")
            .unwrap();
        let mut c = ctx();
        let out = f
            .invoke(
                &mut c,
                &[EvalValue::Atomic(Value::String("42".to_string()))],
            )
            .unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Integer(BigInt::from(42))));
        assert!(
            f.invoke(
                &mut c,
                &[EvalValue::Atomic(Value::String("forty-two".to_string()))]
            )
            .is_err()
        );
    }

    #[test]
    fn test_string_from_date_roundtrips() {
        let r = FunctionRegistry::standard(false);
        let to_string = r
            .get("urn:oasis:names:tc:xacml:3.0:function:string-from-date")
            .unwrap();
        let from_string = r
            .get("urn:oasis:names:tc:xacml:3.0:function:date-from-string")
            .unwrap();
        let mut c = ctx();
        let date = from_string
            .invoke(
                &mut c,
                &[EvalValue::Atomic(Value::String("2002-03-22".to_string()))],
            )
            .unwrap();
        let lexical = to_string.invoke(&mut c, &[date.clone()]).unwrap();
        assert_eq!(
            lexical,
            EvalValue::Atomic(Value::String("2002-03-22".to_string()))
        );
    }
}
