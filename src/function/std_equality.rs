//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The per-type `*-equal` family.

use super::{
    Function, FunctionRegistry, ParamSpec, boolean_result, want_atomic, want_string, xacml_fn_uri,
};
use crate::value::{ALL_DATATYPES, DataType, Value};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let boolean = ParamSpec::atomic(DataType::Boolean);
    for dt in ALL_DATATYPES {
        if dt == DataType::XPathExpression {
            continue;
        }
        let uri = xacml_fn_uri(dt.std_version(), &format!("{}-equal", dt.short_name()));
        registry.register(Function::eager(
            uri,
            vec![ParamSpec::atomic(dt), ParamSpec::atomic(dt)],
            boolean,
            Box::new(move |_ctx, args| {
                let a = want_atomic(args, 0)?;
                let b = want_atomic(args, 1)?;
                // double-equal is IEEE equality: NaN is never equal,
                // signed zeros are
                if let (Value::Double(x), Value::Double(y)) = (a, b) {
                    boolean_result(x == y)
                } else {
                    boolean_result(a == b)
                }
            }),
        ));
    }

    registry.register(Function::eager(
        xacml_fn_uri("3.0", "string-equal-ignore-case"),
        vec![
            ParamSpec::atomic(DataType::String),
            ParamSpec::atomic(DataType::String),
        ],
        boolean,
        Box::new(|_ctx, args| {
            boolean_result(want_string(args, 0)?.to_lowercase() == want_string(args, 1)?.to_lowercase())
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

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(ClockSample::at(DateTime::UNIX_EPOCH.fixed_offset()))
    }

    #[test]
    fn test_double_equal_is_ieee() {
        let r = FunctionRegistry::standard(false);
        let eq = r
            .get("urn:oasis:names:tc:xacml:1.0:function:double-equal")
            .unwrap();
        let mut c = ctx();
        let nan = EvalValue::Atomic(Value::Double(f64::NAN));
        let out = eq.invoke(&mut c, &[nan.clone(), nan]).unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(false)));
        let zero = EvalValue::Atomic(Value::Double(0.0));
        let neg_zero = EvalValue::Atomic(Value::Double(-0.0));
        let out = eq.invoke(&mut c, &[zero, neg_zero]).unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(true)));
    }

    #[test]
    fn test_string_equal_ignore_case() {
        let r = FunctionRegistry::standard(false);
        let eq = r
            .get("urn:oasis:names:tc:xacml:3.0:function:string-equal-ignore-case")
            .unwrap();
        let mut c = ctx();
        let out = eq
            .invoke(
                &mut c,
                &[
                    EvalValue::Atomic(Value::String("Hello".to_string())),
                    EvalValue::Atomic(Value::String("hELLO".to_string())),
                ],
            )
            .unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(true)));
    }
}
