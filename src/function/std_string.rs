//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! String functions.
//!
//! Note the XACML argument order on the containment tests: the first
//! argument is the prefix/suffix/needle, the second is the string (or
//! URI) searched in.

use super::{
    Function, FunctionRegistry, ParamSpec, boolean_result, want_atomic, want_integer, want_string,
    xacml_fn_uri,
};
use crate::errors::Indeterminate;
use crate::expr::EvalValue;
use crate::value::{DataType, Value};
use num_traits::ToPrimitive;

fn uri_as_string(args: &[EvalValue], i: usize) -> crate::errors::EvalResult<String> {
    match want_atomic(args, i)? {
        Value::AnyUri(u) => Ok(u.as_str().to_string()),
        _ => Err(super::internal_type_error()),
    }
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let boolean = ParamSpec::atomic(DataType::Boolean);
    let string = ParamSpec::atomic(DataType::String);
    let integer = ParamSpec::atomic(DataType::Integer);
    let any_uri = ParamSpec::atomic(DataType::AnyUri);

    registry.register(Function::eager_variadic(
        xacml_fn_uri("2.0", "string-concatenate"),
        vec![string, string],
        string,
        0,
        string,
        Box::new(|_ctx, args| {
            let mut out = String::new();
            for i in 0..args.len() {
                out.push_str(want_string(args, i)?);
            }
            Ok(EvalValue::Atomic(Value::String(out)))
        }),
    ));

    registry.register(Function::eager(
        xacml_fn_uri("3.0", "string-starts-with"),
        vec![string, string],
        boolean,
        Box::new(|_ctx, args| {
            boolean_result(want_string(args, 1)?.starts_with(want_string(args, 0)?))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("3.0", "string-ends-with"),
        vec![string, string],
        boolean,
        Box::new(|_ctx, args| {
            boolean_result(want_string(args, 1)?.ends_with(want_string(args, 0)?))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("3.0", "string-contains"),
        vec![string, string],
        boolean,
        Box::new(|_ctx, args| {
            boolean_result(want_string(args, 1)?.contains(want_string(args, 0)?))
        }),
    ));

    registry.register(Function::eager(
        xacml_fn_uri("3.0", "anyURI-starts-with"),
        vec![string, any_uri],
        boolean,
        Box::new(|_ctx, args| {
            boolean_result(uri_as_string(args, 1)?.starts_with(want_string(args, 0)?))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("3.0", "anyURI-ends-with"),
        vec![string, any_uri],
        boolean,
        Box::new(|_ctx, args| {
            boolean_result(uri_as_string(args, 1)?.ends_with(want_string(args, 0)?))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("3.0", "anyURI-contains"),
        vec![string, any_uri],
        boolean,
        Box::new(|_ctx, args| {
            boolean_result(uri_as_string(args, 1)?.contains(want_string(args, 0)?))
        }),
    ));

    registry.register(Function::eager(
        xacml_fn_uri("3.0", "string-substring"),
        vec![string, integer, integer],
        string,
        Box::new(|_ctx, args| {
            let s = want_string(args, 0)?;
            let chars: Vec<char> = s.chars().collect();
            let begin = want_integer(args, 1)?
                .to_usize()
                .ok_or_else(|| Indeterminate::processing("substring begin out of range"))?;
            let end_raw = want_integer(args, 2)?;
            let end = if *end_raw == num_bigint::BigInt::from(-1) {
                chars.len()
            } else {
                end_raw
                    .to_usize()
                    .ok_or_else(|| Indeterminate::processing("substring end out of range"))?
            };
            if begin > end || end > chars.len() {
                return Err(Indeterminate::processing("substring indexes out of range"));
            }
            Ok(EvalValue::Atomic(Value::String(
                chars[begin..end].iter().collect(),
            )))
        }),
    ));

    registry.register(Function::eager(
        xacml_fn_uri("1.0", "string-normalize-space"),
        vec![string],
        string,
        Box::new(|_ctx, args| {
            Ok(EvalValue::Atomic(Value::String(
                want_string(args, 0)?.trim().to_string(),
            )))
        }),
    ));
    registry.register(Function::eager(
        xacml_fn_uri("1.0", "string-normalize-to-lower-case"),
        vec![string],
        string,
        Box::new(|_ctx, args| {
            Ok(EvalValue::Atomic(Value::String(
                want_string(args, 0)?.to_lowercase(),
            )))
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

    fn s(v: &str) -> EvalValue {
        EvalValue::Atomic(Value::String(v.to_string()))
    }

    #[test]
    fn test_starts_with_argument_order() {
        let r = FunctionRegistry::standard(false);
        let f = r
            .get("urn:oasis:names:tc:xacml:3.0:function:string-starts-with")
            .unwrap();
        let mut c = ctx();
        // the first argument is the prefix
        let out = f.invoke(&mut c, &[s("foo"), s("foobar")]).unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(true)));
        let out = f.invoke(&mut c, &[s("foobar"), s("foo")]).unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(false)));
    }

    #[test]
    fn test_substring() {
        let r = FunctionRegistry::standard(false);
        let f = r
            .get("urn:oasis:names:tc:xacml:3.0:function:string-substring")
            .unwrap();
        let mut c = ctx();
        let int = |v: i64| EvalValue::Atomic(Value::Integer(BigInt::from(v)));
        let out = f.invoke(&mut c, &[s("abcdef"), int(1), int(3)]).unwrap();
        assert_eq!(out, s("bc"));
        // -1 selects through the end
        let out = f.invoke(&mut c, &[s("abcdef"), int(3), int(-1)]).unwrap();
        assert_eq!(out, s("def"));
        assert!(f.invoke(&mut c, &[s("abc"), int(2), int(9)]).is_err());
    }
}
