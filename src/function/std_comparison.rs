//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Order comparisons for every ordered datatype.

use super::{
    Function, FunctionRegistry, ParamSpec, boolean_result, internal_type_error, want_atomic,
    xacml_fn_uri,
};
use crate::value::DataType;
use std::cmp::Ordering;

const ORDERED: [DataType; 8] = [
    DataType::Integer,
    DataType::Double,
    DataType::String,
    DataType::Date,
    DataType::Time,
    DataType::DateTime,
    DataType::DayTimeDuration,
    DataType::YearMonthDuration,
];

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let boolean = ParamSpec::atomic(DataType::Boolean);
    for dt in ORDERED {
        let variants: [(&str, fn(Ordering) -> bool); 4] = [
            ("greater-than", |o| o == Ordering::Greater),
            ("greater-than-or-equal", |o| o != Ordering::Less),
            ("less-than", |o| o == Ordering::Less),
            ("less-than-or-equal", |o| o != Ordering::Greater),
        ];
        for (suffix, accept) in variants {
            let uri = xacml_fn_uri(
                dt.std_version(),
                &format!("{}-{}", dt.short_name(), suffix),
            );
            registry.register(Function::eager(
                uri,
                vec![ParamSpec::atomic(dt), ParamSpec::atomic(dt)],
                boolean,
                Box::new(move |_ctx, args| {
                    let a = want_atomic(args, 0)?;
                    let b = want_atomic(args, 1)?;
                    match a.compare(b) {
                        // an incomparable pair (NaN) is simply not
                        // greater/less than anything
                        None if a.data_type() == DataType::Double => boolean_result(false),
                        None => Err(internal_type_error()),
                        Some(o) => boolean_result(accept(o)),
                    }
                }),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::FunctionRegistry;
    use crate::context::{ClockSample, EvaluationContext};
    use crate::expr::EvalValue;
    use crate::value::Value;
    use crate::value::temporal::XDateTime;
    use chrono::DateTime;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(ClockSample::at(DateTime::UNIX_EPOCH.fixed_offset()))
    }

    #[test]
    fn test_string_order_is_codepoint() {
        let r = FunctionRegistry::standard(false);
        let lt = r
            .get("urn:oasis:names:tc:xacml:1.0:function:string-less-than")
            .unwrap();
        let mut c = ctx();
        // 'Z' < 'a' in codepoint order
        let out = lt
            .invoke(
                &mut c,
                &[
                    EvalValue::Atomic(Value::String("Z".to_string())),
                    EvalValue::Atomic(Value::String("a".to_string())),
                ],
            )
            .unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(true)));
    }

    #[test]
    fn test_datetime_comparison_across_zones() {
        let r = FunctionRegistry::standard(false);
        let gt = r
            .get("urn:oasis:names:tc:xacml:1.0:function:dateTime-greater-than")
            .unwrap();
        let mut c = ctx();
        let earlier = XDateTime::parse("2002-03-22T08:23:47-05:00").unwrap();
        let later = XDateTime::parse("2002-03-22T13:30:00Z").unwrap();
        let out = gt
            .invoke(
                &mut c,
                &[
                    EvalValue::Atomic(Value::DateTime(later)),
                    EvalValue::Atomic(Value::DateTime(earlier)),
                ],
            )
            .unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(true)));
    }

    #[test]
    fn test_nan_comparisons_are_false() {
        let r = FunctionRegistry::standard(false);
        let mut c = ctx();
        for name in ["double-greater-than", "double-less-than"] {
            let f = r
                .get(&format!("urn:oasis:names:tc:xacml:1.0:function:{name}"))
                .unwrap();
            let out = f
                .invoke(
                    &mut c,
                    &[
                        EvalValue::Atomic(Value::Double(f64::NAN)),
                        EvalValue::Atomic(Value::Double(1.0)),
                    ],
                )
                .unwrap();
            assert_eq!(out, EvalValue::Atomic(Value::Boolean(false)));
        }
    }
}
