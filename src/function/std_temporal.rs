//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Date/time arithmetic and `time-in-range`.

use super::{
    Function, FunctionRegistry, ParamSpec, boolean_result, internal_type_error, want_atomic,
    xacml_fn_uri,
};
use crate::errors::EvalResult;
use crate::expr::EvalValue;
use crate::value::temporal::{DayTimeDuration, XDate, XDateTime, XTime, YearMonthDuration};
use crate::value::{DataType, Value};

fn want_datetime(args: &[EvalValue], i: usize) -> EvalResult<&XDateTime> {
    match want_atomic(args, i)? {
        Value::DateTime(v) => Ok(v),
        _ => Err(internal_type_error()),
    }
}

fn want_date(args: &[EvalValue], i: usize) -> EvalResult<&XDate> {
    match want_atomic(args, i)? {
        Value::Date(v) => Ok(v),
        _ => Err(internal_type_error()),
    }
}

fn want_time(args: &[EvalValue], i: usize) -> EvalResult<&XTime> {
    match want_atomic(args, i)? {
        Value::Time(v) => Ok(v),
        _ => Err(internal_type_error()),
    }
}

fn want_day_time(args: &[EvalValue], i: usize) -> EvalResult<&DayTimeDuration> {
    match want_atomic(args, i)? {
        Value::DayTimeDuration(v) => Ok(v),
        _ => Err(internal_type_error()),
    }
}

fn want_year_month(args: &[EvalValue], i: usize) -> EvalResult<&YearMonthDuration> {
    match want_atomic(args, i)? {
        Value::YearMonthDuration(v) => Ok(v),
        _ => Err(internal_type_error()),
    }
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let boolean = ParamSpec::atomic(DataType::Boolean);
    let date_time = ParamSpec::atomic(DataType::DateTime);
    let date = ParamSpec::atomic(DataType::Date);
    let time = ParamSpec::atomic(DataType::Time);
    let day_time = ParamSpec::atomic(DataType::DayTimeDuration);
    let year_month = ParamSpec::atomic(DataType::YearMonthDuration);

    for (name, negate) in [
        ("dateTime-add-dayTimeDuration", false),
        ("dateTime-subtract-dayTimeDuration", true),
    ] {
        registry.register(Function::eager(
            xacml_fn_uri("3.0", name),
            vec![date_time, day_time],
            date_time,
            Box::new(move |_ctx, args| {
                want_datetime(args, 0)?
                    .add_day_time(want_day_time(args, 1)?, negate)
                    .map(|v| EvalValue::Atomic(Value::DateTime(v)))
            }),
        ));
    }
    for (name, negate) in [
        ("dateTime-add-yearMonthDuration", false),
        ("dateTime-subtract-yearMonthDuration", true),
    ] {
        registry.register(Function::eager(
            xacml_fn_uri("3.0", name),
            vec![date_time, year_month],
            date_time,
            Box::new(move |_ctx, args| {
                want_datetime(args, 0)?
                    .add_year_month(want_year_month(args, 1)?, negate)
                    .map(|v| EvalValue::Atomic(Value::DateTime(v)))
            }),
        ));
    }
    for (name, negate) in [
        ("date-add-yearMonthDuration", false),
        ("date-subtract-yearMonthDuration", true),
    ] {
        registry.register(Function::eager(
            xacml_fn_uri("3.0", name),
            vec![date, year_month],
            date,
            Box::new(move |_ctx, args| {
                want_date(args, 0)?
                    .add_year_month(want_year_month(args, 1)?, negate)
                    .map(|v| EvalValue::Atomic(Value::Date(v)))
            }),
        ));
    }

    registry.register(Function::eager(
        xacml_fn_uri("2.0", "time-in-range"),
        vec![time, time, time],
        boolean,
        Box::new(|_ctx, args| {
            const DAY: i64 = 86_400 * 1_000_000_000;
            let clock = |t: &XTime| t.normalized_nanos().rem_euclid(DAY);
            let t = clock(want_time(args, 0)?);
            let low = clock(want_time(args, 1)?);
            let high = clock(want_time(args, 2)?);
            // a range crossing midnight wraps around
            if low <= high {
                boolean_result(low <= t && t <= high)
            } else {
                boolean_result(t >= low || t <= high)
            }
        }),
    ));
}
