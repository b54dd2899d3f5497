//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The `*-regexp-match` family.
//!
//! XACML regexps use XML Schema syntax, which matches the whole value
//! rather than searching inside it, so patterns are compiled with
//! explicit anchors.  The value operand is matched against its
//! canonical lexical form.

use super::{
    Function, FunctionRegistry, ParamSpec, boolean_result, want_atomic, want_string, xacml_fn_uri,
};
use crate::errors::{EvalResult, Indeterminate};
use crate::value::DataType;
use regex::Regex;

pub(crate) fn xsd_regexp_match(pattern: &str, value: &str) -> EvalResult<bool> {
    let anchored = format!("^(?:{pattern})$");
    let re = Regex::new(&anchored).map_err(|e| {
        Indeterminate::processing(format!("invalid regular expression {pattern:?}: {e}"))
    })?;
    Ok(re.is_match(value))
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let boolean = ParamSpec::atomic(DataType::Boolean);
    let string = ParamSpec::atomic(DataType::String);

    let subjects: [(&str, &str, DataType); 6] = [
        ("1.0", "string-regexp-match", DataType::String),
        ("2.0", "anyURI-regexp-match", DataType::AnyUri),
        ("2.0", "ipAddress-regexp-match", DataType::IpAddress),
        ("2.0", "dnsName-regexp-match", DataType::DnsName),
        ("2.0", "rfc822Name-regexp-match", DataType::Rfc822Name),
        ("2.0", "x500Name-regexp-match", DataType::X500Name),
    ];
    for (version, name, dt) in subjects {
        registry.register(Function::eager(
            xacml_fn_uri(version, name),
            vec![string, ParamSpec::atomic(dt)],
            boolean,
            Box::new(|_ctx, args| {
                let pattern = want_string(args, 0)?;
                let value = want_atomic(args, 1)?.print();
                boolean_result(xsd_regexp_match(pattern, &value)?)
            }),
        ));
    }
}
