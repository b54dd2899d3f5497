//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Logical functions: `not`, and the short-circuit `and`, `or` and
//! `n-of` strategies.

use super::{
    Function, FunctionKind, FunctionRegistry, ParamSpec, Signature, boolean_result, want_boolean,
    xacml_fn_uri,
};
use crate::value::DataType;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let boolean = ParamSpec::atomic(DataType::Boolean);
    let integer = ParamSpec::atomic(DataType::Integer);

    registry.register(Function::eager(
        xacml_fn_uri("1.0", "not"),
        vec![boolean],
        boolean,
        Box::new(|_ctx, args| boolean_result(!want_boolean(args, 0)?)),
    ));

    // and/or/n-of are evaluated lazily by the call site
    registry.register(Function::special(
        xacml_fn_uri("1.0", "and"),
        Signature::Variadic {
            lead: vec![],
            repeat: boolean,
            min_repeat: 0,
            returns: boolean,
        },
        FunctionKind::And,
    ));
    registry.register(Function::special(
        xacml_fn_uri("1.0", "or"),
        Signature::Variadic {
            lead: vec![],
            repeat: boolean,
            min_repeat: 0,
            returns: boolean,
        },
        FunctionKind::Or,
    ));
    registry.register(Function::special(
        xacml_fn_uri("1.0", "n-of"),
        Signature::Variadic {
            lead: vec![integer],
            repeat: boolean,
            min_repeat: 0,
            returns: boolean,
        },
        FunctionKind::NOf,
    ));
}
