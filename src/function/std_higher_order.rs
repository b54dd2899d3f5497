//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Higher-order bag functions.
//!
//! These take a first-order function reference and iterate it over one
//! bag (`any-of`, `all-of`, `map`) or two bags (the `*-of-any` /
//! `*-of-all` combinations, outer quantifier over the first bag).  The
//! iteration itself lives with the call site in the expression layer.

use super::{Function, FunctionKind, FunctionRegistry, HigherOrderKind, Signature, xacml_fn_uri};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let table: [(&str, HigherOrderKind); 7] = [
        ("any-of", HigherOrderKind::AnyOf),
        ("all-of", HigherOrderKind::AllOf),
        ("any-of-any", HigherOrderKind::AnyOfAny),
        ("all-of-any", HigherOrderKind::AllOfAny),
        ("any-of-all", HigherOrderKind::AnyOfAll),
        ("all-of-all", HigherOrderKind::AllOfAll),
        ("map", HigherOrderKind::Map),
    ];
    for (name, kind) in table {
        registry.register(Function::special(
            xacml_fn_uri("3.0", name),
            Signature::HigherOrder,
            FunctionKind::HigherOrder(kind),
        ));
    }
}
