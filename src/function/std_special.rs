//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Name-matching functions and the XPath node counter.
//!
//! `xpath-node-equal`, `xpath-node-match` and `access-permitted` are
//! deliberately not registered; a policy naming them fails function
//! lookup at load.

use super::{
    Function, FunctionRegistry, ParamSpec, boolean_result, internal_type_error, want_atomic,
    want_string, xacml_fn_uri,
};
use crate::expr::EvalValue;
use crate::value::{DataType, Value};
use num_bigint::BigInt;

pub(crate) fn register(registry: &mut FunctionRegistry, enable_xpath: bool) {
    let boolean = ParamSpec::atomic(DataType::Boolean);
    let string = ParamSpec::atomic(DataType::String);
    let integer = ParamSpec::atomic(DataType::Integer);

    registry.register(Function::eager(
        xacml_fn_uri("1.0", "rfc822Name-match"),
        vec![string, ParamSpec::atomic(DataType::Rfc822Name)],
        boolean,
        Box::new(|_ctx, args| {
            let pattern = want_string(args, 0)?;
            match want_atomic(args, 1)? {
                Value::Rfc822Name(n) => boolean_result(n.matches(pattern)),
                _ => Err(internal_type_error()),
            }
        }),
    ));

    registry.register(Function::eager(
        xacml_fn_uri("1.0", "x500Name-match"),
        vec![
            ParamSpec::atomic(DataType::X500Name),
            ParamSpec::atomic(DataType::X500Name),
        ],
        boolean,
        Box::new(|_ctx, args| {
            match (want_atomic(args, 0)?, want_atomic(args, 1)?) {
                (Value::X500Name(a), Value::X500Name(b)) => {
                    boolean_result(a.is_terminal_part_of(b))
                }
                _ => Err(internal_type_error()),
            }
        }),
    ));

    if enable_xpath {
        registry.register(
            Function::eager(
                xacml_fn_uri("3.0", "xpath-node-count"),
                vec![ParamSpec::atomic(DataType::XPathExpression)],
                integer,
                Box::new(|ctx, args| {
                    let Value::XPathExpression(xp) = want_atomic(args, 0)? else {
                        return Err(internal_type_error());
                    };
                    let count = match ctx.content(&xp.category) {
                        None => 0usize,
                        Some(content) => {
                            let compiled = ctx.compile_xpath(&xp.path, &xp.namespaces)?;
                            compiled.select_nodes(&content)?.len()
                        }
                    };
                    Ok(EvalValue::Atomic(Value::Integer(BigInt::from(count))))
                }),
            )
            .context_dependent(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::super::FunctionRegistry;
    use crate::context::{ClockSample, EvaluationContext};
    use crate::expr::EvalValue;
    use crate::value::Value;
    use crate::value::names::{Rfc822Name, X500Name};
    use chrono::DateTime;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(ClockSample::at(DateTime::UNIX_EPOCH.fixed_offset()))
    }

    #[test]
    fn test_rfc822_match_domain() {
        let r = FunctionRegistry::standard(false);
        let f = r
            .get("urn:oasis:names:tc:xacml:1.0:function:rfc822Name-match")
            .unwrap();
        let mut c = ctx();
        let name = EvalValue::Atomic(Value::Rfc822Name(
            Rfc822Name::parse("bart@simpsons.example.com").unwrap(),
        ));
        let pattern = EvalValue::Atomic(Value::String("Simpsons.Example.COM".to_string()));
        let out = f.invoke(&mut c, &[pattern, name]).unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(true)));
    }

    #[test]
    fn test_x500_match_terminal() {
        let r = FunctionRegistry::standard(false);
        let f = r
            .get("urn:oasis:names:tc:xacml:1.0:function:x500Name-match")
            .unwrap();
        let mut c = ctx();
        let tail = EvalValue::Atomic(Value::X500Name(
            X500Name::parse("O=Medico Corp, C=US").unwrap(),
        ));
        let full = EvalValue::Atomic(Value::X500Name(
            X500Name::parse("CN=John Smith, O=Medico Corp, C=US").unwrap(),
        ));
        let out = f.invoke(&mut c, &[tail, full]).unwrap();
        assert_eq!(out, EvalValue::Atomic(Value::Boolean(true)));
    }
}
