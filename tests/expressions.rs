//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Expression-layer behavior: static validation, constant folding and
//! short-circuit evaluation.

use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use xpdp::context::AttributeKey;
use xpdp::errors::PolicyError;
use xpdp::expr::{AttributeDesignator, EvalValue, Expression};
use xpdp::policy::policy::{PolicyBuilder, PolicyLoadOptions};
use xpdp::policy::rule::{Condition, Effect, Rule};
use xpdp::request::categories;
use xpdp::value::{DataType, Value};

mod common;
use common::*;

fn string_lit(v: &str) -> Expression {
    Expression::value(Value::String(v.to_string()))
}

#[test]
fn constant_subtree_folds_to_literal() {
    init_logging();
    let string_equal = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:string-equal")
        .unwrap();
    let expr = Expression::apply(string_equal, vec![string_lit("a"), string_lit("a")]);
    let folded = expr.fold();
    match folded {
        Expression::Literal(EvalValue::Atomic(Value::Boolean(true))) => {}
        other => panic!("expected a folded literal, got {other:?}"),
    }
}

#[test]
fn failing_constant_subtree_stays_unfolded() {
    init_logging();
    let divide = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:integer-divide")
        .unwrap();
    let expr = Expression::apply(
        divide,
        vec![
            Expression::value(Value::Integer(BigInt::from(1))),
            Expression::value(Value::Integer(BigInt::from(0))),
        ],
    );
    // division by zero is a per-request error, not a load error
    match expr.fold() {
        Expression::Apply(_) => {}
        other => panic!("expected the apply to survive, got {other:?}"),
    }
}

#[test]
fn designator_blocks_folding() {
    init_logging();
    let string_equal = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:string-equal")
        .unwrap();
    let expr = Expression::apply(
        string_equal,
        vec![
            string_lit("a"),
            Expression::apply(
                functions()
                    .require("urn:oasis:names:tc:xacml:1.0:function:string-one-and-only")
                    .unwrap(),
                vec![Expression::Designator(AttributeDesignator::new(
                    AttributeKey::new(categories::SUBJECT, SUBJECT_ID, DataType::String),
                    false,
                ))],
            ),
        ],
    );
    match expr.fold() {
        Expression::Apply(_) => {}
        other => panic!("expected the apply to survive, got {other:?}"),
    }
}

/// `or` keeps scanning past an indeterminate argument and still finds
/// a later true; `and` symmetrically finds a later false.
#[test]
fn logical_short_circuit_semantics() {
    init_logging();
    let functions = functions();
    let or = functions
        .require("urn:oasis:names:tc:xacml:1.0:function:or")
        .unwrap();
    let and = functions
        .require("urn:oasis:names:tc:xacml:1.0:function:and")
        .unwrap();
    // a required designator with nothing seeded: evaluates
    // indeterminate
    let broken = Expression::apply(
        functions
            .require("urn:oasis:names:tc:xacml:1.0:function:boolean-one-and-only")
            .unwrap(),
        vec![Expression::Designator(AttributeDesignator::new(
            AttributeKey::new(categories::SUBJECT, "urn:example:attr:broken", DataType::Boolean),
            true,
        ))],
    );

    let mut ctx = fresh_context();
    let dominated_or = Expression::apply(
        or.clone(),
        vec![broken.clone(), Expression::value(Value::Boolean(true))],
    );
    assert_eq!(
        dominated_or.evaluate(&mut ctx).unwrap(),
        EvalValue::Atomic(Value::Boolean(true))
    );

    let dominated_and = Expression::apply(
        and,
        vec![broken.clone(), Expression::value(Value::Boolean(false))],
    );
    assert_eq!(
        dominated_and.evaluate(&mut ctx).unwrap(),
        EvalValue::Atomic(Value::Boolean(false))
    );

    // no dominating value: the error surfaces
    let undominated = Expression::apply(
        or,
        vec![broken, Expression::value(Value::Boolean(false))],
    );
    assert!(undominated.evaluate(&mut ctx).is_err());
}

#[test]
fn n_of_counts_lazily() {
    init_logging();
    let n_of = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:n-of")
        .unwrap();
    let mut ctx = fresh_context();
    let expr = Expression::apply(
        n_of,
        vec![
            Expression::value(Value::Integer(BigInt::from(2))),
            Expression::value(Value::Boolean(true)),
            Expression::value(Value::Boolean(false)),
            Expression::value(Value::Boolean(true)),
        ],
    );
    assert_eq!(
        expr.evaluate(&mut ctx).unwrap(),
        EvalValue::Atomic(Value::Boolean(true))
    );
}

#[test]
fn forward_variable_reference_rejected() {
    init_logging();
    let err = PolicyBuilder::new("urn:example:policy:fwd", rule_alg("first-applicable"))
        .variable("first", Expression::VariableRef("second".to_string()))
        .variable("second", Expression::value(Value::Boolean(true)))
        .rule(Rule::new("urn:example:rule:r", Effect::Permit))
        .build(&PolicyLoadOptions::default())
        .unwrap_err();
    assert!(matches!(err, PolicyError::UndefinedVariable(_)));
}

#[test]
fn variable_chain_depth_bounded() {
    init_logging();
    let not = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:not")
        .unwrap();
    let mut builder = PolicyBuilder::new("urn:example:policy:deep", rule_alg("first-applicable"))
        .variable("v0", Expression::value(Value::Boolean(true)));
    for i in 1..=4 {
        builder = builder.variable(
            &format!("v{i}"),
            Expression::apply(
                not.clone(),
                vec![Expression::VariableRef(format!("v{}", i - 1))],
            ),
        );
    }
    let builder = builder.rule(
        Rule::new("urn:example:rule:r", Effect::Permit)
            .with_condition(Condition::new(Expression::VariableRef("v4".to_string()))),
    );
    let opts = PolicyLoadOptions {
        max_variable_reference_depth: 3,
        ..Default::default()
    };
    let err = builder.build(&opts).unwrap_err();
    assert!(matches!(err, PolicyError::VariableDepthExceeded(3)));
}

#[test]
fn non_boolean_condition_rejected() {
    init_logging();
    let err = PolicyBuilder::new("urn:example:policy:badcond", rule_alg("first-applicable"))
        .rule(
            Rule::new("urn:example:rule:r", Effect::Permit)
                .with_condition(Condition::new(string_lit("not a boolean"))),
        )
        .build(&PolicyLoadOptions::default())
        .unwrap_err();
    assert_eq!(err, PolicyError::ConditionNotBoolean);
}

#[test]
fn bag_valued_condition_rejected() {
    init_logging();
    let err = PolicyBuilder::new("urn:example:policy:bagcond", rule_alg("first-applicable"))
        .rule(
            Rule::new("urn:example:rule:r", Effect::Permit).with_condition(Condition::new(
                Expression::Designator(AttributeDesignator::new(
                    AttributeKey::new(
                        categories::SUBJECT,
                        "urn:example:attr:flags",
                        DataType::Boolean,
                    ),
                    false,
                )),
            )),
        )
        .build(&PolicyLoadOptions::default())
        .unwrap_err();
    assert_eq!(err, PolicyError::ConditionNotBoolean);
}

#[test]
fn arity_mismatch_rejected() {
    init_logging();
    let string_equal = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:string-equal")
        .unwrap();
    let err = PolicyBuilder::new("urn:example:policy:arity", rule_alg("first-applicable"))
        .rule(
            Rule::new("urn:example:rule:r", Effect::Permit).with_condition(Condition::new(
                Expression::apply(string_equal, vec![string_lit("only one")]),
            )),
        )
        .build(&PolicyLoadOptions::default())
        .unwrap_err();
    assert!(matches!(err, PolicyError::ArityMismatch(_, 2, 1)));
}
