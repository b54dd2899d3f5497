//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Shared builders for integration tests: registries, a pinned clock,
//! subject-id policies and counting providers.

#![allow(dead_code)]

use chrono::DateTime;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use xpdp::combining::{CombiningAlgorithm, CombiningRegistry};
use xpdp::config::{Clock, PdpConfig, RootPolicy};
use xpdp::context::{AttributeKey, ClockSample, EvaluationContext};
use xpdp::errors::EvalResult;
use xpdp::expr::{AttributeDesignator, Expression};
use xpdp::function::FunctionRegistry;
use xpdp::pdp::Pdp;
use xpdp::policy::policy::{Policy, PolicyBuilder, PolicyLoadOptions};
use xpdp::policy::policyset::PolicySet;
use xpdp::policy::rule::{Condition, Effect, Rule};
use xpdp::policy::target::{AllOf, AnyOf, Match, MatchSource, Target};
use xpdp::provider::{AttributeDescriptor, AttributeProvider};
use xpdp::request::{CategoryAttributes, DecisionRequest, RequestAttribute, categories};
use xpdp::value::{Bag, DataType, Value};

pub const SUBJECT_ID: &str = "urn:oasis:names:tc:xacml:1.0:subject:subject-id";
pub const ACTION_ID: &str = "urn:oasis:names:tc:xacml:1.0:action:action-id";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn functions() -> FunctionRegistry {
    FunctionRegistry::standard(false)
}

pub fn algorithms() -> CombiningRegistry {
    CombiningRegistry::standard()
}

pub fn rule_alg(name: &str) -> Arc<CombiningAlgorithm> {
    let version = if name == "first-applicable" { "1.0" } else { "3.0" };
    algorithms()
        .require(&format!(
            "urn:oasis:names:tc:xacml:{version}:rule-combining-algorithm:{name}"
        ))
        .expect("standard rule-combining algorithm")
}

pub fn policy_alg(name: &str) -> Arc<CombiningAlgorithm> {
    let version = if name == "first-applicable" || name == "only-one-applicable" {
        "1.0"
    } else {
        "3.0"
    };
    algorithms()
        .require(&format!(
            "urn:oasis:names:tc:xacml:{version}:policy-combining-algorithm:{name}"
        ))
        .expect("standard policy-combining algorithm")
}

/// A pinned clock so responses are reproducible byte for byte.
pub fn fixed_clock() -> ClockSample {
    ClockSample::at(DateTime::parse_from_rfc3339("2024-06-30T21:59:59+02:00").expect("rfc3339"))
}

pub fn fresh_context() -> EvaluationContext {
    EvaluationContext::new(fixed_clock())
}

/// A target matching `subject-id == value` with `MustBePresent`.
pub fn subject_target(value: &str) -> Target {
    let string_equal = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:string-equal")
        .expect("string-equal");
    let designator = AttributeDesignator::new(
        AttributeKey::new(categories::SUBJECT, SUBJECT_ID, DataType::String),
        true,
    );
    let m = Match::new(
        string_equal,
        Value::String(value.to_string()),
        MatchSource::Designator(designator),
    )
    .expect("valid match");
    Target::new(vec![AnyOf {
        all_ofs: vec![AllOf { matches: vec![m] }],
    }])
}

/// A rule with a subject-id target.
pub fn subject_rule(id: &str, effect: Effect, value: &str) -> Rule {
    Rule::new(id, effect).with_target(subject_target(value))
}

/// Wrap a single rule into a first-applicable policy.
pub fn single_rule_policy(id: &str, rule: Rule) -> Policy {
    PolicyBuilder::new(id, rule_alg("first-applicable"))
        .rule(rule)
        .build(&PolicyLoadOptions::default())
        .expect("valid policy")
}

pub fn pdp_for_policy(policy: Policy) -> Pdp {
    Pdp::new(PdpConfig {
        root_policy: Some(RootPolicy::Policy(Arc::new(policy))),
        clock: Clock::Fixed(fixed_clock()),
        ..Default::default()
    })
    .expect("valid pdp")
}

pub fn pdp_for_policy_set(policy_set: PolicySet) -> Pdp {
    Pdp::new(PdpConfig {
        root_policy: Some(RootPolicy::PolicySet(Arc::new(policy_set))),
        clock: Clock::Fixed(fixed_clock()),
        ..Default::default()
    })
    .expect("valid pdp")
}

/// A request carrying one subject-id string.
pub fn subject_request(value: &str) -> DecisionRequest {
    DecisionRequest::new().category(
        CategoryAttributes::new(categories::SUBJECT).attribute(RequestAttribute::new(
            SUBJECT_ID,
            Value::String(value.to_string()),
        )),
    )
}

/// `<dt>-one-and-only(designator)` as an expression.
pub fn one_and_only(category: &str, id: &str, dt: DataType) -> Expression {
    let f = functions()
        .require(&format!(
            "urn:oasis:names:tc:xacml:{}:function:{}-one-and-only",
            dt.std_version(),
            dt.short_name()
        ))
        .expect("one-and-only");
    Expression::apply(
        f,
        vec![Expression::Designator(AttributeDesignator::new(
            AttributeKey::new(category, id, dt),
            true,
        ))],
    )
}

/// Counts how often the context asks it to resolve, then supplies a
/// fixed string bag.
pub struct CountingProvider {
    pub descriptor: AttributeDescriptor,
    pub value: String,
    pub calls: Arc<AtomicUsize>,
}

impl CountingProvider {
    pub fn new(category: &str, id: &str, value: &str) -> CountingProvider {
        CountingProvider {
            descriptor: AttributeDescriptor::new(category, id, DataType::String),
            value: value.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl AttributeProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn supplies(&self) -> Vec<AttributeDescriptor> {
        vec![self.descriptor.clone()]
    }

    fn resolve(&self, key: &AttributeKey, _ctx: &mut EvaluationContext) -> EvalResult<Bag> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bag::new(
            key.data_type,
            vec![Value::String(self.value.clone())],
        ))
    }
}

/// A rule whose condition reads a provider-backed string attribute.
pub fn probing_rule(id: &str, effect: Effect, category: &str, attr_id: &str) -> Rule {
    let string_equal = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:string-equal")
        .expect("string-equal");
    let condition = Expression::apply(
        string_equal,
        vec![
            one_and_only(category, attr_id, DataType::String),
            Expression::value(Value::String("probe".to_string())),
        ],
    );
    Rule::new(id, effect).with_condition(Condition::new(condition))
}
