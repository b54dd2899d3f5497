//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Façade behavior: filters, caching, echoed attributes, identifier
//! lists, issuer matching and the per-request clock.

use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use xpdp::config::{Clock, PdpConfig, RootPolicy};
use xpdp::context::{AttributeKey, CURRENT_DATETIME_ID, CURRENT_DATE_ID, CURRENT_TIME_ID,
    ENVIRONMENT_CATEGORY, EvaluationContext};
use xpdp::errors::{EvalResult, StatusCode};
use xpdp::expr::Expression;
use xpdp::pdp::{DecisionCache, Pdp};
use xpdp::policy::Decision;
use xpdp::policy::policy::PolicyLoadOptions;
use xpdp::policy::rule::{Condition, Effect, Rule};
use xpdp::provider::{AttributeDescriptor, AttributeProvider};
use xpdp::request::{
    CategoryAttributes, DecisionRequest, RequestAttribute, RequestFilterId, categories,
};
use xpdp::response::{ResultFilterId, ResultItem};
use xpdp::value::{Bag, DataType, Value};

mod common;
use common::*;

/// Two evaluations of the same request against a pinned clock produce
/// identical responses.
#[test]
fn evaluation_is_deterministic() {
    init_logging();
    let policy = single_rule_policy(
        "urn:example:policy:det",
        subject_rule("urn:example:rule:deny", Effect::Deny, "alice"),
    );
    let pdp = pdp_for_policy(policy);
    let request = subject_request("alice").with_policy_id_list();
    let first = pdp.evaluate(&request);
    let second = pdp.evaluate(&request);
    assert_eq!(first, second);
}

/// The three PDP-issued clock attributes come from the same instant.
#[test]
fn issued_clock_attributes_cohere() {
    init_logging();
    let functions = functions();
    let and = functions
        .require("urn:oasis:names:tc:xacml:1.0:function:and")
        .unwrap();
    let date_equal = functions
        .require("urn:oasis:names:tc:xacml:1.0:function:date-equal")
        .unwrap();
    let time_equal = functions
        .require("urn:oasis:names:tc:xacml:1.0:function:time-equal")
        .unwrap();
    let datetime_equal = functions
        .require("urn:oasis:names:tc:xacml:1.0:function:dateTime-equal")
        .unwrap();

    // the pinned clock is 2024-06-30T21:59:59+02:00
    let condition = Expression::apply(
        and,
        vec![
            Expression::apply(
                date_equal,
                vec![
                    one_and_only(ENVIRONMENT_CATEGORY, CURRENT_DATE_ID, DataType::Date),
                    Expression::value(Value::parse(DataType::Date, "2024-06-30+02:00").unwrap()),
                ],
            ),
            Expression::apply(
                time_equal,
                vec![
                    one_and_only(ENVIRONMENT_CATEGORY, CURRENT_TIME_ID, DataType::Time),
                    Expression::value(Value::parse(DataType::Time, "21:59:59+02:00").unwrap()),
                ],
            ),
            Expression::apply(
                datetime_equal,
                vec![
                    one_and_only(ENVIRONMENT_CATEGORY, CURRENT_DATETIME_ID, DataType::DateTime),
                    Expression::value(
                        Value::parse(DataType::DateTime, "2024-06-30T21:59:59+02:00").unwrap(),
                    ),
                ],
            ),
        ],
    );
    let rule = Rule::new("urn:example:rule:clock", Effect::Permit)
        .with_condition(Condition::new(condition));
    let pdp = pdp_for_policy(single_rule_policy("urn:example:policy:clock", rule));
    let response = pdp.evaluate(&DecisionRequest::new());
    assert_eq!(response.results[0].decision, Decision::Permit);
}

/// Attributes flagged IncludeInResult are echoed; others are not.
#[test]
fn include_in_result_echoes_attributes() {
    init_logging();
    let policy = single_rule_policy(
        "urn:example:policy:echo",
        Rule::new("urn:example:rule:permit", Effect::Permit),
    );
    let pdp = pdp_for_policy(policy);
    let request = DecisionRequest::new().category(
        CategoryAttributes::new(categories::SUBJECT)
            .attribute(
                RequestAttribute::new(SUBJECT_ID, Value::String("alice".to_string())).echoed(),
            )
            .attribute(RequestAttribute::new(
                "urn:example:attr:silent",
                Value::String("hidden".to_string()),
            )),
    );
    let result = &pdp.evaluate(&request).results[0];
    assert_eq!(result.attributes.len(), 1);
    assert_eq!(result.attributes[0].category, categories::SUBJECT);
    assert_eq!(result.attributes[0].attributes.len(), 1);
    assert_eq!(result.attributes[0].attributes[0].id, SUBJECT_ID);
}

/// The policy identifier list is returned only when requested and
/// contains the contributing policies, outermost first.
#[test]
fn policy_identifier_list() {
    init_logging();
    let inner = single_rule_policy(
        "urn:example:policy:inner",
        Rule::new("urn:example:rule:permit", Effect::Permit),
    );
    let root = xpdp::policy::policyset::PolicySetBuilder::new(
        "urn:example:policyset:outer",
        policy_alg("first-applicable"),
    )
    .policy(inner)
    .build(&PolicyLoadOptions::default())
    .unwrap();
    let pdp = pdp_for_policy_set(root);

    let without = pdp.evaluate(&subject_request("alice"));
    assert_eq!(without.results[0].policy_ids, None);

    let with = pdp.evaluate(&subject_request("alice").with_policy_id_list());
    let ids: Vec<String> = with.results[0]
        .policy_ids
        .as_ref()
        .unwrap()
        .iter()
        .map(|p| p.id.clone())
        .collect();
    assert_eq!(
        ids,
        vec![
            "urn:example:policyset:outer".to_string(),
            "urn:example:policy:inner".to_string()
        ]
    );
}

/// With strict issuer matching off (the default), an issuer-less
/// designator sees attributes under any issuer; with it on, it does
/// not.
#[test]
fn strict_issuer_matching() {
    init_logging();
    let build_pdp = |strict: bool| {
        let policy = single_rule_policy(
            "urn:example:policy:issuer",
            subject_rule("urn:example:rule:permit", Effect::Permit, "alice"),
        );
        Pdp::new(PdpConfig {
            root_policy: Some(RootPolicy::Policy(Arc::new(policy))),
            strict_attribute_issuer_match: strict,
            clock: Clock::Fixed(fixed_clock()),
            ..Default::default()
        })
        .unwrap()
    };
    let request = DecisionRequest::new().category(
        CategoryAttributes::new(categories::SUBJECT).attribute(
            RequestAttribute::new(SUBJECT_ID, Value::String("alice".to_string()))
                .with_issuer("urn:example:issuer:hr"),
        ),
    );

    let lax = build_pdp(false).evaluate(&request);
    assert_eq!(lax.results[0].decision, Decision::Permit);

    // strict: the designator carries no issuer, so the attribute is
    // invisible and MustBePresent trips
    let strict = build_pdp(true).evaluate(&request);
    assert_eq!(strict.results[0].decision, Decision::Indeterminate);
    assert_eq!(strict.results[0].status.code, StatusCode::MissingAttribute);
}

/// A combined-decision request against a PDP without the combining
/// result filter fails fast with a syntax error.
#[test]
fn combined_decision_unsupported() {
    init_logging();
    let policy = single_rule_policy(
        "urn:example:policy:cd",
        Rule::new("urn:example:rule:permit", Effect::Permit),
    );
    let pdp = pdp_for_policy(policy);
    let response = pdp.evaluate(&subject_request("alice").combined());
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].decision, Decision::Indeterminate);
    assert_eq!(response.results[0].status.code, StatusCode::SyntaxError);
}

/// The repeated-categories filter splits into the cartesian product
/// and the combining result filter collapses agreeing decisions.
#[test]
fn multiple_decision_with_combined_result() {
    init_logging();
    let policy = single_rule_policy(
        "urn:example:policy:multi",
        Rule::new("urn:example:rule:permit", Effect::Permit),
    );
    let pdp = Pdp::new(PdpConfig {
        root_policy: Some(RootPolicy::Policy(Arc::new(policy))),
        request_filter: RequestFilterId::MultipleRepeatedCategories,
        result_filter: ResultFilterId::CombinedDecision,
        clock: Clock::Fixed(fixed_clock()),
        ..Default::default()
    })
    .unwrap();
    let request = DecisionRequest::new()
        .category(CategoryAttributes::new(categories::RESOURCE).attribute(
            RequestAttribute::new("urn:example:attr:file", Value::String("a".to_string())),
        ))
        .category(CategoryAttributes::new(categories::RESOURCE).attribute(
            RequestAttribute::new("urn:example:attr:file", Value::String("b".to_string())),
        ))
        .combined();
    let response = pdp.evaluate(&request);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].decision, Decision::Permit);
}

/// A test cache keyed by the request's debug form.
#[derive(Default)]
struct MemoryCache {
    entries: Mutex<HashMap<String, ResultItem>>,
}

impl DecisionCache for MemoryCache {
    fn get_all(
        &self,
        requests: &[xpdp::request::IndividualRequest],
    ) -> Vec<Option<ResultItem>> {
        let entries = self.entries.lock().unwrap();
        requests
            .iter()
            .map(|r| entries.get(&format!("{r:?}")).cloned())
            .collect()
    }

    fn put_all(&self, new_entries: &[(xpdp::request::IndividualRequest, ResultItem)]) {
        let mut entries = self.entries.lock().unwrap();
        for (r, item) in new_entries {
            entries.insert(format!("{r:?}"), item.clone());
        }
    }
}

/// Cache hits short-circuit evaluation; misses are written back.
#[test]
fn decision_cache_round_trip() {
    init_logging();
    let cache = Arc::new(MemoryCache::default());
    let policy = single_rule_policy(
        "urn:example:policy:cached",
        Rule::new("urn:example:rule:permit", Effect::Permit),
    );
    let pdp = Pdp::new(PdpConfig {
        root_policy: Some(RootPolicy::Policy(Arc::new(policy))),
        decision_cache: Some(cache.clone()),
        clock: Clock::Fixed(fixed_clock()),
        ..Default::default()
    })
    .unwrap();

    let request = subject_request("alice");
    let first = pdp.evaluate(&request);
    assert_eq!(first.results[0].decision, Decision::Permit);
    assert_eq!(cache.entries.lock().unwrap().len(), 1);

    // doctor the cached entry; the next evaluation must come from the
    // cache
    for item in cache.entries.lock().unwrap().values_mut() {
        item.decision = Decision::Deny;
    }
    let second = pdp.evaluate(&request);
    assert_eq!(second.results[0].decision, Decision::Deny);
}

struct DependentProvider {
    supplies: AttributeDescriptor,
    depends_on: AttributeDescriptor,
}

impl AttributeProvider for DependentProvider {
    fn name(&self) -> &str {
        "dependent"
    }
    fn supplies(&self) -> Vec<AttributeDescriptor> {
        vec![self.supplies.clone()]
    }
    fn dependencies(&self) -> Vec<AttributeDescriptor> {
        vec![self.depends_on.clone()]
    }
    fn resolve(&self, key: &AttributeKey, ctx: &mut EvaluationContext) -> EvalResult<Bag> {
        let dep_key = AttributeKey::new(
            &self.depends_on.category,
            &self.depends_on.attribute_id,
            self.depends_on.data_type,
        );
        let upstream = ctx.attribute(&dep_key)?;
        let suffixed: Vec<Value> = upstream
            .iter()
            .map(|v| Value::String(format!("{}-derived", v.print())))
            .collect();
        Ok(Bag::new(key.data_type, suffixed))
    }
}

/// A provider may ask the context for its declared dependencies,
/// which resolve through other providers.
#[test]
fn provider_dependency_chain() {
    init_logging();
    let base_attr = "urn:example:attr:base";
    let derived_attr = "urn:example:attr:derived";
    let base = Arc::new(CountingProvider::new(
        categories::SUBJECT,
        base_attr,
        "probe",
    ));
    let dependent = Arc::new(DependentProvider {
        supplies: AttributeDescriptor::new(categories::SUBJECT, derived_attr, DataType::String),
        depends_on: AttributeDescriptor::new(categories::SUBJECT, base_attr, DataType::String),
    });

    let string_equal = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:string-equal")
        .unwrap();
    let condition = Expression::apply(
        string_equal,
        vec![
            one_and_only(categories::SUBJECT, derived_attr, DataType::String),
            Expression::value(Value::String("probe-derived".to_string())),
        ],
    );
    let rule = Rule::new("urn:example:rule:derived", Effect::Permit)
        .with_condition(Condition::new(condition));
    let policy = single_rule_policy("urn:example:policy:providers", rule);

    let pdp = Pdp::new(PdpConfig {
        root_policy: Some(RootPolicy::Policy(Arc::new(policy))),
        attribute_providers: vec![base.clone(), dependent],
        clock: Clock::Fixed(fixed_clock()),
        ..Default::default()
    })
    .unwrap();
    let response = pdp.evaluate(&DecisionRequest::new());
    assert_eq!(response.results[0].decision, Decision::Permit);
    assert_eq!(base.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}
