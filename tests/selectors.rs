//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Attribute selectors against an injected XPath engine, and the
//! XPath gate.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use xpdp::config::{Clock, PdpConfig, RootPolicy};
use xpdp::errors::{EvalResult, Indeterminate, PolicyError, StatusCode};
use xpdp::expr::AttributeSelector;
use xpdp::pdp::Pdp;
use xpdp::policy::Decision;
use xpdp::policy::policy::{PolicyBuilder, PolicyLoadOptions};
use xpdp::policy::rule::{Effect, Rule};
use xpdp::policy::target::{AllOf, AnyOf, Match, MatchSource, Target};
use xpdp::request::{CategoryAttributes, DecisionRequest, categories};
use xpdp::value::{DataType, Value};
use xpdp::xpath::{CompiledXPath, XPathEngine, XmlContent};

mod common;
use common::*;

/// Content is a map from path to node values; "compilation" just
/// remembers the path.
struct MapEngine;

struct MapCompiled {
    path: String,
}

type MapContent = Vec<(String, Vec<String>)>;

impl CompiledXPath for MapCompiled {
    fn select_values(&self, content: &XmlContent) -> EvalResult<Vec<String>> {
        let map = content
            .as_ref()
            .downcast_ref::<MapContent>()
            .ok_or_else(|| Indeterminate::processing("unexpected content representation"))?;
        Ok(map
            .iter()
            .filter(|(p, _)| *p == self.path)
            .flat_map(|(_, values)| values.iter().cloned())
            .collect())
    }

    fn select_nodes(&self, content: &XmlContent) -> EvalResult<Vec<XmlContent>> {
        Ok(vec![content.clone()])
    }
}

impl XPathEngine for MapEngine {
    fn compile(
        &self,
        path: &str,
        _namespaces: &[(String, String)],
    ) -> EvalResult<Arc<dyn CompiledXPath>> {
        if path.starts_with('/') {
            Ok(Arc::new(MapCompiled {
                path: path.to_string(),
            }))
        } else {
            Err(Indeterminate::syntax(format!("not a path: {path}")))
        }
    }
}

fn record_selector(path: &str, must_be_present: bool) -> AttributeSelector {
    AttributeSelector {
        category: categories::RESOURCE.to_string(),
        path: path.to_string(),
        namespaces: vec![],
        context_selector_id: None,
        data_type: DataType::String,
        must_be_present,
    }
}

fn selector_policy(path: &str, must_be_present: bool) -> xpdp::policy::policy::Policy {
    let string_equal = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:string-equal")
        .unwrap();
    let m = Match::new(
        string_equal,
        Value::String("confidential".to_string()),
        MatchSource::Selector(record_selector(path, must_be_present)),
    )
    .unwrap();
    let target = Target::new(vec![AnyOf {
        all_ofs: vec![AllOf { matches: vec![m] }],
    }]);
    PolicyBuilder::new("urn:example:policy:selector", rule_alg("first-applicable"))
        .rule(Rule::new("urn:example:rule:deny", Effect::Deny).with_target(target))
        .build(&PolicyLoadOptions {
            enable_xpath: true,
            ..Default::default()
        })
        .unwrap()
}

fn selector_pdp(policy: xpdp::policy::policy::Policy) -> Pdp {
    Pdp::new(PdpConfig {
        root_policy: Some(RootPolicy::Policy(Arc::new(policy))),
        enable_xpath: true,
        xpath_engine: Some(Arc::new(MapEngine)),
        clock: Clock::Fixed(fixed_clock()),
        ..Default::default()
    })
    .unwrap()
}

fn classified_request() -> DecisionRequest {
    let map: MapContent = vec![(
        "/record/classification".to_string(),
        vec!["confidential".to_string()],
    )];
    let content: XmlContent = Arc::new(map);
    DecisionRequest::new()
        .category(CategoryAttributes::new(categories::RESOURCE).content(content))
}

#[test]
fn selector_extracts_and_matches() {
    init_logging();
    let pdp = selector_pdp(selector_policy("/record/classification", false));
    let response = pdp.evaluate(&classified_request());
    assert_eq!(response.results[0].decision, Decision::Deny);
}

#[test]
fn selector_no_match_on_other_path() {
    init_logging();
    let pdp = selector_pdp(selector_policy("/record/owner", false));
    let response = pdp.evaluate(&classified_request());
    assert_eq!(response.results[0].decision, Decision::NotApplicable);
}

#[test]
fn required_selector_missing_is_indeterminate() {
    init_logging();
    let pdp = selector_pdp(selector_policy("/record/owner", true));
    let response = pdp.evaluate(&classified_request());
    let result = &response.results[0];
    assert_eq!(result.decision, Decision::Indeterminate);
    assert_eq!(result.status.code, StatusCode::MissingAttribute);
}

/// With XPath disabled, a policy using a selector does not load.
#[test]
fn selector_rejected_when_xpath_disabled() {
    init_logging();
    let string_equal = functions()
        .require("urn:oasis:names:tc:xacml:1.0:function:string-equal")
        .unwrap();
    let m = Match::new(
        string_equal,
        Value::String("confidential".to_string()),
        MatchSource::Selector(record_selector("/record/classification", false)),
    )
    .unwrap();
    let target = Target::new(vec![AnyOf {
        all_ofs: vec![AllOf { matches: vec![m] }],
    }]);
    let err = PolicyBuilder::new("urn:example:policy:gated", rule_alg("first-applicable"))
        .rule(Rule::new("urn:example:rule:deny", Effect::Deny).with_target(target))
        .build(&PolicyLoadOptions::default())
        .unwrap_err();
    assert_eq!(err, PolicyError::XPathDisabled);
}

/// The absent node-comparison functions are unknown to the registry
/// even with XPath enabled.
#[test]
fn absent_xpath_functions_fail_lookup() {
    let registry = xpdp::function::FunctionRegistry::standard(true);
    for name in ["xpath-node-equal", "xpath-node-match", "access-permitted"] {
        let uri = format!("urn:oasis:names:tc:xacml:3.0:function:{name}");
        assert!(matches!(
            registry.require(&uri),
            Err(PolicyError::UnknownFunction(_))
        ));
    }
}
