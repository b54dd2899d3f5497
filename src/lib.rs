//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! A policy-evaluation engine (PDP) for XACML 3.0.
//!
//! Given a decision request — categorized named attributes describing
//! a subject, resource, action and environment — the engine evaluates
//! a tree of declarative access-control policies and answers `Permit`,
//! `Deny`, `NotApplicable` or `Indeterminate`, together with a status,
//! obligations, advice and the contributing policy identifiers.
//!
//! The crate covers the evaluation core: the typed expression language
//! over XACML's datatypes and bags, the standard function set, the
//! rule/policy/policy-set evaluator with the standard combining
//! algorithms, reference resolution with cycle and depth control, and
//! the per-request evaluation context with attribute-provider
//! fall-through.  Wire parsing of XML/JSON policies and requests, the
//! configuration file format, and any concrete XPath engine are the
//! embedder's business; their contracts appear here as traits.
//!
//! Policies are built programmatically, validated and constant-folded
//! once, and are immutable afterwards; a `Pdp` can evaluate requests
//! from many threads concurrently.
//!
//! ```
//! use std::sync::Arc;
//! use xpdp::combining::CombiningRegistry;
//! use xpdp::config::{PdpConfig, RootPolicy};
//! use xpdp::pdp::Pdp;
//! use xpdp::policy::Decision;
//! use xpdp::policy::policy::PolicyBuilder;
//! use xpdp::policy::rule::{Effect, Rule};
//! use xpdp::request::{CategoryAttributes, DecisionRequest, RequestAttribute, categories};
//!
//! let algorithms = CombiningRegistry::standard();
//! let policy = PolicyBuilder::new(
//!     "urn:example:policy:allow-all",
//!     algorithms
//!         .require("urn:oasis:names:tc:xacml:1.0:rule-combining-algorithm:first-applicable")
//!         .unwrap(),
//! )
//! .rule(Rule::new("urn:example:rule:permit", Effect::Permit))
//! .build(&Default::default())
//! .unwrap();
//!
//! let pdp = Pdp::new(PdpConfig {
//!     root_policy: Some(RootPolicy::Policy(Arc::new(policy))),
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! let request = DecisionRequest::new().category(
//!     CategoryAttributes::new(categories::SUBJECT).attribute(RequestAttribute::new(
//!         "urn:oasis:names:tc:xacml:1.0:subject:subject-id",
//!         xpdp::value::Value::String("alice".to_string()),
//!     )),
//! );
//! let response = pdp.evaluate(&request);
//! assert_eq!(response.results[0].decision, Decision::Permit);
//! ```

pub mod combining;
pub mod config;
pub mod context;
pub mod errors;
pub mod expr;
pub mod function;
pub mod pdp;
pub mod policy;
pub mod provider;
pub mod refs;
pub mod request;
pub mod response;
pub mod value;
pub mod xpath;

pub use crate::config::{PdpConfig, RootPolicy};
pub use crate::errors::{ConfigError, Indeterminate, PolicyError, Status, StatusCode};
pub use crate::pdp::Pdp;
pub use crate::policy::{Decision, PolicyDecision};
pub use crate::request::DecisionRequest;
pub use crate::response::Response;
pub use crate::value::{Bag, DataType, Value};
