//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! PDP configuration.
//!
//! This is the semantic configuration surface; reading it from a file
//! belongs to the embedder.

use crate::context::ClockSample;
use crate::pdp::DecisionCache;
use crate::policy::policy::{Policy, PolicyLoadOptions};
use crate::policy::policyset::PolicySet;
use crate::provider::AttributeProvider;
use crate::refs::RefPolicyProvider;
use crate::request::RequestFilterId;
use crate::response::ResultFilterId;
use crate::xpath::XPathEngine;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The policy evaluation starts from.
#[derive(Clone)]
pub enum RootPolicy {
    Policy(Arc<Policy>),
    PolicySet(Arc<PolicySet>),
}

impl fmt::Debug for RootPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RootPolicy::Policy(p) => write!(f, "RootPolicy::Policy({})", p.id),
            RootPolicy::PolicySet(ps) => write!(f, "RootPolicy::PolicySet({})", ps.id),
        }
    }
}

/// Where the per-request clock sample comes from.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Sample the system clock per incoming request.
    #[default]
    System,
    /// A pinned sample: replayed decisions, deterministic tests.
    Fixed(ClockSample),
}

/// PDP assembly options.
pub struct PdpConfig {
    /// The root of evaluation; required.
    pub root_policy: Option<RootPolicy>,
    /// Source for `Policy(Set)IdReference` resolution.
    pub ref_policy_provider: Option<Arc<dyn RefPolicyProvider>>,
    /// Resolve references eagerly at assembly time.  With this off,
    /// references resolve per request through the provider.
    pub static_references: bool,
    pub max_policy_set_ref_depth: usize,
    pub max_variable_reference_depth: usize,
    /// Gate for selectors, xpathExpression values and xpath
    /// functions.
    pub enable_xpath: bool,
    /// When on, an issuer-less designator only matches issuer-less
    /// attributes.  This deviates from XACML section 5.29 and is
    /// therefore off by default.
    pub strict_attribute_issuer_match: bool,
    pub request_filter: RequestFilterId,
    pub result_filter: ResultFilterId,
    pub decision_cache: Option<Arc<dyn DecisionCache>>,
    /// Consulted in order on designator misses.
    pub attribute_providers: Vec<Arc<dyn AttributeProvider>>,
    pub xpath_engine: Option<Arc<dyn XPathEngine>>,
    /// Context-scoped deadline handed to attribute providers.
    pub request_timeout: Option<Duration>,
    pub clock: Clock,
}

impl Default for PdpConfig {
    fn default() -> Self {
        PdpConfig {
            root_policy: None,
            ref_policy_provider: None,
            static_references: true,
            max_policy_set_ref_depth: 10,
            max_variable_reference_depth: 10,
            enable_xpath: false,
            strict_attribute_issuer_match: false,
            request_filter: RequestFilterId::default(),
            result_filter: ResultFilterId::default(),
            decision_cache: None,
            attribute_providers: vec![],
            xpath_engine: None,
            request_timeout: None,
            clock: Clock::default(),
        }
    }
}

impl PdpConfig {
    /// The per-policy validation options implied by this
    /// configuration.
    #[must_use]
    pub fn load_options(&self) -> PolicyLoadOptions {
        PolicyLoadOptions {
            max_variable_reference_depth: self.max_variable_reference_depth,
            enable_xpath: self.enable_xpath,
        }
    }
}

impl fmt::Debug for PdpConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PdpConfig")
            .field("root_policy", &self.root_policy)
            .field("ref_policy_provider", &self.ref_policy_provider.is_some())
            .field("static_references", &self.static_references)
            .field("max_policy_set_ref_depth", &self.max_policy_set_ref_depth)
            .field(
                "max_variable_reference_depth",
                &self.max_variable_reference_depth,
            )
            .field("enable_xpath", &self.enable_xpath)
            .field(
                "strict_attribute_issuer_match",
                &self.strict_attribute_issuer_match,
            )
            .field("request_filter", &self.request_filter)
            .field("result_filter", &self.result_filter)
            .field("decision_cache", &self.decision_cache.is_some())
            .field("attribute_providers", &self.attribute_providers.len())
            .field("xpath_engine", &self.xpath_engine.is_some())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
