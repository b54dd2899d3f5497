//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The PDP façade: per-request orchestration.
//!
//! filter → (cache) → evaluate → result-filter.  Each incoming
//! request takes exactly one clock sample, shared by every individual
//! decision it splits into, so the three PDP-issued time attributes
//! are internally consistent.

use crate::config::{Clock, PdpConfig, RootPolicy};
use crate::context::{ClockSample, EvaluationContext};
use crate::errors::{ConfigError, Status, StatusCode};
use crate::policy::{Decision, PolicyDecision};
use crate::provider::{AttributeProvider, check_dependency_cycles};
use crate::refs::{RefPolicyProvider, link_static};
use crate::request::{DecisionRequest, IndividualRequest, RequestFilterId, filter_request};
use crate::response::{ResultFilterId, ResultItem, Response, EchoedCategory, apply_result_filter};
use crate::context::AttributeKey;
use crate::xpath::{XPathCache, XPathEngine};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// External decision cache.
///
/// The engine never interprets cache semantics beyond "same request
/// key may return the same result"; eviction and keying belong to the
/// implementation.
pub trait DecisionCache: Send + Sync {
    /// One slot per request, `None` on miss.  Misses fall through to
    /// evaluation.
    fn get_all(&self, requests: &[IndividualRequest]) -> Vec<Option<ResultItem>>;

    /// Store freshly computed results.
    fn put_all(&self, entries: &[(IndividualRequest, ResultItem)]);
}

/// The Policy Decision Point.
///
/// Stateless across requests; safe to share and call from multiple
/// threads.
pub struct Pdp {
    root: RootPolicy,
    providers: Arc<[Arc<dyn AttributeProvider>]>,
    ref_provider: Option<Arc<dyn RefPolicyProvider>>,
    strict_issuer: bool,
    max_ref_depth: usize,
    request_filter: RequestFilterId,
    result_filter: ResultFilterId,
    cache: Option<Arc<dyn DecisionCache>>,
    xpath_engine: Option<Arc<dyn XPathEngine>>,
    xpath_cache: Arc<XPathCache>,
    request_timeout: Option<Duration>,
    clock: Clock,
}

impl std::fmt::Debug for Pdp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pdp")
            .field("strict_issuer", &self.strict_issuer)
            .field("max_ref_depth", &self.max_ref_depth)
            .field("request_filter", &self.request_filter)
            .field("result_filter", &self.result_filter)
            .field("request_timeout", &self.request_timeout)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Pdp {
    /// Assemble a PDP from its configuration.
    ///
    /// Rejects provider dependency cycles and, in static reference
    /// mode, resolves every reachable policy reference eagerly so
    /// cycles and depth violations surface here instead of per
    /// request.
    ///
    /// # Errors
    ///
    /// `ConfigError` describing the failed check.
    pub fn new(config: PdpConfig) -> Result<Pdp, ConfigError> {
        let root = config.root_policy.ok_or(ConfigError::MissingRootPolicy)?;
        check_dependency_cycles(&config.attribute_providers)?;
        let root = match (&root, config.static_references, &config.ref_policy_provider) {
            (RootPolicy::PolicySet(ps), true, Some(provider)) => {
                let linked =
                    link_static(ps, provider.as_ref(), config.max_policy_set_ref_depth)?;
                RootPolicy::PolicySet(linked)
            }
            _ => root,
        };
        info!("assembled PDP with root {root:?}");
        Ok(Pdp {
            root,
            providers: Arc::from(config.attribute_providers),
            // in static mode every reference is already linked away
            ref_provider: if config.static_references {
                None
            } else {
                config.ref_policy_provider
            },
            strict_issuer: config.strict_attribute_issuer_match,
            max_ref_depth: config.max_policy_set_ref_depth,
            request_filter: config.request_filter,
            result_filter: config.result_filter,
            cache: config.decision_cache,
            xpath_engine: config.xpath_engine,
            xpath_cache: Arc::new(XPathCache::new()),
            request_timeout: config.request_timeout,
            clock: config.clock,
        })
    }

    /// Evaluate one decision request.
    #[must_use]
    pub fn evaluate(&self, request: &DecisionRequest) -> Response {
        let request_id = Uuid::now_v7();
        info!(
            "[{request_id}] evaluating request with {} categories",
            request.categories.len()
        );

        if request.combined_decision && self.result_filter != ResultFilterId::CombinedDecision {
            warn!("[{request_id}] combined decision requested but not supported");
            return Response::single(ResultItem::indeterminate(Status {
                code: StatusCode::SyntaxError,
                message: Some("combined decision is not supported by this PDP".to_string()),
                missing: vec![],
            }));
        }

        let individuals = match filter_request(self.request_filter, request) {
            Ok(i) => i,
            Err(e) => {
                warn!("[{request_id}] request filter rejected the request: {e}");
                return Response::single(ResultItem::indeterminate(e.status));
            }
        };
        debug!(
            "[{request_id}] split into {} individual decision request(s)",
            individuals.len()
        );

        // one clock sample for the whole request
        let clock = match &self.clock {
            Clock::System => ClockSample::now(),
            Clock::Fixed(sample) => sample.clone(),
        };

        let mut cached = match &self.cache {
            Some(cache) => cache.get_all(&individuals),
            None => vec![],
        };
        cached.resize_with(individuals.len(), || None);

        let mut results = Vec::with_capacity(individuals.len());
        let mut fresh = vec![];
        for (individual, hit) in individuals.iter().zip(cached) {
            match hit {
                Some(result) => {
                    debug!("[{request_id}] decision cache hit");
                    results.push(result);
                }
                None => {
                    let result = self.evaluate_individual(request_id, individual, &clock);
                    if self.cache.is_some() {
                        fresh.push((individual.clone(), result.clone()));
                    }
                    results.push(result);
                }
            }
        }
        if let Some(cache) = &self.cache {
            if !fresh.is_empty() {
                cache.put_all(&fresh);
            }
        }

        let results =
            apply_result_filter(self.result_filter, request.combined_decision, results);
        Response { results }
    }

    fn evaluate_individual(
        &self,
        request_id: Uuid,
        individual: &IndividualRequest,
        clock: &ClockSample,
    ) -> ResultItem {
        let mut ctx = EvaluationContext::new(clock.clone());
        ctx.set_request_id(request_id);
        ctx.set_providers(self.providers.clone());
        ctx.set_strict_issuer(self.strict_issuer);
        ctx.set_ref_provider(self.ref_provider.clone());
        ctx.set_max_ref_depth(self.max_ref_depth);
        ctx.set_xpath(self.xpath_engine.clone(), self.xpath_cache.clone());
        ctx.set_deadline(self.request_timeout.map(|t| Instant::now() + t));

        for category in &individual.categories {
            if let Some(content) = &category.content {
                if ctx.content(&category.category).is_none() {
                    ctx.seed_content(&category.category, content.clone());
                }
            }
            for attribute in &category.attributes {
                let mut key = AttributeKey::new(
                    &category.category,
                    &attribute.id,
                    attribute.data_type,
                );
                if let Some(issuer) = &attribute.issuer {
                    key = key.with_issuer(issuer);
                }
                ctx.seed_attribute(key, attribute.values.clone());
            }
        }
        ctx.seed_current_time();

        let decision = match &self.root {
            RootPolicy::Policy(p) => p.evaluate(&mut ctx),
            RootPolicy::PolicySet(ps) => ps.evaluate(&mut ctx),
        };
        debug!("[{request_id}] individual decision: {decision}");
        self.build_result(individual, &ctx, decision)
    }

    fn build_result(
        &self,
        individual: &IndividualRequest,
        ctx: &EvaluationContext,
        decision: PolicyDecision,
    ) -> ResultItem {
        let status = if decision.decision == Decision::Indeterminate {
            let mut status = decision.status;
            for detail in ctx.missing_attributes() {
                if !status.missing.contains(detail) {
                    status.missing.push(detail.clone());
                }
            }
            status
        } else {
            Status::ok()
        };
        let mut attributes = vec![];
        for category in &individual.categories {
            let echoed: Vec<_> = category
                .attributes
                .iter()
                .filter(|a| a.include_in_result)
                .cloned()
                .collect();
            if !echoed.is_empty() {
                attributes.push(EchoedCategory {
                    category: category.category.clone(),
                    attributes: echoed,
                });
            }
        }
        ResultItem {
            decision: decision.decision,
            status,
            obligations: decision.obligations,
            advice: decision.advice,
            attributes,
            policy_ids: individual
                .return_policy_id_list
                .then_some(decision.applicable_policies),
        }
    }
}
