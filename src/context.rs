//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Per-request evaluation state.
//!
//! An `EvaluationContext` lives for one individual decision request.
//! It holds the request's attributes and content, memoizes variable
//! definitions, accumulates missing-attribute details, and carries the
//! single clock sample every time-derived attribute in the request
//! observes.  Unresolved designators fall through to the registered
//! attribute providers.

use crate::errors::{EvalResult, Indeterminate, MissingAttributeDetail};
use crate::expr::{EvalValue, Expression, VarScope};
use crate::provider::AttributeProvider;
use crate::refs::RefPolicyProvider;
use crate::value::temporal::{XDate, XDateTime, XTime};
use crate::value::{Bag, DataType, Value};
use crate::xpath::{CompiledXPath, XPathCache, XPathEngine, XmlContent, xpath_unavailable};
use chrono::{DateTime, FixedOffset, Local};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// The standard environment attribute category.
pub const ENVIRONMENT_CATEGORY: &str =
    "urn:oasis:names:tc:xacml:3.0:attribute-category:environment";
/// PDP-issued clock attribute identifiers.
pub const CURRENT_DATETIME_ID: &str =
    "urn:oasis:names:tc:xacml:1.0:environment:current-dateTime";
pub const CURRENT_DATE_ID: &str = "urn:oasis:names:tc:xacml:1.0:environment:current-date";
pub const CURRENT_TIME_ID: &str = "urn:oasis:names:tc:xacml:1.0:environment:current-time";

/// The full identity of a named attribute.
///
/// Issuer absence is a distinct value, not a wildcard; wildcard issuer
/// matching is the lookup's concern (see `strict_issuer`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeKey {
    pub category: String,
    pub attribute_id: String,
    pub data_type: DataType,
    pub issuer: Option<String>,
}

impl AttributeKey {
    #[must_use]
    pub fn new(category: &str, attribute_id: &str, data_type: DataType) -> AttributeKey {
        AttributeKey {
            category: category.to_string(),
            attribute_id: attribute_id.to_string(),
            data_type,
            issuer: None,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> AttributeKey {
        self.issuer = Some(issuer.to_string());
        self
    }

    #[must_use]
    pub fn missing_detail(&self) -> MissingAttributeDetail {
        MissingAttributeDetail {
            category: self.category.clone(),
            attribute_id: self.attribute_id.clone(),
            data_type: self.data_type,
            issuer: self.issuer.clone(),
        }
    }
}

impl fmt::Display for AttributeKey {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{} ({})",
            self.category, self.attribute_id, self.data_type
        )?;
        if let Some(i) = &self.issuer {
            write!(f, " issuer={i}")?;
        }
        Ok(())
    }
}

/// One wall-clock sample, pre-split into the three datatypes the
/// standard environment attributes use.  All three always come from
/// the same instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSample {
    pub date_time: XDateTime,
    pub date: XDate,
    pub time: XTime,
}

impl ClockSample {
    /// Sample the system clock in the local timezone.
    #[must_use]
    pub fn now() -> ClockSample {
        ClockSample::at(Local::now().fixed_offset())
    }

    /// Build a sample from a fixed instant (pinned clocks in tests,
    /// replayed decisions).
    #[must_use]
    pub fn at(instant: DateTime<FixedOffset>) -> ClockSample {
        let offset = Some(*instant.offset());
        ClockSample {
            date_time: XDateTime::new(instant.naive_local(), offset),
            date: XDate::new(instant.date_naive(), offset),
            time: XTime::new(instant.time(), offset),
        }
    }
}

/// Per-request, logically single-threaded evaluation state.
pub struct EvaluationContext {
    request_id: Uuid,
    attributes: BTreeMap<AttributeKey, Bag>,
    content: HashMap<String, XmlContent>,
    providers: Arc<[Arc<dyn AttributeProvider>]>,
    resolving: HashSet<AttributeKey>,
    provider_misses: HashSet<AttributeKey>,
    strict_issuer: bool,
    var_scopes: Vec<Arc<VarScope>>,
    var_memo: HashMap<(String, String), EvalResult<EvalValue>>,
    missing: Vec<MissingAttributeDetail>,
    clock: ClockSample,
    deadline: Option<Instant>,
    ref_provider: Option<Arc<dyn RefPolicyProvider>>,
    ref_chain: Vec<String>,
    max_ref_depth: usize,
    xpath_engine: Option<Arc<dyn XPathEngine>>,
    xpath_cache: Arc<XPathCache>,
}

impl EvaluationContext {
    /// Create a fresh context around one clock sample.
    #[must_use]
    pub fn new(clock: ClockSample) -> EvaluationContext {
        EvaluationContext {
            request_id: Uuid::now_v7(),
            attributes: BTreeMap::new(),
            content: HashMap::new(),
            providers: Arc::from(vec![]),
            resolving: HashSet::new(),
            provider_misses: HashSet::new(),
            strict_issuer: false,
            var_scopes: vec![],
            var_memo: HashMap::new(),
            missing: vec![],
            clock,
            deadline: None,
            ref_provider: None,
            ref_chain: vec![],
            max_ref_depth: 10,
            xpath_engine: None,
            xpath_cache: Arc::new(XPathCache::new()),
        }
    }

    /// Identifier used to correlate this request's log lines.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn set_request_id(&mut self, id: Uuid) {
        self.request_id = id;
    }

    pub fn set_providers(&mut self, providers: Arc<[Arc<dyn AttributeProvider>]>) {
        self.providers = providers;
    }

    pub fn set_strict_issuer(&mut self, strict: bool) {
        self.strict_issuer = strict;
    }

    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    pub fn set_ref_provider(&mut self, provider: Option<Arc<dyn RefPolicyProvider>>) {
        self.ref_provider = provider;
    }

    pub fn set_max_ref_depth(&mut self, depth: usize) {
        self.max_ref_depth = depth;
    }

    pub fn set_xpath(&mut self, engine: Option<Arc<dyn XPathEngine>>, cache: Arc<XPathCache>) {
        self.xpath_engine = engine;
        self.xpath_cache = cache;
    }

    /// Merge attribute values into the request store.
    pub fn seed_attribute(&mut self, key: AttributeKey, values: Vec<Value>) {
        let bag = Bag::new(key.data_type, values);
        match self.attributes.get_mut(&key) {
            Some(existing) => existing.absorb(&bag),
            None => {
                self.attributes.insert(key, bag);
            }
        }
    }

    /// Attach XML content to a category.
    pub fn seed_content(&mut self, category: &str, content: XmlContent) {
        self.content.insert(category.to_string(), content);
    }

    /// Seed the PDP-issued clock attributes for any of the three ids
    /// the request did not supply itself.
    pub fn seed_current_time(&mut self) {
        let entries: [(&str, DataType, Value); 3] = [
            (
                CURRENT_DATETIME_ID,
                DataType::DateTime,
                Value::DateTime(self.clock.date_time.clone()),
            ),
            (
                CURRENT_DATE_ID,
                DataType::Date,
                Value::Date(self.clock.date.clone()),
            ),
            (
                CURRENT_TIME_ID,
                DataType::Time,
                Value::Time(self.clock.time.clone()),
            ),
        ];
        for (id, dt, value) in entries {
            let key = AttributeKey::new(ENVIRONMENT_CATEGORY, id, dt);
            if !self.attributes.contains_key(&key) {
                self.attributes.insert(key, Bag::singleton(value));
            }
        }
    }

    #[must_use]
    pub fn clock(&self) -> &ClockSample {
        &self.clock
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Look up an attribute bag.
    ///
    /// Resolution order: the request store, then providers in
    /// registration order, then an empty bag.  With strict issuer
    /// matching off (the XACML default), an issuer-less key matches
    /// request attributes under any issuer.
    ///
    /// # Errors
    ///
    /// Propagates a provider's `Indeterminate`.
    pub fn attribute(&mut self, key: &AttributeKey) -> EvalResult<Bag> {
        let stored = self.stored_bag(key);
        if let Some(bag) = stored {
            if !bag.is_empty() {
                return Ok(bag);
            }
        }
        // fall through to providers, unless this key already missed
        // in this request
        if self.provider_misses.contains(key) {
            return Ok(Bag::empty(key.data_type));
        }
        if self.resolving.contains(key) {
            warn!(
                "[{}] circular attribute resolution on {key}",
                self.request_id
            );
            return Err(Indeterminate::processing(format!(
                "circular attribute resolution on {key}"
            )));
        }
        self.resolving.insert(key.clone());
        let providers = self.providers.clone();
        let mut outcome: EvalResult<Bag> = Ok(Bag::empty(key.data_type));
        for provider in providers.iter() {
            if !provider.supplies().iter().any(|d| d.covers(key)) {
                continue;
            }
            debug!(
                "[{}] consulting provider {} for {key}",
                self.request_id,
                provider.name()
            );
            match provider.resolve(key, self) {
                Ok(bag) if bag.is_empty() => {}
                Ok(bag) => {
                    outcome = Ok(bag);
                    break;
                }
                Err(e) => {
                    warn!(
                        "[{}] provider {} failed on {key}: {e}",
                        self.request_id,
                        provider.name()
                    );
                    outcome = Err(e);
                    break;
                }
            }
        }
        self.resolving.remove(key);
        if let Ok(bag) = &outcome {
            // cache the result so later designators observe the same
            // answer; misses are remembered separately
            if bag.is_empty() {
                self.provider_misses.insert(key.clone());
            } else {
                self.attributes.insert(key.clone(), bag.clone());
            }
        }
        outcome
    }

    /// Resolve a designator, enforcing `MustBePresent`.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` when the bag is empty and the attribute is
    /// required; provider errors otherwise.
    pub fn designate(&mut self, key: &AttributeKey, must_be_present: bool) -> EvalResult<Bag> {
        let bag = self.attribute(key)?;
        if bag.is_empty() && must_be_present {
            let detail = key.missing_detail();
            self.missing.push(detail.clone());
            debug!("[{}] required attribute missing: {key}", self.request_id);
            return Err(Indeterminate::missing_attribute(detail));
        }
        Ok(bag)
    }

    fn stored_bag(&self, key: &AttributeKey) -> Option<Bag> {
        if self.strict_issuer || key.issuer.is_some() {
            return self.attributes.get(key).cloned();
        }
        // lax mode: merge every issuer's bag for this name, in key
        // order so the result is deterministic
        let mut merged: Option<Bag> = None;
        for (k, bag) in &self.attributes {
            if k.category == key.category
                && k.attribute_id == key.attribute_id
                && k.data_type == key.data_type
            {
                match merged.as_mut() {
                    Some(m) => m.absorb(bag),
                    None => merged = Some(bag.clone()),
                }
            }
        }
        merged
    }

    /// XML content attached to a category, if any.
    #[must_use]
    pub fn content(&self, category: &str) -> Option<XmlContent> {
        self.content.get(category).cloned()
    }

    /// Compile an XPath through the shared cache.
    ///
    /// # Errors
    ///
    /// `ProcessingError` when no engine is configured; the engine's
    /// `SyntaxError` when compilation fails.
    pub fn compile_xpath(
        &self,
        path: &str,
        namespaces: &[(String, String)],
    ) -> EvalResult<Arc<dyn CompiledXPath>> {
        match &self.xpath_engine {
            Some(engine) => self.xpath_cache.compile(engine.as_ref(), path, namespaces),
            None => Err(xpath_unavailable()),
        }
    }

    /// Enter a policy's variable scope.
    pub fn push_variable_scope(&mut self, scope: Arc<VarScope>) {
        self.var_scopes.push(scope);
    }

    /// Leave the innermost variable scope.
    pub fn pop_variable_scope(&mut self) {
        self.var_scopes.pop();
    }

    /// Find a variable definition, innermost scope first.
    #[must_use]
    pub fn find_variable(&self, id: &str) -> Option<(String, Arc<Expression>)> {
        for scope in self.var_scopes.iter().rev() {
            if let Some(def) = scope.defs.iter().find(|d| d.id == id) {
                return Some((scope.scope_id.clone(), def.expression.clone()));
            }
        }
        None
    }

    /// A memoized variable result from earlier in this request.
    #[must_use]
    pub fn variable_memo(&self, scope_id: &str, id: &str) -> Option<EvalResult<EvalValue>> {
        self.var_memo
            .get(&(scope_id.to_string(), id.to_string()))
            .cloned()
    }

    /// Record a variable result, including an `Indeterminate` one.
    pub fn memoize_variable(
        &mut self,
        scope_id: &str,
        id: &str,
        result: EvalResult<EvalValue>,
    ) {
        self.var_memo
            .insert((scope_id.to_string(), id.to_string()), result);
    }

    /// Follow a policy reference: check the chain for depth and cycle
    /// violations, then push.
    ///
    /// # Errors
    ///
    /// `ProcessingError` with a "cyclic reference" or "depth exceeded"
    /// message.
    pub fn follow_reference(&mut self, id: &str) -> EvalResult<()> {
        if self.ref_chain.iter().any(|c| c == id) {
            warn!("[{}] cyclic reference to {id}", self.request_id);
            return Err(Indeterminate::processing(format!(
                "cyclic reference to {id}"
            )));
        }
        if self.ref_chain.len() >= self.max_ref_depth {
            warn!("[{}] reference depth exceeded at {id}", self.request_id);
            return Err(Indeterminate::processing(format!(
                "depth exceeded following reference to {id}"
            )));
        }
        self.ref_chain.push(id.to_string());
        Ok(())
    }

    /// Unwind the reference chain after evaluating a referenced
    /// policy.
    pub fn pop_reference(&mut self) {
        self.ref_chain.pop();
    }

    #[must_use]
    pub fn ref_provider(&self) -> Option<Arc<dyn RefPolicyProvider>> {
        self.ref_provider.clone()
    }

    /// Record a missing-attribute detail for the response status.
    pub fn record_missing(&mut self, detail: MissingAttributeDetail) {
        self.missing.push(detail);
    }

    /// Missing-attribute details accumulated so far.
    #[must_use]
    pub fn missing_attributes(&self) -> &[MissingAttributeDetail] {
        &self.missing
    }
}
