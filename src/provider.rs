//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Attribute providers (the PIP protocol).
//!
//! A provider declares which attributes it can supply and which it
//! depends on; the evaluation context consults providers in
//! registration order when a designator misses the request store.
//! Declared dependency graphs are checked for cycles when the PDP is
//! assembled, so a provider asking the context for its dependencies
//! can never recurse into itself.

use crate::context::{AttributeKey, EvaluationContext};
use crate::errors::{ConfigError, EvalResult};
use crate::value::{Bag, DataType};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Names an attribute a provider supplies or depends on, independent
/// of issuer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeDescriptor {
    pub category: String,
    pub attribute_id: String,
    pub data_type: DataType,
}

impl AttributeDescriptor {
    #[must_use]
    pub fn new(category: &str, attribute_id: &str, data_type: DataType) -> AttributeDescriptor {
        AttributeDescriptor {
            category: category.to_string(),
            attribute_id: attribute_id.to_string(),
            data_type,
        }
    }

    /// Whether a lookup key names this descriptor.
    #[must_use]
    pub fn covers(&self, key: &AttributeKey) -> bool {
        self.category == key.category
            && self.attribute_id == key.attribute_id
            && self.data_type == key.data_type
    }
}

impl fmt::Display for AttributeDescriptor {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{} ({})",
            self.category, self.attribute_id, self.data_type
        )
    }
}

/// A pluggable source of attributes, consulted on designator misses.
///
/// Implementations must be safe to invoke concurrently across
/// requests.  A provider performing I/O must honor the context's
/// deadline and return `Indeterminate(ProcessingError)` once it has
/// passed.
pub trait AttributeProvider: Send + Sync {
    /// A short name used in log messages and cycle diagnostics.
    fn name(&self) -> &str;

    /// The attributes this provider can supply.
    fn supplies(&self) -> Vec<AttributeDescriptor>;

    /// Attributes this provider reads back out of the context while
    /// resolving.  Used for configuration-time cycle rejection.
    fn dependencies(&self) -> Vec<AttributeDescriptor> {
        vec![]
    }

    /// Resolve one attribute key.  The provider may recursively ask
    /// the context for its declared dependencies.
    ///
    /// # Errors
    ///
    /// `Indeterminate` when the lookup fails; an `Ok` empty bag means
    /// "I have nothing", and the context moves on to the next
    /// provider.
    fn resolve(&self, key: &AttributeKey, ctx: &mut EvaluationContext) -> EvalResult<Bag>;
}

/// Reject provider sets whose declared dependency graphs contain a
/// cycle.
///
/// # Errors
///
/// `ConfigError::ProviderCycle` naming a provider on the cycle.
pub(crate) fn check_dependency_cycles(
    providers: &[Arc<dyn AttributeProvider>],
) -> Result<(), ConfigError> {
    // map each supplied descriptor to the providers offering it
    let mut suppliers: HashMap<AttributeDescriptor, Vec<usize>> = HashMap::new();
    for (idx, p) in providers.iter().enumerate() {
        for d in p.supplies() {
            suppliers.entry(d).or_default().push(idx);
        }
    }
    // edge: provider -> any provider supplying one of its dependencies
    let edges: Vec<Vec<usize>> = providers
        .iter()
        .map(|p| {
            let mut out = vec![];
            for dep in p.dependencies() {
                if let Some(s) = suppliers.get(&dep) {
                    out.extend(s.iter().copied());
                }
            }
            out
        })
        .collect();

    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        visiting: &mut HashSet<usize>,
        done: &mut HashSet<usize>,
    ) -> bool {
        if done.contains(&node) {
            return true;
        }
        if !visiting.insert(node) {
            return false;
        }
        for &next in &edges[node] {
            if !visit(next, edges, visiting, done) {
                return false;
            }
        }
        visiting.remove(&node);
        done.insert(node);
        true
    }

    let mut done = HashSet::new();
    for idx in 0..providers.len() {
        let mut visiting = HashSet::new();
        if !visit(idx, &edges, &mut visiting, &mut done) {
            return Err(ConfigError::ProviderCycle(
                providers[idx].name().to_string(),
            ));
        }
    }
    Ok(())
}
