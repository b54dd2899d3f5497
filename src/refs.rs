//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Policy references: version constraints, the reference-policy
//! provider contract, and static (load-time) reference linking.
//!
//! Dynamic per-request resolution lives with `PolicyChild`; the
//! evaluation context carries the reference chain that bounds depth
//! and rejects cycles in both modes.

use crate::errors::{ConfigError, PolicyError};
use crate::policy::policy::Policy;
use crate::policy::policyset::{PolicyChild, PolicySet};
use log::{debug, info};
use std::fmt;
use std::sync::Arc;

/// A policy version: a dot-separated sequence of numbers ordered as a
/// tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(Vec<u64>);

impl Version {
    /// Parse a `1.2.3` form.
    ///
    /// # Errors
    ///
    /// `PolicyError::InvalidVersion` on empty or non-numeric
    /// components.
    pub fn parse(lexical: &str) -> Result<Version, PolicyError> {
        let components: Result<Vec<u64>, _> = lexical.split('.').map(str::parse).collect();
        match components {
            Ok(c) if !c.is_empty() => Ok(Version(c)),
            _ => Err(PolicyError::InvalidVersion(lexical.to_string())),
        }
    }

    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl Default for Version {
    fn default() -> Self {
        Version(vec![1, 0])
    }
}

impl fmt::Display for Version {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternPart {
    Literal(u64),
    /// `*`: exactly one number.
    AnyOne,
    /// `+`: one or more numbers.
    AnyTail,
}

/// A version match pattern (`1.*.+` style).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPattern {
    parts: Vec<PatternPart>,
    source: String,
}

impl VersionPattern {
    /// Parse a pattern of numbers, `*` and `+` components.
    ///
    /// # Errors
    ///
    /// `PolicyError::InvalidVersion` on malformed patterns.
    pub fn parse(lexical: &str) -> Result<VersionPattern, PolicyError> {
        let mut parts = vec![];
        for c in lexical.split('.') {
            let part = match c {
                "*" => PatternPart::AnyOne,
                "+" => PatternPart::AnyTail,
                n => PatternPart::Literal(
                    n.parse()
                        .map_err(|_| PolicyError::InvalidVersion(lexical.to_string()))?,
                ),
            };
            parts.push(part);
        }
        if parts.is_empty() {
            return Err(PolicyError::InvalidVersion(lexical.to_string()));
        }
        Ok(VersionPattern {
            parts,
            source: lexical.to_string(),
        })
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        fn matches_at(parts: &[PatternPart], numbers: &[u64]) -> bool {
            match (parts.first(), numbers.first()) {
                (None, None) => true,
                (None, Some(_)) | (Some(_), None) => false,
                (Some(PatternPart::Literal(n)), Some(v)) => {
                    n == v && matches_at(&parts[1..], &numbers[1..])
                }
                (Some(PatternPart::AnyOne), Some(_)) => {
                    matches_at(&parts[1..], &numbers[1..])
                }
                (Some(PatternPart::AnyTail), Some(_)) => {
                    // consume one or more numbers
                    (1..=numbers.len()).any(|n| matches_at(&parts[1..], &numbers[n..]))
                }
            }
        }
        matches_at(&self.parts, version.components())
    }
}

impl fmt::Display for VersionPattern {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// The version bounds a reference may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionConstraints {
    pub version: Option<VersionPattern>,
    pub earliest: Option<Version>,
    pub latest: Option<Version>,
}

impl VersionConstraints {
    /// Unconstrained: any version matches.
    #[must_use]
    pub fn any() -> VersionConstraints {
        VersionConstraints::default()
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        if let Some(p) = &self.version {
            if !p.matches(version) {
                return false;
            }
        }
        if let Some(e) = &self.earliest {
            if version < e {
                return false;
            }
        }
        if let Some(l) = &self.latest {
            if version > l {
                return false;
            }
        }
        true
    }
}

/// A `Policy(Set)IdReference`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyReference {
    pub id: String,
    pub constraints: VersionConstraints,
}

impl PolicyReference {
    #[must_use]
    pub fn new(id: &str) -> PolicyReference {
        PolicyReference {
            id: id.to_string(),
            constraints: VersionConstraints::any(),
        }
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: VersionConstraints) -> PolicyReference {
        self.constraints = constraints;
        self
    }
}

impl fmt::Display for PolicyReference {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ref:{}", self.id)
    }
}

/// Source of policies for reference resolution.
///
/// Among stored versions matching the constraints, implementations
/// return the newest.
pub trait RefPolicyProvider: Send + Sync {
    fn policy(&self, id: &str, constraints: &VersionConstraints) -> Option<Arc<Policy>>;
    fn policy_set(&self, id: &str, constraints: &VersionConstraints) -> Option<Arc<PolicySet>>;
}

/// A provider over an in-memory collection, newest-matching-version
/// selection.
#[derive(Default)]
pub struct InMemoryPolicyProvider {
    policies: Vec<Arc<Policy>>,
    policy_sets: Vec<Arc<PolicySet>>,
}

impl InMemoryPolicyProvider {
    #[must_use]
    pub fn new() -> InMemoryPolicyProvider {
        InMemoryPolicyProvider::default()
    }

    pub fn add_policy(&mut self, policy: Arc<Policy>) {
        self.policies.push(policy);
    }

    pub fn add_policy_set(&mut self, policy_set: Arc<PolicySet>) {
        self.policy_sets.push(policy_set);
    }
}

impl RefPolicyProvider for InMemoryPolicyProvider {
    fn policy(&self, id: &str, constraints: &VersionConstraints) -> Option<Arc<Policy>> {
        self.policies
            .iter()
            .filter(|p| p.id == id && constraints.matches(&p.version))
            .max_by(|a, b| a.version.cmp(&b.version))
            .cloned()
    }

    fn policy_set(&self, id: &str, constraints: &VersionConstraints) -> Option<Arc<PolicySet>> {
        self.policy_sets
            .iter()
            .filter(|p| p.id == id && constraints.matches(&p.version))
            .max_by(|a, b| a.version.cmp(&b.version))
            .cloned()
    }
}

/// Eagerly resolve every reference reachable from a policy set,
/// replacing references with direct links.
///
/// Cycles and depth violations are configuration errors here, rather
/// than per-request indeterminates.
///
/// # Errors
///
/// `ConfigError` naming the offending reference.
pub fn link_static(
    root: &Arc<PolicySet>,
    provider: &dyn RefPolicyProvider,
    max_depth: usize,
) -> Result<Arc<PolicySet>, ConfigError> {
    info!("statically linking policy references under {}", root.id);
    let mut chain = vec![];
    link_policy_set(root, provider, &mut chain, max_depth)
}

fn link_policy_set(
    ps: &Arc<PolicySet>,
    provider: &dyn RefPolicyProvider,
    chain: &mut Vec<String>,
    max_depth: usize,
) -> Result<Arc<PolicySet>, ConfigError> {
    if chain.iter().any(|c| *c == ps.id) {
        return Err(ConfigError::CyclicReference(ps.id.clone()));
    }
    if chain.len() > max_depth {
        return Err(ConfigError::ReferenceDepthExceeded(max_depth));
    }
    chain.push(ps.id.clone());
    let mut linked_children = Vec::with_capacity(ps.children.len());
    for child in &ps.children {
        let linked = match child {
            PolicyChild::Policy(p) => PolicyChild::Policy(p.clone()),
            PolicyChild::PolicySet(nested) => {
                PolicyChild::PolicySet(link_policy_set(nested, provider, chain, max_depth)?)
            }
            PolicyChild::PolicyRef(r) => {
                debug!("resolving policy reference {r}");
                let target = provider
                    .policy(&r.id, &r.constraints)
                    .ok_or_else(|| ConfigError::UnresolvedReference(r.id.clone()))?;
                PolicyChild::Policy(target)
            }
            PolicyChild::PolicySetRef(r) => {
                debug!("resolving policy set reference {r}");
                let target = provider
                    .policy_set(&r.id, &r.constraints)
                    .ok_or_else(|| ConfigError::UnresolvedReference(r.id.clone()))?;
                PolicyChild::PolicySet(link_policy_set(&target, provider, chain, max_depth)?)
            }
        };
        linked_children.push(linked);
    }
    chain.pop();
    Ok(Arc::new(ps.with_children(linked_children)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        let a = Version::parse("1.2").unwrap();
        let b = Version::parse("1.10").unwrap();
        let c = Version::parse("2.0").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert_eq!(Version::parse("1.2").unwrap(), a);
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1.x").is_err());
    }

    #[test]
    fn test_pattern_matching() {
        let p = VersionPattern::parse("1.*.+").unwrap();
        assert!(p.matches(&Version::parse("1.2.3").unwrap()));
        assert!(p.matches(&Version::parse("1.0.9.9").unwrap()));
        assert!(!p.matches(&Version::parse("1.2").unwrap()));
        assert!(!p.matches(&Version::parse("2.2.3").unwrap()));

        let exact = VersionPattern::parse("1.0").unwrap();
        assert!(exact.matches(&Version::parse("1.0").unwrap()));
        assert!(!exact.matches(&Version::parse("1.0.0").unwrap()));
    }

    #[test]
    fn test_constraint_bounds() {
        let c = VersionConstraints {
            version: None,
            earliest: Some(Version::parse("1.5").unwrap()),
            latest: Some(Version::parse("2.0").unwrap()),
        };
        assert!(c.matches(&Version::parse("1.7").unwrap()));
        assert!(!c.matches(&Version::parse("1.4").unwrap()));
        assert!(!c.matches(&Version::parse("2.1").unwrap()));
    }
}
