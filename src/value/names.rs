//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Name-shaped datatypes: `anyURI`, `rfc822Name`, `x500Name`,
//! `ipAddress` and `dnsName`.

use super::LexicalError;
use std::fmt;
use std::net::IpAddr;

/// A XACML `anyURI` value.
///
/// This is deliberately space-permissive and is *not* a parsed
/// platform URI: equality is codepoint-exact on the original string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnyUri(String);

impl AnyUri {
    #[must_use]
    pub fn new(lexical: &str) -> AnyUri {
        AnyUri(lexical.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnyUri {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An RFC 822 mailbox name.
///
/// The local part is case-sensitive; the domain is case-insensitive
/// and stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rfc822Name {
    local: String,
    domain: String,
}

impl Rfc822Name {
    /// Parse `local@domain`.
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` unless exactly one `@` separates two
    /// non-empty parts.
    pub fn parse(lexical: &str) -> Result<Rfc822Name, LexicalError> {
        match lexical.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
            {
                Ok(Rfc822Name {
                    local: local.to_string(),
                    domain: domain.to_ascii_lowercase(),
                })
            }
            _ => Err(LexicalError::new("rfc822Name", lexical)),
        }
    }

    #[must_use]
    pub fn local(&self) -> &str {
        &self.local
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The `rfc822Name-match` semantics: the pattern is either a full
    /// mailbox, a whole domain, or a `.`-prefixed domain suffix.
    #[must_use]
    pub fn matches(&self, pattern: &str) -> bool {
        if let Some((local, domain)) = pattern.split_once('@') {
            local == self.local && domain.eq_ignore_ascii_case(&self.domain)
        } else if pattern.starts_with('.') {
            // sub-domain pattern, the leading dot must match too
            self.domain.ends_with(&pattern.to_ascii_lowercase())
        } else {
            self.domain.eq_ignore_ascii_case(pattern)
        }
    }
}

impl fmt::Display for Rfc822Name {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// One attribute-value assertion of an RDN, normalized for matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ava {
    pub attr_type: String,
    pub value: String,
}

/// An X.500 distinguished name per RFC 2253.
///
/// RDNs are stored most-significant last, exactly as written; equality
/// uses the canonical form (types lower-cased, values case-folded with
/// collapsed whitespace).
#[derive(Debug, Clone)]
pub struct X500Name {
    rdns: Vec<Vec<Ava>>,
    original: String,
}

fn canonical_value(raw: &str) -> String {
    let unescaped: String = {
        let mut out = String::with_capacity(raw.len());
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    };
    unescaped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split on a separator, honoring backslash escapes.
fn split_escaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = vec![];
    let mut current = String::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    parts.push(current);
    parts
}

impl X500Name {
    /// Parse an RFC 2253 string form.
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` when any RDN lacks a `type=value`
    /// shape.
    pub fn parse(lexical: &str) -> Result<X500Name, LexicalError> {
        let mut rdns = vec![];
        if lexical.trim().is_empty() {
            return Ok(X500Name {
                rdns,
                original: lexical.to_string(),
            });
        }
        for rdn in split_escaped(lexical, ',') {
            let mut avas = vec![];
            for ava in split_escaped(&rdn, '+') {
                let (t, v) = ava
                    .split_once('=')
                    .ok_or_else(|| LexicalError::new("x500Name", lexical))?;
                let attr_type = t.trim().to_ascii_lowercase();
                if attr_type.is_empty() {
                    return Err(LexicalError::new("x500Name", lexical));
                }
                avas.push(Ava {
                    attr_type,
                    value: canonical_value(v.trim()),
                });
            }
            // multi-valued RDNs compare orderless
            avas.sort_by(|a, b| (&a.attr_type, &a.value).cmp(&(&b.attr_type, &b.value)));
            rdns.push(avas);
        }
        Ok(X500Name {
            rdns,
            original: lexical.to_string(),
        })
    }

    /// Whether this name is a terminal (least-significant) fragment of
    /// `other`, the `x500Name-match` semantics.
    #[must_use]
    pub fn is_terminal_part_of(&self, other: &X500Name) -> bool {
        if self.rdns.len() > other.rdns.len() {
            return false;
        }
        let offset = other.rdns.len() - self.rdns.len();
        other.rdns[offset..] == self.rdns[..]
    }
}

impl PartialEq for X500Name {
    fn eq(&self, other: &Self) -> bool {
        self.rdns == other.rdns
    }
}
impl Eq for X500Name {}

impl std::hash::Hash for X500Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rdns.hash(state);
    }
}

impl fmt::Display for X500Name {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// An inclusive port range; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub lower: Option<u16>,
    pub upper: Option<u16>,
}

impl PortRange {
    /// Parse the XACML port-range forms: `80`, `80-`, `-443`,
    /// `80-443`, or the empty string.
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` on a malformed range.
    pub fn parse(lexical: &str) -> Result<PortRange, LexicalError> {
        let err = || LexicalError::new("portRange", lexical);
        if lexical.is_empty() {
            return Ok(PortRange::default());
        }
        if let Some((lo, hi)) = lexical.split_once('-') {
            let lower = if lo.is_empty() {
                None
            } else {
                Some(lo.parse().map_err(|_| err())?)
            };
            let upper = if hi.is_empty() {
                None
            } else {
                Some(hi.parse().map_err(|_| err())?)
            };
            if lower.is_none() && upper.is_none() {
                return Err(err());
            }
            Ok(PortRange { lower, upper })
        } else {
            let port: u16 = lexical.parse().map_err(|_| err())?;
            Ok(PortRange {
                lower: Some(port),
                upper: Some(port),
            })
        }
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }
}

impl fmt::Display for PortRange {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.lower, self.upper) {
            (None, None) => Ok(()),
            (Some(l), Some(u)) if l == u => write!(f, "{l}"),
            (Some(l), Some(u)) => write!(f, "{l}-{u}"),
            (Some(l), None) => write!(f, "{l}-"),
            (None, Some(u)) => write!(f, "-{u}"),
        }
    }
}

/// A XACML `ipAddress`: address, optional mask, optional port range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IpAddress {
    pub address: IpAddr,
    pub mask: Option<IpAddr>,
    pub ports: PortRange,
}

impl IpAddress {
    /// Parse the XACML ipAddress forms; IPv6 addresses and masks are
    /// bracketed (`[::1]/[ffff::]:80-`).
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` on malformed input.
    pub fn parse(lexical: &str) -> Result<IpAddress, LexicalError> {
        let err = || LexicalError::new("ipAddress", lexical);
        if let Some(rest) = lexical.strip_prefix('[') {
            // IPv6
            let (addr, rest) = rest.split_once(']').ok_or_else(err)?;
            let address: IpAddr = addr.parse::<std::net::Ipv6Addr>().map_err(|_| err())?.into();
            let (mask, ports) = if let Some(m) = rest.strip_prefix("/[") {
                let (mask, tail) = m.split_once(']').ok_or_else(err)?;
                let mask: IpAddr = mask.parse::<std::net::Ipv6Addr>().map_err(|_| err())?.into();
                (Some(mask), tail)
            } else {
                (None, rest)
            };
            let ports = match ports.strip_prefix(':') {
                Some(p) => PortRange::parse(p)?,
                None if ports.is_empty() => PortRange::default(),
                None => return Err(err()),
            };
            Ok(IpAddress {
                address,
                mask,
                ports,
            })
        } else {
            // IPv4; ':' is unambiguous here
            let (body, ports) = match lexical.split_once(':') {
                Some((b, p)) => (b, PortRange::parse(p)?),
                None => (lexical, PortRange::default()),
            };
            let (addr, mask) = match body.split_once('/') {
                Some((a, m)) => (
                    a,
                    Some(m.parse::<std::net::Ipv4Addr>().map_err(|_| err())?.into()),
                ),
                None => (body, None),
            };
            let address: IpAddr = addr.parse::<std::net::Ipv4Addr>().map_err(|_| err())?.into();
            Ok(IpAddress {
                address,
                mask,
                ports,
            })
        }
    }
}

impl fmt::Display for IpAddress {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.address {
            IpAddr::V4(a) => write!(f, "{a}")?,
            IpAddr::V6(a) => write!(f, "[{a}]")?,
        }
        if let Some(m) = self.mask {
            match m {
                IpAddr::V4(m) => write!(f, "/{m}")?,
                IpAddr::V6(m) => write!(f, "/[{m}]")?,
            }
        }
        if !self.ports.is_unbounded() {
            write!(f, ":{}", self.ports)?;
        }
        Ok(())
    }
}

/// A XACML `dnsName`: a hostname (optionally with a leading `*.`
/// wildcard) plus an optional port range.  Hostnames are
/// case-insensitive and stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DnsName {
    pub name: String,
    pub ports: PortRange,
}

impl DnsName {
    /// Parse `hostname[:portrange]`.
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` on an empty hostname or bad range.
    pub fn parse(lexical: &str) -> Result<DnsName, LexicalError> {
        let (name, ports) = match lexical.split_once(':') {
            Some((n, p)) => (n, PortRange::parse(p)?),
            None => (lexical, PortRange::default()),
        };
        if name.is_empty() {
            return Err(LexicalError::new("dnsName", lexical));
        }
        Ok(DnsName {
            name: name.to_ascii_lowercase(),
            ports,
        })
    }
}

impl fmt::Display for DnsName {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.ports.is_unbounded() {
            write!(f, ":{}", self.ports)?;
        }
        Ok(())
    }
}
