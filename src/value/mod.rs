//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The XACML value algebra: primitive datatypes and bags.
//!
//! Every value is immutable.  Equality is value-equality as defined by
//! XACML for each datatype; hashing agrees with equality.  A `Bag` is
//! an unordered multiset of values of a single primitive datatype and
//! never contains another bag.

pub mod binary;
pub mod names;
pub mod numeric;
pub mod temporal;

use crate::errors::{EvalResult, Indeterminate};
use names::{AnyUri, DnsName, IpAddress, Rfc822Name, X500Name};
use num_bigint::BigInt;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use temporal::{DayTimeDuration, XDate, XDateTime, XTime, YearMonthDuration};
use thiserror::Error;

/// Error thrown when a lexical form does not parse as the requested
/// datatype.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {}: {}", datatype, lexical)]
pub struct LexicalError {
    pub datatype: &'static str,
    pub lexical: String,
}

impl LexicalError {
    pub(crate) fn new(datatype: &'static str, lexical: &str) -> LexicalError {
        LexicalError {
            datatype,
            lexical: lexical.to_string(),
        }
    }
}

/// The closed set of primitive datatypes the engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    String,
    Boolean,
    Integer,
    Double,
    Time,
    Date,
    DateTime,
    DayTimeDuration,
    YearMonthDuration,
    AnyUri,
    HexBinary,
    Base64Binary,
    Rfc822Name,
    X500Name,
    IpAddress,
    DnsName,
    XPathExpression,
}

/// All datatypes, used when generating per-type function families.
pub const ALL_DATATYPES: [DataType; 17] = [
    DataType::String,
    DataType::Boolean,
    DataType::Integer,
    DataType::Double,
    DataType::Time,
    DataType::Date,
    DataType::DateTime,
    DataType::DayTimeDuration,
    DataType::YearMonthDuration,
    DataType::AnyUri,
    DataType::HexBinary,
    DataType::Base64Binary,
    DataType::Rfc822Name,
    DataType::X500Name,
    DataType::IpAddress,
    DataType::DnsName,
    DataType::XPathExpression,
];

impl DataType {
    /// The URI identifying this datatype.
    #[must_use]
    pub fn uri(&self) -> &'static str {
        match self {
            DataType::String => "http://www.w3.org/2001/XMLSchema#string",
            DataType::Boolean => "http://www.w3.org/2001/XMLSchema#boolean",
            DataType::Integer => "http://www.w3.org/2001/XMLSchema#integer",
            DataType::Double => "http://www.w3.org/2001/XMLSchema#double",
            DataType::Time => "http://www.w3.org/2001/XMLSchema#time",
            DataType::Date => "http://www.w3.org/2001/XMLSchema#date",
            DataType::DateTime => "http://www.w3.org/2001/XMLSchema#dateTime",
            DataType::DayTimeDuration => "http://www.w3.org/2001/XMLSchema#dayTimeDuration",
            DataType::YearMonthDuration => "http://www.w3.org/2001/XMLSchema#yearMonthDuration",
            DataType::AnyUri => "http://www.w3.org/2001/XMLSchema#anyURI",
            DataType::HexBinary => "http://www.w3.org/2001/XMLSchema#hexBinary",
            DataType::Base64Binary => "http://www.w3.org/2001/XMLSchema#base64Binary",
            DataType::Rfc822Name => "urn:oasis:names:tc:xacml:1.0:data-type:rfc822Name",
            DataType::X500Name => "urn:oasis:names:tc:xacml:1.0:data-type:x500Name",
            DataType::IpAddress => "urn:oasis:names:tc:xacml:2.0:data-type:ipAddress",
            DataType::DnsName => "urn:oasis:names:tc:xacml:2.0:data-type:dnsName",
            DataType::XPathExpression => {
                "urn:oasis:names:tc:xacml:3.0:data-type:xpathExpression"
            }
        }
    }

    /// Look up a datatype by its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<DataType> {
        ALL_DATATYPES.iter().copied().find(|d| d.uri() == uri)
    }

    /// The short name used inside standard function URIs
    /// (e.g. "string" in `…:function:string-bag-size`).
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Double => "double",
            DataType::Time => "time",
            DataType::Date => "date",
            DataType::DateTime => "dateTime",
            DataType::DayTimeDuration => "dayTimeDuration",
            DataType::YearMonthDuration => "yearMonthDuration",
            DataType::AnyUri => "anyURI",
            DataType::HexBinary => "hexBinary",
            DataType::Base64Binary => "base64Binary",
            DataType::Rfc822Name => "rfc822Name",
            DataType::X500Name => "x500Name",
            DataType::IpAddress => "ipAddress",
            DataType::DnsName => "dnsName",
            DataType::XPathExpression => "xpathExpression",
        }
    }

    /// The XACML spec version that introduced the per-type function
    /// family for this datatype ("1.0", "2.0" or "3.0"), used to build
    /// standard function URIs.
    #[must_use]
    pub fn std_version(&self) -> &'static str {
        match self {
            DataType::DayTimeDuration
            | DataType::YearMonthDuration
            | DataType::XPathExpression => "3.0",
            DataType::IpAddress | DataType::DnsName => "2.0",
            _ => "1.0",
        }
    }

    /// Whether values of this datatype have a total order.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            DataType::String
                | DataType::Integer
                | DataType::Double
                | DataType::Time
                | DataType::Date
                | DataType::DateTime
                | DataType::DayTimeDuration
                | DataType::YearMonthDuration
        )
    }
}

impl fmt::Display for DataType {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// An XPath expression value, carrying the category whose content it
/// applies to and the namespace bindings in scope at its declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XPathExpressionValue {
    pub category: String,
    pub path: String,
    /// (prefix, namespace URI) pairs, sorted by prefix.
    pub namespaces: Vec<(String, String)>,
}

impl fmt::Display for XPathExpressionValue {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// A single immutable XACML value.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Boolean(bool),
    Integer(BigInt),
    Double(f64),
    Time(XTime),
    Date(XDate),
    DateTime(XDateTime),
    DayTimeDuration(DayTimeDuration),
    YearMonthDuration(YearMonthDuration),
    AnyUri(AnyUri),
    HexBinary(Vec<u8>),
    Base64Binary(Vec<u8>),
    Rfc822Name(Rfc822Name),
    X500Name(X500Name),
    IpAddress(IpAddress),
    DnsName(DnsName),
    XPathExpression(XPathExpressionValue),
}

impl Value {
    /// The datatype tag of this value.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Value::String(_) => DataType::String,
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Double(_) => DataType::Double,
            Value::Time(_) => DataType::Time,
            Value::Date(_) => DataType::Date,
            Value::DateTime(_) => DataType::DateTime,
            Value::DayTimeDuration(_) => DataType::DayTimeDuration,
            Value::YearMonthDuration(_) => DataType::YearMonthDuration,
            Value::AnyUri(_) => DataType::AnyUri,
            Value::HexBinary(_) => DataType::HexBinary,
            Value::Base64Binary(_) => DataType::Base64Binary,
            Value::Rfc822Name(_) => DataType::Rfc822Name,
            Value::X500Name(_) => DataType::X500Name,
            Value::IpAddress(_) => DataType::IpAddress,
            Value::DnsName(_) => DataType::DnsName,
            Value::XPathExpression(_) => DataType::XPathExpression,
        }
    }

    /// Parse a lexical form into a value of the given datatype.
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` if the input does not conform to the
    /// datatype's lexical space.
    pub fn parse(data_type: DataType, lexical: &str) -> Result<Value, LexicalError> {
        match data_type {
            DataType::String => Ok(Value::String(lexical.to_string())),
            DataType::Boolean => match lexical {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                _ => Err(LexicalError::new("boolean", lexical)),
            },
            DataType::Integer => lexical
                .parse::<BigInt>()
                .map(Value::Integer)
                .map_err(|_| LexicalError::new("integer", lexical)),
            DataType::Double => numeric::parse_double(lexical).map(Value::Double),
            DataType::Time => XTime::parse(lexical).map(Value::Time),
            DataType::Date => XDate::parse(lexical).map(Value::Date),
            DataType::DateTime => XDateTime::parse(lexical).map(Value::DateTime),
            DataType::DayTimeDuration => {
                DayTimeDuration::parse(lexical).map(Value::DayTimeDuration)
            }
            DataType::YearMonthDuration => {
                YearMonthDuration::parse(lexical).map(Value::YearMonthDuration)
            }
            DataType::AnyUri => Ok(Value::AnyUri(AnyUri::new(lexical))),
            DataType::HexBinary => binary::parse_hex(lexical).map(Value::HexBinary),
            DataType::Base64Binary => binary::parse_base64(lexical).map(Value::Base64Binary),
            DataType::Rfc822Name => Rfc822Name::parse(lexical).map(Value::Rfc822Name),
            DataType::X500Name => X500Name::parse(lexical).map(Value::X500Name),
            DataType::IpAddress => IpAddress::parse(lexical).map(Value::IpAddress),
            DataType::DnsName => DnsName::parse(lexical).map(Value::DnsName),
            DataType::XPathExpression => Err(LexicalError::new("xpathExpression", lexical)),
        }
    }

    /// Print the canonical lexical form.  `parse(print(v))` produces a
    /// value equal to `v`.
    #[must_use]
    pub fn print(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Double(d) => numeric::print_double(*d),
            Value::Time(t) => t.to_string(),
            Value::Date(d) => d.to_string(),
            Value::DateTime(dt) => dt.to_string(),
            Value::DayTimeDuration(d) => d.to_string(),
            Value::YearMonthDuration(d) => d.to_string(),
            Value::AnyUri(u) => u.to_string(),
            Value::HexBinary(b) => binary::print_hex(b),
            Value::Base64Binary(b) => binary::print_base64(b),
            Value::Rfc822Name(n) => n.to_string(),
            Value::X500Name(n) => n.to_string(),
            Value::IpAddress(a) => a.to_string(),
            Value::DnsName(d) => d.to_string(),
            Value::XPathExpression(x) => x.to_string(),
        }
    }

    /// Total-order comparison for ordered datatypes.
    ///
    /// Returns `None` when the datatypes differ or the type has no
    /// defined order.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Time(a), Value::Time(b)) => Some(a.compare(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.compare(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.compare(b)),
            (Value::DayTimeDuration(a), Value::DayTimeDuration(b)) => Some(a.cmp(b)),
            (Value::YearMonthDuration(a), Value::YearMonthDuration(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Value identity.
///
/// This is the equality bags and sets are built on.  It differs from
/// the `double-equal` *function* in two places so that `Eq` and `Hash`
/// laws hold: NaN is identical to NaN, and positive and negative zero
/// are identical.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => {
                numeric::double_bits(*a) == numeric::double_bits(*b)
            }
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::DayTimeDuration(a), Value::DayTimeDuration(b)) => a == b,
            (Value::YearMonthDuration(a), Value::YearMonthDuration(b)) => a == b,
            (Value::AnyUri(a), Value::AnyUri(b)) => a == b,
            (Value::HexBinary(a), Value::HexBinary(b)) => a == b,
            (Value::Base64Binary(a), Value::Base64Binary(b)) => a == b,
            (Value::Rfc822Name(a), Value::Rfc822Name(b)) => a == b,
            (Value::X500Name(a), Value::X500Name(b)) => a == b,
            (Value::IpAddress(a), Value::IpAddress(b)) => a == b,
            (Value::DnsName(a), Value::DnsName(b)) => a == b,
            (Value::XPathExpression(a), Value::XPathExpression(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data_type().hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Double(d) => numeric::double_bits(*d).hash(state),
            Value::Time(t) => t.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::DayTimeDuration(d) => d.hash(state),
            Value::YearMonthDuration(d) => d.hash(state),
            Value::AnyUri(u) => u.hash(state),
            Value::HexBinary(b) => b.hash(state),
            Value::Base64Binary(b) => b.hash(state),
            Value::Rfc822Name(n) => n.hash(state),
            Value::X500Name(n) => n.hash(state),
            Value::IpAddress(a) => a.hash(state),
            Value::DnsName(d) => d.hash(state),
            Value::XPathExpression(x) => x.hash(state),
        }
    }
}

impl fmt::Display for Value {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.print())
    }
}

/// An unordered multiset of values of a single primitive datatype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bag {
    data_type: DataType,
    values: Vec<Value>,
}

impl Bag {
    /// Build a bag; every value must carry the bag's datatype.
    #[must_use]
    pub fn new(data_type: DataType, values: Vec<Value>) -> Bag {
        debug_assert!(values.iter().all(|v| v.data_type() == data_type));
        Bag { data_type, values }
    }

    /// An empty bag of the given datatype.
    #[must_use]
    pub fn empty(data_type: DataType) -> Bag {
        Bag {
            data_type,
            values: vec![],
        }
    }

    /// A bag holding a single value.
    #[must_use]
    pub fn singleton(value: Value) -> Bag {
        Bag {
            data_type: value.data_type(),
            values: vec![value],
        }
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// Extract the single value; fails unless the bag size is exactly
    /// one.
    ///
    /// # Errors
    ///
    /// `ProcessingError` when the bag is empty or holds more than one
    /// value.
    pub fn one_and_only(&self) -> EvalResult<&Value> {
        if self.values.len() == 1 {
            Ok(&self.values[0])
        } else {
            Err(Indeterminate::processing(format!(
                "{}-one-and-only applied to a bag of size {}",
                self.data_type,
                self.values.len()
            )))
        }
    }

    /// Multiset equality: same datatype and same values with the same
    /// multiplicities, in any order.
    #[must_use]
    pub fn multiset_eq(&self, other: &Bag) -> bool {
        if self.data_type != other.data_type || self.values.len() != other.values.len() {
            return false;
        }
        let mut unmatched: Vec<&Value> = other.values.iter().collect();
        for v in &self.values {
            match unmatched.iter().position(|u| *u == v) {
                Some(i) => {
                    unmatched.swap_remove(i);
                }
                None => return false,
            }
        }
        unmatched.is_empty()
    }

    /// Merge another bag of the same datatype into this one.
    pub fn absorb(&mut self, other: &Bag) {
        debug_assert_eq!(self.data_type, other.data_type);
        self.values.extend(other.values.iter().cloned());
    }
}

impl fmt::Display for Bag {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let items: Vec<String> = self.values.iter().map(Value::print).collect();
        write!(f, "bag[{}]{{{}}}", self.data_type, items.join(", "))
    }
}
