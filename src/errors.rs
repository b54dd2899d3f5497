//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Status codes and error types for policy loading and evaluation.

use crate::value::DataType;
use std::fmt;
use thiserror::Error;

/// XACML status code classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Evaluation completed normally.
    Ok,
    /// A required attribute was absent from the request and all providers.
    MissingAttribute,
    /// The request or policy was structurally invalid.
    SyntaxError,
    /// Any other runtime failure.
    ProcessingError,
}

impl StatusCode {
    /// The standard URI for this status code.
    #[must_use]
    pub fn uri(&self) -> &'static str {
        match self {
            StatusCode::Ok => "urn:oasis:names:tc:xacml:1.0:status:ok",
            StatusCode::MissingAttribute => {
                "urn:oasis:names:tc:xacml:1.0:status:missing-attribute"
            }
            StatusCode::SyntaxError => "urn:oasis:names:tc:xacml:1.0:status:syntax-error",
            StatusCode::ProcessingError => {
                "urn:oasis:names:tc:xacml:1.0:status:processing-error"
            }
        }
    }
}

impl fmt::Display for StatusCode {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

/// Names an attribute that was required but could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAttributeDetail {
    pub category: String,
    pub attribute_id: String,
    pub data_type: DataType,
    pub issuer: Option<String>,
}

impl fmt::Display for MissingAttributeDetail {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{} ({})",
            self.category,
            self.attribute_id,
            self.data_type.uri()
        )?;
        if let Some(i) = &self.issuer {
            write!(f, " issuer={i}")?;
        }
        Ok(())
    }
}

/// The status carried by a result or an `Indeterminate` outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub code: StatusCode,
    pub message: Option<String>,
    pub missing: Vec<MissingAttributeDetail>,
}

impl Status {
    /// The all-clear status.
    #[must_use]
    pub fn ok() -> Status {
        Status {
            code: StatusCode::Ok,
            message: None,
            missing: vec![],
        }
    }
}

impl fmt::Display for Status {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(m) = &self.message {
            write!(f, ": {m}")?;
        }
        Ok(())
    }
}

/// Error thrown when evaluation cannot produce a value.
///
/// Every evaluation function in the engine returns either a value or
/// one of these; combining algorithms later attach the effect the
/// failing element would have produced.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("indeterminate: {status}")]
pub struct Indeterminate {
    pub status: Status,
}

impl Indeterminate {
    /// A processing-error indeterminate with a message.
    #[must_use]
    pub fn processing(message: impl Into<String>) -> Indeterminate {
        Indeterminate {
            status: Status {
                code: StatusCode::ProcessingError,
                message: Some(message.into()),
                missing: vec![],
            },
        }
    }

    /// A syntax-error indeterminate with a message.
    #[must_use]
    pub fn syntax(message: impl Into<String>) -> Indeterminate {
        Indeterminate {
            status: Status {
                code: StatusCode::SyntaxError,
                message: Some(message.into()),
                missing: vec![],
            },
        }
    }

    /// A missing-attribute indeterminate naming the absent attribute.
    #[must_use]
    pub fn missing_attribute(detail: MissingAttributeDetail) -> Indeterminate {
        Indeterminate {
            status: Status {
                code: StatusCode::MissingAttribute,
                message: Some(format!("missing attribute {detail}")),
                missing: vec![detail],
            },
        }
    }

    #[must_use]
    pub fn code(&self) -> StatusCode {
        self.status.code
    }
}

/// Result of evaluating any expression or element.
pub type EvalResult<T> = Result<T, Indeterminate>;

/// Error thrown when a policy fails static validation at load time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("Unknown function: {}", _0)]
    UnknownFunction(String),
    #[error("Unknown combining algorithm: {}", _0)]
    UnknownCombiningAlgorithm(String),
    #[error("Unknown datatype: {}", _0)]
    UnknownDataType(String),
    #[error("Function {} expects {} arguments, got {}", _0, _1, _2)]
    ArityMismatch(String, usize, usize),
    #[error("Argument {} of {} has type {}, expected {}", _1, _0, _2, _3)]
    ArgumentTypeMismatch(String, usize, String, String),
    #[error("Condition must be a non-bag boolean expression")]
    ConditionNotBoolean,
    #[error("Match function must take the literal and attribute types and return boolean: {}", _0)]
    InvalidMatchFunction(String),
    #[error("Reference to undefined or forward variable: {}", _0)]
    UndefinedVariable(String),
    #[error("Duplicate variable definition: {}", _0)]
    DuplicateVariable(String),
    #[error("Variable reference chain exceeds depth {}", _0)]
    VariableDepthExceeded(usize),
    #[error("XPath support is disabled; selectors and xpath functions are rejected")]
    XPathDisabled,
    #[error("Invalid lexical value for {}: {}", _0, _1)]
    InvalidLiteral(String, String),
    #[error("Invalid version or version pattern: {}", _0)]
    InvalidVersion(String),
    #[error("Function reference is only valid as a higher-order function argument")]
    MisplacedFunctionReference,
    #[error("Higher-order function {} requires a function reference first argument", _0)]
    MissingFunctionReference(String),
}

/// Error thrown when the PDP cannot be assembled from its configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Policy failed validation: {}", _0)]
    Policy(#[from] PolicyError),
    #[error("Cyclic policy reference: {}", _0)]
    CyclicReference(String),
    #[error("Policy reference chain exceeds depth {}", _0)]
    ReferenceDepthExceeded(usize),
    #[error("Unresolvable policy reference: {}", _0)]
    UnresolvedReference(String),
    #[error("Attribute provider dependency cycle involving {}", _0)]
    ProviderCycle(String),
    #[error("No root policy was configured")]
    MissingRootPolicy,
}
