//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The semantic shape of a decision request and the request filters
//! that split one request into individual decision requests.

use crate::errors::{EvalResult, Indeterminate};
use crate::value::{DataType, Value};
use crate::xpath::XmlContent;
use std::fmt;

/// Standard attribute category URIs.
pub mod categories {
    pub const SUBJECT: &str = "urn:oasis:names:tc:xacml:1.0:subject-category:access-subject";
    pub const RESOURCE: &str = "urn:oasis:names:tc:xacml:3.0:attribute-category:resource";
    pub const ACTION: &str = "urn:oasis:names:tc:xacml:3.0:attribute-category:action";
    pub const ENVIRONMENT: &str = crate::context::ENVIRONMENT_CATEGORY;
}

/// One named attribute supplied by the request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestAttribute {
    pub id: String,
    pub issuer: Option<String>,
    pub data_type: DataType,
    pub values: Vec<Value>,
    /// Echo this attribute back in the result.
    pub include_in_result: bool,
}

impl RequestAttribute {
    #[must_use]
    pub fn new(id: &str, value: Value) -> RequestAttribute {
        RequestAttribute {
            id: id.to_string(),
            issuer: None,
            data_type: value.data_type(),
            values: vec![value],
            include_in_result: false,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> RequestAttribute {
        self.issuer = Some(issuer.to_string());
        self
    }

    #[must_use]
    pub fn echoed(mut self) -> RequestAttribute {
        self.include_in_result = true;
        self
    }
}

/// One category instance: optional XML content plus attributes.
#[derive(Clone)]
pub struct CategoryAttributes {
    pub category: String,
    pub content: Option<XmlContent>,
    pub attributes: Vec<RequestAttribute>,
}

impl CategoryAttributes {
    #[must_use]
    pub fn new(category: &str) -> CategoryAttributes {
        CategoryAttributes {
            category: category.to_string(),
            content: None,
            attributes: vec![],
        }
    }

    #[must_use]
    pub fn attribute(mut self, attribute: RequestAttribute) -> CategoryAttributes {
        self.attributes.push(attribute);
        self
    }

    #[must_use]
    pub fn content(mut self, content: XmlContent) -> CategoryAttributes {
        self.content = Some(content);
        self
    }
}

impl fmt::Debug for CategoryAttributes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CategoryAttributes")
            .field("category", &self.category)
            .field("content", &self.content.as_ref().map(|_| "<xml>"))
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// A decision request as handed to the PDP by the front end.
#[derive(Debug, Clone, Default)]
pub struct DecisionRequest {
    pub categories: Vec<CategoryAttributes>,
    pub combined_decision: bool,
    pub return_policy_id_list: bool,
}

impl DecisionRequest {
    #[must_use]
    pub fn new() -> DecisionRequest {
        DecisionRequest::default()
    }

    #[must_use]
    pub fn category(mut self, category: CategoryAttributes) -> DecisionRequest {
        self.categories.push(category);
        self
    }

    #[must_use]
    pub fn combined(mut self) -> DecisionRequest {
        self.combined_decision = true;
        self
    }

    #[must_use]
    pub fn with_policy_id_list(mut self) -> DecisionRequest {
        self.return_policy_id_list = true;
        self
    }
}

/// One atomic evaluation input, after request filtering.
#[derive(Debug, Clone)]
pub struct IndividualRequest {
    pub categories: Vec<CategoryAttributes>,
    pub return_policy_id_list: bool,
}

/// Request-splitting policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestFilterId {
    /// One individual request; repeated category instances merge.
    #[default]
    Lax,
    /// As lax, but repeated categories are rejected.
    Strict,
    /// Multiple Decision Profile, repeated-categories flavor: the
    /// cartesian product over instances of each repeated category.
    MultipleRepeatedCategories,
}

/// Split a request into individual decision requests.
///
/// # Errors
///
/// `SyntaxError` under the strict filter when a category repeats.
pub(crate) fn filter_request(
    filter: RequestFilterId,
    request: &DecisionRequest,
) -> EvalResult<Vec<IndividualRequest>> {
    match filter {
        RequestFilterId::Lax => Ok(vec![IndividualRequest {
            categories: request.categories.clone(),
            return_policy_id_list: request.return_policy_id_list,
        }]),
        RequestFilterId::Strict => {
            for (i, c) in request.categories.iter().enumerate() {
                if request.categories[..i].iter().any(|p| p.category == c.category) {
                    return Err(Indeterminate::syntax(format!(
                        "repeated attribute category {}",
                        c.category
                    )));
                }
            }
            Ok(vec![IndividualRequest {
                categories: request.categories.clone(),
                return_policy_id_list: request.return_policy_id_list,
            }])
        }
        RequestFilterId::MultipleRepeatedCategories => {
            // group instances per category, in document order of the
            // category's first appearance
            let mut groups: Vec<(String, Vec<&CategoryAttributes>)> = vec![];
            for c in &request.categories {
                match groups.iter_mut().find(|(name, _)| *name == c.category) {
                    Some((_, instances)) => instances.push(c),
                    None => groups.push((c.category.clone(), vec![c])),
                }
            }
            // cartesian product over the groups; the last repeated
            // category varies fastest
            let mut combinations: Vec<Vec<CategoryAttributes>> = vec![vec![]];
            for (_, instances) in &groups {
                let mut next = Vec::with_capacity(combinations.len() * instances.len());
                for partial in &combinations {
                    for inst in instances {
                        let mut extended = partial.clone();
                        extended.push((*inst).clone());
                        next.push(extended);
                    }
                }
                combinations = next;
            }
            Ok(combinations
                .into_iter()
                .map(|categories| IndividualRequest {
                    categories,
                    return_policy_id_list: request.return_policy_id_list,
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(category: &str, id: &str, v: &str) -> CategoryAttributes {
        CategoryAttributes::new(category)
            .attribute(RequestAttribute::new(id, Value::String(v.to_string())))
    }

    #[test]
    fn test_strict_rejects_repeats() {
        let req = DecisionRequest::new()
            .category(cat(categories::RESOURCE, "urn:example:id", "a"))
            .category(cat(categories::RESOURCE, "urn:example:id", "b"));
        assert!(filter_request(RequestFilterId::Strict, &req).is_err());
        assert_eq!(
            filter_request(RequestFilterId::Lax, &req).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_repeated_categories_split() {
        let req = DecisionRequest::new()
            .category(cat(categories::SUBJECT, "urn:example:user", "alice"))
            .category(cat(categories::RESOURCE, "urn:example:id", "a"))
            .category(cat(categories::RESOURCE, "urn:example:id", "b"))
            .category(cat(categories::ACTION, "urn:example:op", "read"));
        let individuals =
            filter_request(RequestFilterId::MultipleRepeatedCategories, &req).unwrap();
        assert_eq!(individuals.len(), 2);
        for ind in &individuals {
            // every individual request carries exactly one instance
            // of each category
            assert_eq!(ind.categories.len(), 3);
        }
        // document order: the "a" split comes first
        assert_eq!(individuals[0].categories[1].attributes[0].values[0]
            .print(), "a");
        assert_eq!(individuals[1].categories[1].attributes[0].values[0]
            .print(), "b");
    }
}
