//! Fields read from D&B Direct+ and GLEIF documents
//!
//! Responses are handled as opaque JSON documents. The few fields the
//! orchestration makes decisions on are read through the structs and helpers
//! here; everything else passes through untouched.

use crate::orchestrator::constants::{BUSINESS_SUBJECT_TYPE, DUNS_ID_TYPE_CODE};
use serde::Deserialize;
use serde_json::Value;

/// A principal referenced by an organization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalRef {
    /// Display name of the principal
    #[serde(default)]
    pub full_name: Option<String>,
    /// `Individuals` or `Businesses`
    #[serde(default)]
    pub subject_type: Option<String>,
    /// Identifiers of the principal, tagged by type
    #[serde(default)]
    pub id_numbers: Option<Vec<IdNumber>>,
}

/// One identifier of a principal
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IdNumber {
    /// The identifier value
    #[serde(default)]
    pub id_number: Option<String>,
    /// What kind of identifier this is
    #[serde(default)]
    pub id_type: Option<IdType>,
}

/// Identifier type
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IdType {
    /// D&B code of the identifier type
    #[serde(default)]
    pub dnb_code: Option<i64>,
}

impl PrincipalRef {
    /// Read the fields from a principal entry, tolerating missing ones
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Whether the principal is a business
    pub fn is_business(&self) -> bool {
        self.subject_type.as_deref() == Some(BUSINESS_SUBJECT_TYPE)
    }

    /// First non-empty identifier of the given type
    pub fn identifier(&self, type_code: i64) -> Option<&str> {
        self.id_numbers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|id| id.id_type.as_ref().and_then(|t| t.dnb_code) == Some(type_code))
            .filter_map(|id| id.id_number.as_deref())
            .map(str::trim)
            .find(|id| !id.is_empty())
    }

    /// DUNS of the principal, if it is a business that has one
    pub fn duns(&self) -> Option<&str> {
        self.identifier(DUNS_ID_TYPE_CODE)
    }
}

/// A registration number of an organization
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RegistrationNumber {
    #[serde(default)]
    registration_number: Option<String>,
    #[serde(default, rename = "typeDnBCode")]
    type_dnb_code: Option<i64>,
}

/// Error message reported by the remote, if the document carries one
///
/// D&B reports errors as `{"error": {"errorCode", "errorMessage"}}`.
pub fn remote_error(doc: &Value) -> Option<String> {
    let error = doc.get("error").filter(|e| !e.is_null())?;
    let message = error
        .get("errorMessage")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    match error.get("errorCode").and_then(Value::as_str) {
        Some(code) => Some(format!("{} ({})", message, code)),
        None => Some(message),
    }
}

/// Number of entries in the candidate list named `field` (0 when missing)
pub fn candidate_count(doc: &Value, field: &str) -> usize {
    doc.get(field)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// The `organization` object of a data blocks response
pub fn organization(doc: &Value) -> Option<&Value> {
    doc.get("organization").filter(|org| org.is_object())
}

/// DUNS of an organization
pub fn organization_duns(org: &Value) -> Option<&str> {
    org.get("duns").and_then(Value::as_str)
}

/// "Primary name (locality)" label of an organization
pub fn organization_label(org: &Value) -> String {
    let name = org
        .get("primaryName")
        .and_then(Value::as_str)
        .unwrap_or("(unknown)");
    match org
        .pointer("/primaryAddress/addressLocality/name")
        .and_then(Value::as_str)
    {
        Some(locality) => format!("{} ({})", name, locality),
        None => name.to_string(),
    }
}

/// Principal entries of an organization: most senior first, then current
pub fn principals(org: &Value) -> impl Iterator<Item = &Value> {
    ["mostSeniorPrincipals", "currentPrincipals"]
        .into_iter()
        .filter_map(move |field| org.get(field).and_then(Value::as_array))
        .flatten()
}

/// DUNS of the business principals of an organization, deduplicated, in order
pub fn business_principal_duns(org: &Value) -> Vec<String> {
    let mut seen = Vec::new();
    for principal in principals(org) {
        let principal = PrincipalRef::from_value(principal);
        if !principal.is_business() {
            continue;
        }
        if let Some(duns) = principal.duns() {
            if !seen.iter().any(|s: &String| s == duns) {
                seen.push(duns.to_string());
            }
        }
    }
    seen
}

/// First registration number of the given type
pub fn registration_number(org: &Value, type_code: i64) -> Option<String> {
    let numbers: Vec<RegistrationNumber> = org
        .get("registrationNumbers")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    numbers
        .into_iter()
        .filter(|n| n.type_dnb_code == Some(type_code))
        .find_map(|n| n.registration_number.filter(|r| !r.is_empty()))
}

/// LEI of the first record in a GLEIF `lei-records` response
pub fn first_lei(doc: &Value) -> Option<String> {
    doc.pointer("/data/0/attributes/lei")
        .and_then(Value::as_str)
        .map(str::to_string)
}
