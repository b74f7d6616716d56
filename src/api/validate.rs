//! Form input for creating or updating proposals and clients.
//!
//! Validation failures are returned as a per-field map so a form can mark
//! each offending input, never as a single opaque error string.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::model::{Pricing, Proposal, ProposalStatus};

/// Field name → human-readable messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("This field is required".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProposalInput {
    #[validate(custom(function = "not_blank"))]
    pub title: String,
    #[validate(custom(function = "not_blank"))]
    pub client: String,
    #[serde(default)]
    pub status: Option<ProposalStatus>,
    #[serde(default)]
    #[validate(length(equal = 3, message = "Use a three-letter currency code"))]
    pub currency: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0, message = "Tax rate must be between 0 and 100"))]
    pub tax_rate: Option<f64>,
}

impl ProposalInput {
    /// A fresh proposal from validated input.
    pub fn into_proposal(self) -> Proposal {
        let mut proposal = Proposal::new(self.title.trim(), self.client.trim());
        if let Some(status) = self.status {
            proposal.status = status;
        }
        proposal.pricing = Pricing {
            currency: self
                .currency
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or_else(|| Pricing::default().currency),
            tax_rate: self.tax_rate.unwrap_or(0.0),
            items: vec![],
        };
        proposal
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClientInput {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address"))]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    #[validate(length(max = 32, message = "Phone number is too long"))]
    pub phone: Option<String>,
}

fn to_field_errors(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(m) => m.to_string(),
                    None => format!("Invalid value ({})", e.code),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

/// Validate any input, returning its field errors (empty when valid).
pub fn field_errors<T: Validate>(input: &T) -> FieldErrors {
    match input.validate() {
        Ok(()) => FieldErrors::new(),
        Err(e) => to_field_errors(&e),
    }
}
