use crate::hashing::sha256_hex;
use flatshop_types::digits_only;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A delivery address, keyed by [`Address::content_hash`] in the `addresses` collection.
///
/// Addresses are immutable: editing an address means storing a new one under a new hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    /// Neighbourhood.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neigh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Postal code (CEP), digits only once normalised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn field_or<'a>(value: &'a Option<String>, placeholder: &'a str) -> &'a str {
    value.as_deref().filter(|v| !v.is_empty()).unwrap_or(placeholder)
}

impl Address {
    /// Reduces the postal code to digits and drops blank fields.
    pub fn normalised(self) -> Self {
        Self {
            line1: blank_to_none(self.line1),
            line2: blank_to_none(self.line2),
            neigh: blank_to_none(self.neigh),
            city: blank_to_none(self.city),
            state: blank_to_none(self.state),
            code: blank_to_none(self.code.map(|c| digits_only(&c))),
        }
    }

    /// SHA-256 over the six fields in a fixed order.
    ///
    /// A missing or empty field contributes its own name instead, so two addresses with the
    /// same values (including the same gaps) always share a key.
    pub fn content_hash(&self) -> String {
        let to_hash = [
            field_or(&self.line1, "line1"),
            field_or(&self.line2, "line2"),
            field_or(&self.neigh, "neigh"),
            field_or(&self.city, "city"),
            field_or(&self.state, "state"),
            field_or(&self.code, "code"),
        ]
        .concat();
        sha256_hex(&to_hash)
    }

    /// First required field that is missing; `line2` is the only optional field.
    pub fn missing_required(&self) -> Option<&'static str> {
        [
            ("line1", &self.line1),
            ("neigh", &self.neigh),
            ("city", &self.city),
            ("state", &self.state),
            ("code", &self.code),
        ]
        .into_iter()
        .find(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| name)
    }

    /// Postal code rendered as `NNNNN-NNN` when it has the usual eight digits.
    pub fn formatted_code(&self) -> Option<String> {
        let code = self.code.as_deref()?;
        if code.len() == 8 && code.bytes().all(|b| b.is_ascii_digit()) {
            return Some(format!("{}-{}", &code[..5], &code[5..]));
        }
        Some(code.to_owned())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.formatted_code();
        let city_state = match (self.city.as_deref(), self.state.as_deref()) {
            (Some(city), Some(state)) => Some(format!("{city}/{state}")),
            (city, state) => city.or(state).map(str::to_owned),
        };
        let parts: Vec<&str> = [
            self.line1.as_deref(),
            self.line2.as_deref(),
            self.neigh.as_deref(),
            city_state.as_deref(),
            code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();
        write!(f, "{}", parts.join(", "))
    }
}
