use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated end user, keyed by the login provider's subject identifier.
///
/// `external_id` is unique across identities. `email` is not: providers let
/// users change it, so it is refreshed on every login but never used as a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Store-assigned primary key
    pub id: i64,
    /// Stable subject identifier issued by the login provider
    pub external_id: String,
    pub email: String,
    /// Display name (editable from the settings page)
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    pub verified_email: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Verified identity returned by an identity provider after the code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderProfile {
    #[serde(rename = "id")]
    pub external_id: String,
    pub email: String,
    #[serde(default)]
    pub verified_email: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub given_name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub family_name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub picture: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub locale: Option<String>,
}

/// Providers send `""` for absent optional fields; store those as `None`.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
