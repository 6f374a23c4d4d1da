//! Watch descriptors.
//!
//! A watch-list entry names one logical request the pilot cares about and how
//! its matched response body should be serialized before republication.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Serialization
// ============================================================================

/// How a matched response body is serialized into the intercepted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Serialization {
    /// Parse the body as JSON; a parse failure drops the record.
    Json,
    /// Take the body as UTF-8 text.
    Text,
    /// Encode the body as a `data:<content-type>;base64,...` URI.
    DataUri,
}

impl Serialization {
    /// Returns the wire spelling of this mode.
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::DataUri => "dataUri",
        }
    }

    /// Parses the wire spelling; unknown spellings yield `None`.
    #[inline]
    #[must_use]
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            "dataUri" => Some(Self::DataUri),
            _ => None,
        }
    }
}

/// Deserializes a serialization mode, mapping unknown spellings to `None`.
///
/// The failure is deferred: a descriptor without a usable mode still loads,
/// and the interceptor reports the problem when (and only when) that
/// descriptor actually matches a request.
fn lenient_serialization<'de, D>(deserializer: D) -> Result<Option<Serialization>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Serialization::from_str_lenient))
}

// ============================================================================
// WatchDescriptor
// ============================================================================

/// One entry of the interception watch-list.
///
/// Descriptors are consulted in list order; the first whose method and URL
/// pattern match a request claims it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchDescriptor {
    /// Logical identifier the pilot awaits this request under.
    pub identifier: String,
    /// URL pattern: full URL when `exact`, substring otherwise.
    pub url: String,
    /// HTTP method to match, compared case-insensitively.
    pub method: String,
    /// Whether `url` must equal the request URL exactly.
    #[serde(default)]
    pub exact: bool,
    /// Response body serialization mode.
    ///
    /// `None` (absent or unrecognized on the wire) makes any match of this
    /// descriptor an error at interception time.
    #[serde(default, deserialize_with = "lenient_serialization")]
    pub serialization: Option<Serialization>,
}

impl WatchDescriptor {
    /// Creates a substring-matching descriptor without a serialization mode.
    #[must_use]
    pub fn new(
        identifier: impl Into<String>,
        url: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            url: url.into(),
            method: method.into(),
            exact: false,
            serialization: None,
        }
    }

    /// Sets exact URL matching.
    #[inline]
    #[must_use]
    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    /// Sets the serialization mode.
    #[inline]
    #[must_use]
    pub fn with_serialization(mut self, serialization: Serialization) -> Self {
        self.serialization = Some(serialization);
        self
    }

    /// Tests whether this descriptor claims the given request.
    #[must_use]
    pub fn matches(&self, method: &str, url: &str) -> bool {
        if !self.method.eq_ignore_ascii_case(method) {
            return false;
        }
        if self.exact {
            self.url == url
        } else {
            url.contains(&self.url)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
