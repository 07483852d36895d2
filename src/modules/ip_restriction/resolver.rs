//! Client address resolution.
//!
//! The forwarded-for header is taken at face value. Anyone can send it, so
//! deployments must have a trusted reverse proxy strip or overwrite it
//! before requests reach this filter. No proxy check is done here.

use std::collections::HashMap;

/// Default forwarded-for header name.
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Extracts the client address from request metadata.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    /// Honor the forwarded-for header.
    trust_forwarded_for: bool,

    /// Header name, compared case-insensitively.
    header: String,
}

impl AddressResolver {
    /// Create a resolver that trusts the standard forwarded-for header.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trust_forwarded_for: true,
            header: FORWARDED_FOR_HEADER.to_string(),
        }
    }

    /// Use a different header name.
    #[must_use]
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Enable or disable use of the forwarded-for header.
    #[must_use]
    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// Header name this resolver reads.
    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Resolve from an already-extracted forwarded-for value.
    ///
    /// A present, non-empty header yields its first comma-separated token,
    /// trimmed. Otherwise the peer address is used.
    #[must_use]
    pub fn resolve(&self, forwarded_for: Option<&str>, peer_address: &str) -> String {
        if self.trust_forwarded_for {
            if let Some(value) = forwarded_for.filter(|v| !v.is_empty()) {
                let first = value.split(',').next().unwrap_or_default();
                return first.trim().to_string();
            }
        }
        peer_address.to_string()
    }

    /// Resolve from a header map, looking the header up case-insensitively.
    #[must_use]
    pub fn resolve_from_headers(
        &self,
        headers: &HashMap<String, String>,
        peer_address: &str,
    ) -> String {
        let forwarded_for = self.find_header(headers);
        self.resolve(forwarded_for, peer_address)
    }

    /// Find the configured header in a map.
    #[must_use]
    pub fn find_header<'a>(&self, headers: &'a HashMap<String, String>) -> Option<&'a str> {
        headers
            .get(&self.header)
            .or_else(|| {
                headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(&self.header))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

impl Default for AddressResolver {
    fn default() -> Self {
        Self::new()
    }
}
