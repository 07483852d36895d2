//! Response handed back to the host for denied requests.

use super::config::ForbiddenResponseConfig;
use super::error::{RestrictionError, RestrictionResult};
use bytes::Bytes;
use http::StatusCode;

/// A denial response. Carries no detail about which rule fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenResponse {
    status: StatusCode,
    content_type: String,
    body: Bytes,
}

impl ForbiddenResponse {
    /// Create a response.
    #[must_use]
    pub fn new(
        status: StatusCode,
        content_type: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Build from configuration.
    pub fn from_config(config: &ForbiddenResponseConfig) -> RestrictionResult<Self> {
        config.validate().map_err(RestrictionError::InvalidConfig)?;
        let status = StatusCode::from_u16(config.status).map_err(|e| {
            RestrictionError::InvalidConfig(format!("forbidden_response.status: {e}"))
        })?;
        Ok(Self::new(
            status,
            config.content_type.clone(),
            Bytes::from(config.body.clone()),
        ))
    }

    /// HTTP status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Content type header value.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Response body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

impl Default for ForbiddenResponse {
    fn default() -> Self {
        let config = ForbiddenResponseConfig::default();
        Self::new(
            StatusCode::FORBIDDEN,
            config.content_type,
            Bytes::from(config.body),
        )
    }
}
