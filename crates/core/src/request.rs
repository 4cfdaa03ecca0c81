use serde::{Deserialize, Serialize};

/// Caller metadata recorded alongside security events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl RequestContext {
    /// Creates a context from optional client metadata.
    #[must_use]
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }

    /// Context for actions that originate inside the process.
    #[must_use]
    pub fn internal() -> Self {
        Self::default()
    }

    /// Returns the client IP address, if known.
    #[must_use]
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// Returns the client user agent, if known.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}
