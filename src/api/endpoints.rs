//! Credential classification for outgoing calls
//!
//! Rules, first match wins:
//! 1. authenticated overrides (public-looking paths that continue an
//!    authenticated flow, e.g. finishing a registration)
//! 2. public auth prefixes (login, register, oauth, refresh, password reset,
//!    email verification)
//! 3. everything else requires a credential

/// Auth endpoints that must never carry a bearer token
pub const PUBLIC_AUTH_PREFIXES: &[&str] = &[
    "/auth/login/",
    "/auth/register/",
    "/auth/oauth/",
    "/auth/refresh/",
    "/auth/password-reset/",
    "/auth/verify-email/",
];

/// Paths under a public prefix that still require a credential
pub const AUTHENTICATED_OVERRIDES: &[&str] = &["/auth/register/complete/"];

/// Whether a call carries the access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Never attach a credential
    Public,
    /// Attach the access token when one exists
    Authenticated,
}

/// Path tables used by the request interceptor
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    public_prefixes: Vec<String>,
    authenticated_overrides: Vec<String>,
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        Self::new(PUBLIC_AUTH_PREFIXES, AUTHENTICATED_OVERRIDES)
    }
}

impl EndpointPolicy {
    pub fn new(public_prefixes: &[&str], authenticated_overrides: &[&str]) -> Self {
        Self {
            public_prefixes: public_prefixes.iter().map(|p| normalize_path(p)).collect(),
            authenticated_overrides: authenticated_overrides
                .iter()
                .map(|p| normalize_path(p))
                .collect(),
        }
    }

    pub fn classify(&self, path: &str) -> Access {
        let path = normalize_path(path);

        if self
            .authenticated_overrides
            .iter()
            .any(|o| path.starts_with(o.as_str()))
        {
            return Access::Authenticated;
        }

        if self
            .public_prefixes
            .iter()
            .any(|p| path.starts_with(p.as_str()))
        {
            return Access::Public;
        }

        Access::Authenticated
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.classify(path) == Access::Public
    }
}

/// Strip query and fragment, ensure a leading slash
pub fn normalize_path(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = path[..end].trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
