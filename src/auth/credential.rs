use std::fmt;
use time::OffsetDateTime;

/// Seconds before the reported expiry at which a credential is treated as expired.
const EXPIRY_SKEW_SECONDS: i64 = 30;

/// Access credential obtained from the authorization flow.
///
/// Owned by the session that completed the flow and passed explicitly into every file source
/// call. The token itself is never printed by `Debug`.
#[derive(Clone)]
pub struct Credential {
    access_token: String,
    expires_at: Option<OffsetDateTime>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

impl Credential {
    /// Wrap an access token and its optional expiry instant.
    pub fn new(access_token: impl Into<String>, expires_at: Option<OffsetDateTime>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
            refresh_token: None,
            scope: None,
        }
    }

    pub(crate) fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token.filter(|token| !token.is_empty());
        self
    }

    pub(crate) fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Bearer token sent to the provider.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Expiry instant reported by the provider, if any.
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    /// Scope string granted by the provider, if reported.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Whether the provider issued a refresh token alongside the access token.
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Whether the credential is expired at `now`, allowing a small clock skew.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        match self.expires_at {
            Some(expires_at) => now + time::Duration::seconds(EXPIRY_SKEW_SECONDS) >= expires_at,
            None => false,
        }
    }

    /// Whether the credential can still be used.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired_at(OffsetDateTime::now_utc())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_without_expiry_stays_valid() {
        let credential = Credential::new("token", None);
        assert!(credential.is_valid());
    }

    #[test]
    fn credential_expires_with_skew() {
        let now = OffsetDateTime::now_utc();
        let credential = Credential::new("token", Some(now + time::Duration::seconds(10)));
        assert!(credential.is_expired_at(now));

        let fresh = Credential::new("token", Some(now + time::Duration::minutes(30)));
        assert!(!fresh.is_expired_at(now));
        assert!(fresh.is_valid());
    }

    #[test]
    fn empty_token_is_invalid() {
        assert!(!Credential::new("", None).is_valid());
    }

    #[test]
    fn debug_output_redacts_token() {
        let credential = Credential::new("secret-token", None);
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
