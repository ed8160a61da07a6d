use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque bearer credential returned by the OAuth token exchange.
///
/// `Debug` is redacted so the token never leaks into `tracing` output;
/// use [`AccessToken::secret`] where the raw value is actually needed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([redacted])")
    }
}

impl From<String> for AccessToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secret() {
        let token = AccessToken::new("gho_supersecret");
        let dbg = format!("{token:?}");
        assert!(!dbg.contains("supersecret"));
        assert_eq!(token.secret(), "gho_supersecret");
    }

    #[test]
    fn serializes_as_plain_string() {
        let token = AccessToken::new("abc");
        assert_eq!(serde_json::to_string(&token).unwrap(), r#""abc""#);
        let back: AccessToken = serde_json::from_str(r#""abc""#).unwrap();
        assert_eq!(back, token);
    }
}
