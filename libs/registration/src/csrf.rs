use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Anything that can vouch for a submitted CSRF token.
pub trait CsrfCheck {
    fn verify(&self, token: &str) -> bool;
}

impl<F> CsrfCheck for F
where
    F: Fn(&str) -> bool,
{
    fn verify(&self, token: &str) -> bool {
        self(token)
    }
}

/// Session-bound CSRF tokens: `hex(HMAC-SHA256(secret, session_id))`.
///
/// ```
/// use gsm_registration::{CsrfCheck, CsrfTokens};
///
/// let tokens = CsrfTokens::new(b"server-secret");
/// let token = tokens.issue("session-1");
/// assert!(tokens.for_session("session-1").verify(&token));
/// assert!(!tokens.for_session("session-2").verify(&token));
/// ```
#[derive(Clone)]
pub struct CsrfTokens {
    secret: Vec<u8>,
}

impl std::fmt::Debug for CsrfTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfTokens").finish_non_exhaustive()
    }
}

impl CsrfTokens {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn issue(&self, session_id: &str) -> String {
        hex::encode(self.digest(session_id))
    }

    pub fn verify(&self, session_id: &str, token: &str) -> bool {
        let Ok(provided) = hex::decode(token.trim()) else {
            return false;
        };
        let expected = self.digest(session_id);
        provided.len() == expected.len() && bool::from(expected.ct_eq(&provided))
    }

    /// Binds the tokens to one session for use as a [`CsrfCheck`].
    pub fn for_session<'a>(&'a self, session_id: &'a str) -> SessionCsrf<'a> {
        SessionCsrf {
            tokens: self,
            session_id,
        }
    }

    fn digest(&self, session_id: &str) -> Vec<u8> {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(session_id.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionCsrf<'a> {
    tokens: &'a CsrfTokens,
    session_id: &'a str,
}

impl CsrfCheck for SessionCsrf<'_> {
    fn verify(&self, token: &str) -> bool {
        self.tokens.verify(self.session_id, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tampered_tokens_fail() {
        let tokens = CsrfTokens::new("secret");
        let mut token = tokens.issue("abc");
        assert_eq!(token.len(), 64);
        token.replace_range(0..2, if token.starts_with("00") { "11" } else { "00" });
        assert!(!tokens.verify("abc", &token));
        assert!(!tokens.verify("abc", "not-hex"));
        assert!(!tokens.verify("abc", ""));
    }

    #[test]
    fn different_secrets_issue_different_tokens() {
        let a = CsrfTokens::new("one").issue("s");
        let b = CsrfTokens::new("two").issue("s");
        assert_ne!(a, b);
    }
}
