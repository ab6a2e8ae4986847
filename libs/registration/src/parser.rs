use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::csrf::CsrfCheck;
use crate::hasher::{Argon2Hasher, HashPassword};

pub const PASSWORD_MIN_CHARS: usize = 7;
/// Longest password accepted; matches the input limit of common password hashes.
pub const PASSWORD_MAX_CHARS: usize = 72;

/// Raw registration payload as submitted.
#[derive(Clone, Default, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub csrf: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub verify_email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for RegistrationForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationForm")
            .field("email", &self.email)
            .field("verify_email", &self.verify_email)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl RegistrationForm {
    /// Builds a form from `name=value` pairs; unknown names are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut form = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "csrf" => &mut form.csrf,
                "email" => &mut form.email,
                "verify_email" => &mut form.verify_email,
                "username" => &mut form.username,
                "password" => &mut form.password,
                _ => continue,
            };
            *slot = Some(value.into());
        }
        form
    }
}

/// Validated account record. The password is only ever held as a hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

/// Field name -> first failing rule for that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("registration rejected: {0}")]
    Validation(ValidationErrors),
    #[error("{0}")]
    Hash(String),
}

impl RegistrationError {
    pub fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            RegistrationError::Validation(errors) => Some(errors),
            RegistrationError::Hash(_) => None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Validates registration payloads and hashes the password of accepted ones.
pub struct RegistrationParser<C, H = Argon2Hasher> {
    csrf: C,
    hasher: H,
}

impl<C: CsrfCheck> RegistrationParser<C> {
    pub fn new(csrf: C) -> Self {
        Self {
            csrf,
            hasher: Argon2Hasher,
        }
    }
}

impl<C: CsrfCheck, H: HashPassword> RegistrationParser<C, H> {
    pub fn with_hasher<H2: HashPassword>(self, hasher: H2) -> RegistrationParser<C, H2> {
        RegistrationParser {
            csrf: self.csrf,
            hasher,
        }
    }

    /// Collects every field error before failing; a password is hashed only
    /// once the whole form is valid.
    pub fn parse(&self, form: RegistrationForm) -> Result<User, RegistrationError> {
        let mut errors = ValidationErrors::default();

        match non_empty(&form.csrf) {
            None => errors.add("csrf", "csrf token is required"),
            Some(token) if !self.csrf.verify(token) => errors.add("csrf", "csrf token is invalid"),
            Some(_) => {}
        }

        let email = non_empty(&form.email);
        if email.is_none() {
            errors.add("email", "email is required");
        }
        let verify_email = form.verify_email.as_deref().map(str::trim).unwrap_or_default();
        if verify_email != email.unwrap_or_default() {
            errors.add("verify_email", "email addresses do not match");
        }

        let username = non_empty(&form.username);
        if username.is_none() {
            errors.add("username", "username is required");
        }

        // Passwords are taken verbatim: surrounding whitespace counts.
        let password = form.password.as_deref().unwrap_or_default();
        let length = password.chars().count();
        if password.is_empty() {
            errors.add("password", "password is required");
        } else if length < PASSWORD_MIN_CHARS {
            errors.add(
                "password",
                format!("password must be at least {PASSWORD_MIN_CHARS} characters"),
            );
        } else if length > PASSWORD_MAX_CHARS {
            errors.add(
                "password",
                format!("password must be at most {PASSWORD_MAX_CHARS} characters"),
            );
        }

        let (Some(email), Some(username), true) = (email, username, errors.is_empty()) else {
            tracing::debug!(fields = %errors, "registration rejected");
            return Err(RegistrationError::Validation(errors));
        };

        let password_hash = self.hasher.hash(password).map_err(RegistrationError::Hash)?;
        Ok(User {
            email: email.to_string(),
            username: username.to_string(),
            password_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept_all(_: &str) -> bool {
        true
    }

    fn form(password: &str) -> RegistrationForm {
        RegistrationForm::from_pairs([
            ("csrf", "token"),
            ("email", "a@b.com"),
            ("verify_email", "a@b.com"),
            ("username", "alice"),
            ("password", password),
        ])
    }

    struct FailingHasher;

    impl HashPassword for FailingHasher {
        fn hash(&self, _password: &str) -> Result<String, String> {
            Err("hasher offline".into())
        }
    }

    #[test]
    fn empty_form_reports_every_field() {
        let parser = RegistrationParser::new(accept_all);
        let err = parser.parse(RegistrationForm::default()).unwrap_err();
        let errors = err.validation().unwrap();
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec!["csrf", "email", "password", "username"]
        );
        assert_eq!(errors.get("password"), Some("password is required"));
    }

    #[test]
    fn password_bounds_count_characters() {
        let parser = RegistrationParser::new(accept_all).with_hasher(StubHasher);
        assert!(parser.parse(form(&"é".repeat(72))).is_ok());
        let err = parser.parse(form(&"é".repeat(73))).unwrap_err();
        assert_eq!(
            err.validation().unwrap().get("password"),
            Some("password must be at most 72 characters")
        );
    }

    #[test]
    fn only_first_rule_per_field_is_reported() {
        let parser = RegistrationParser::new(|_: &str| false);
        let mut input = form("short");
        input.csrf = None;
        let err = parser.parse(input).unwrap_err();
        let errors = err.validation().unwrap();
        assert_eq!(errors.get("csrf"), Some("csrf token is required"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn hash_failures_are_not_validation_errors() {
        let parser = RegistrationParser::new(accept_all).with_hasher(FailingHasher);
        let err = parser.parse(form("sevenchr")).unwrap_err();
        assert!(matches!(err, RegistrationError::Hash(ref msg) if msg == "hasher offline"));
        assert!(err.validation().is_none());
    }

    #[test]
    fn debug_output_hides_the_password() {
        let rendered = format!("{:?}", form("hunter22"));
        assert!(!rendered.contains("hunter22"));
        assert!(rendered.contains("<redacted>"));
    }

    struct StubHasher;

    impl HashPassword for StubHasher {
        fn hash(&self, password: &str) -> Result<String, String> {
            Ok(format!("stub${}", password.len()))
        }
    }
}
