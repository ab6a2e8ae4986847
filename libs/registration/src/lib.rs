//! Account registration: turns a submitted form into a validated [`User`]
//! or a map of field errors.

mod csrf;
mod hasher;
mod parser;

pub use csrf::{CsrfCheck, CsrfTokens, SessionCsrf};
pub use hasher::{Argon2Hasher, HashPassword};
pub use parser::{
    PASSWORD_MAX_CHARS, PASSWORD_MIN_CHARS, RegistrationError, RegistrationForm,
    RegistrationParser, User, ValidationErrors,
};
