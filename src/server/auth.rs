//! SOCKS5 authentication for the server
//!
//! Method selection and the RFC 1929 credential check.

use crate::protocol::consts::{SOCKS5_AUTH_METHOD_NONE, SOCKS5_AUTH_METHOD_PASSWORD};
use crate::protocol::AuthMethod;
use std::collections::HashMap;
use std::fmt::Debug;

/// Checks username/password pairs
///
/// Shared read-only by every connection the server handles.
pub trait CredentialVerifier: Debug + Send + Sync + 'static {
    /// Whether the pair is accepted
    fn verify(&self, username: &[u8], password: &[u8]) -> bool;

    /// Whether clients must authenticate at all
    fn requires_auth(&self) -> bool;
}

/// Fixed username to password map
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<Vec<u8>, Vec<u8>>,
}

impl StaticCredentials {
    /// Build from a username to password map
    pub fn new<I, U, P>(users: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<Vec<u8>>,
        P: Into<Vec<u8>>,
    {
        StaticCredentials {
            users: users
                .into_iter()
                .map(|(u, p)| (u.into(), p.into()))
                .collect(),
        }
    }

    /// No users, anonymous access only
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &[u8], password: &[u8]) -> bool {
        // Unknown user and wrong password are the same outcome
        self.users
            .get(username)
            .is_some_and(|expected| expected.as_slice() == password)
    }

    fn requires_auth(&self) -> bool {
        !self.users.is_empty()
    }
}

/// Pick the method to answer a greeting with
///
/// With credentials configured only USERNAME_PASSWORD is acceptable,
/// otherwise only NONE. `None` means reply 0xFF.
pub fn select_method(offered: &[u8], requires_auth: bool) -> Option<AuthMethod> {
    if requires_auth {
        offered
            .contains(&SOCKS5_AUTH_METHOD_PASSWORD)
            .then_some(AuthMethod::UsernamePassword)
    } else {
        offered
            .contains(&SOCKS5_AUTH_METHOD_NONE)
            .then_some(AuthMethod::None)
    }
}
