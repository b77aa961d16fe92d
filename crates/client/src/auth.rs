//! Login, registration and logout.
//!
//! Input is validated before anything is sent; a successful login hands the
//! issued token to the [`SessionStore`], which in turn unloads the cart.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument, warn};

use shopfront_core::Email;

use crate::api::CommerceApi;
use crate::error::{ClientError, Result};
use crate::session::{Session, SessionStore};

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Display name used when the service does not return one.
pub const DEFAULT_DISPLAY_NAME: &str = "User";

pub struct AuthService<A> {
    api: Arc<A>,
    session: SessionStore,
}

impl<A: CommerceApi> AuthService<A> {
    #[must_use]
    pub const fn new(api: Arc<A>, session: SessionStore) -> Self {
        Self { api, session }
    }

    /// Log in and start a session.
    ///
    /// # Errors
    ///
    /// `Validation` if a field is blank or the email is malformed; `Auth`
    /// if the credentials are rejected or no token is issued; `Network`.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<Session> {
        let email = required_email(email)?;
        if password.expose_secret().is_empty() {
            return Err(ClientError::Validation("password is required".to_string()));
        }

        let response = self
            .api
            .login(&email, password)
            .await
            .inspect_err(|e| warn!(error = %e, "login failed"))?;

        let token = response
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ClientError::Auth("no token issued".to_string()))?;
        let display_name = response
            .full_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        let session = Session::new(token, display_name);
        self.session.login(session.clone());
        Ok(session)
    }

    /// Create an account. Does not log in.
    ///
    /// # Errors
    ///
    /// `Validation` if a field is blank, the email is malformed or the
    /// password is shorter than [`MIN_PASSWORD_LENGTH`]; `Network` otherwise.
    #[instrument(skip(self, full_name, password))]
    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<()> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(ClientError::Validation("full name is required".to_string()));
        }
        let email = required_email(email)?;
        if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ClientError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        self.api
            .register(full_name, &email, password)
            .await
            .inspect_err(|e| warn!(error = %e, "registration failed"))?;

        info!(email = %email, "account registered");
        Ok(())
    }

    /// End the session. Idempotent.
    pub fn logout(&self) {
        self.session.logout();
    }
}

fn required_email(email: &str) -> Result<Email> {
    if email.trim().is_empty() {
        return Err(ClientError::Validation("email is required".to_string()));
    }
    Ok(Email::parse(email)?)
}
