//! Session state machine: login, liveness verification, logout.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::error::{Result, XhsError};

use super::SessionStore;

/// Liveness state of the session.
///
/// `Authenticated` guarantees a non-empty cookie is loaded into the API
/// client; it does not guarantee the platform still accepts it - only
/// [`SessionManager::verify`] settles that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
    Expired,
}

/// Owns the session for the process lifetime.
///
/// The persisted cookie file is the only state surviving process exit; it is
/// read once at construction and written after login or removed on
/// logout/expiry.
pub struct SessionManager {
    api: Arc<ApiClient>,
    store: SessionStore,
    state: SessionState,
}

impl SessionManager {
    /// Build a manager from the first cookie found.
    ///
    /// Priority: explicit cookie > cookie loaded from the store > none. A
    /// found cookie starts the session as `Authenticated` optimistically;
    /// `verify` settles whether the platform still accepts it.
    pub fn load_or_anonymous(
        api: Arc<ApiClient>,
        store: SessionStore,
        cookie: Option<String>,
    ) -> Self {
        let cookie = cookie.or_else(|| {
            let stored = store.load();
            if stored.is_some() {
                tracing::info!("loaded saved session");
            }
            stored
        });

        let state = if cookie.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        };
        api.set_cookie(cookie);

        Self { api, store, state }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Phone-number login: dispatch an SMS code, block on `read_code` for the
    /// interactive entry, exchange it for a session cookie, and persist it.
    ///
    /// Returns `false` on any failure; the cause is logged, never retried.
    pub async fn login_by_phone<F>(&mut self, phone: &str, read_code: F) -> bool
    where
        F: FnOnce() -> std::io::Result<String>,
    {
        match self.try_login(phone, read_code).await {
            Ok(()) => {
                self.state = SessionState::Authenticated;
                tracing::info!("login succeeded");
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "login failed");
                false
            }
        }
    }

    async fn try_login<F>(&mut self, phone: &str, read_code: F) -> Result<()>
    where
        F: FnOnce() -> std::io::Result<String>,
    {
        self.api.send_code(phone).await?;
        tracing::info!(phone, "verification code sent");

        let code = read_code().map_err(XhsError::Io)?;
        let mobile_token = self.api.check_code(phone, code.trim()).await?;
        self.api.login_code(phone, &mobile_token).await?;

        // The login response refreshed the client cookie; persist it so the
        // next run can skip login entirely.
        if let Some(cookie) = self.api.cookie() {
            self.store.save(&cookie)?;
            tracing::info!("session saved");
        }

        Ok(())
    }

    /// Probe whether the session is still accepted by the platform.
    ///
    /// Anything other than `Authenticated` answers `false` without touching
    /// the network. A failed probe invalidates the session: the state becomes
    /// `Expired` and the persisted cookie is deleted, since an expired cookie
    /// must not be reused. The probe itself stays quiet - response bodies are
    /// only ever logged at trace level.
    pub async fn verify(&mut self) -> bool {
        if self.state != SessionState::Authenticated {
            return false;
        }

        match self.api.get_self_info().await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "session expired");
                self.store.clear();
                self.api.set_cookie(None);
                self.state = SessionState::Expired;
                false
            }
        }
    }

    /// Drop the session: delete the persisted cookie and reset to
    /// `Anonymous`, whatever the prior state.
    pub fn logout(&mut self) {
        self.store.clear();
        self.api.set_cookie(None);
        self.state = SessionState::Anonymous;
    }
}
