//! Per-scenario bearer session cache
//!
//! Tokens are obtained lazily per role and reused for the rest of the
//! scenario. Credential candidates are tried strictly in order; a non-admin
//! role whose candidates all fail falls back to the admin credentials once,
//! and that fallback is logged so a failure can be traced to the credential
//! path actually used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::Credentials;
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached bearer token
#[derive(Debug, Clone)]
pub struct Session {
    pub role: Role,
    pub token: String,
    /// Account that produced the token (differs from the role's own
    /// candidates when the admin fallback was used)
    pub username: String,
    pub obtained_at: DateTime<Utc>,
}

/// Which link of the credential chain produced a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialSource {
    Candidate(usize),
    AdminFallback,
}

/// Bearer tokens for one scenario, at most one per role
#[derive(Debug)]
pub struct AuthSessionCache {
    admin: Credentials,
    sessions: HashMap<Role, Session>,
    login_attempts: usize,
}

impl AuthSessionCache {
    /// `admin` is used for [`Self::admin_token`] and as the fallback chain's last link
    pub fn new(admin: Credentials) -> Self {
        Self {
            admin,
            sessions: HashMap::new(),
            login_attempts: 0,
        }
    }

    /// Token for `role`, logging in with `candidates` on first use
    pub async fn get_token(
        &mut self,
        api: &ApiClient,
        role: Role,
        candidates: &[Credentials],
    ) -> E2eResult<String> {
        if let Some(session) = self.sessions.get(&role) {
            debug!("Reusing cached {} session ({})", role, session.username);
            return Ok(session.token.clone());
        }

        if candidates.is_empty() {
            return Err(E2eError::Config(format!(
                "no credential candidates supplied for role '{}'",
                role
            )));
        }

        let mut chain: Vec<(CredentialSource, &Credentials)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (CredentialSource::Candidate(i), c))
            .collect();
        if role != Role::Admin {
            chain.push((CredentialSource::AdminFallback, &self.admin));
        }

        let mut last_status = 0;
        let mut last_body = String::new();

        for (source, credentials) in chain {
            if source == CredentialSource::AdminFallback {
                warn!(
                    "All {} credential candidates for role '{}' failed, falling back to admin '{}'",
                    candidates.len(),
                    role,
                    credentials.username
                );
            }

            self.login_attempts += 1;
            let response = api.login(credentials).await?;

            if response.status == 200 {
                if let Some(token) = response.token() {
                    info!(
                        "Authenticated role '{}' as '{}' ({:?})",
                        role, credentials.username, source
                    );
                    let session = Session {
                        role,
                        token: token.to_string(),
                        username: credentials.username.clone(),
                        obtained_at: Utc::now(),
                    };
                    let token = session.token.clone();
                    self.sessions.insert(role, session);
                    return Ok(token);
                }
            }

            debug!(
                "Login as '{}' failed: {} {}",
                credentials.username,
                response.status,
                response.snippet()
            );
            last_status = response.status;
            last_body = response.snippet();
        }

        Err(E2eError::AuthenticationUnavailable {
            role: role.to_string(),
            status: last_status,
            body: last_body,
        })
    }

    /// Admin token from the configured admin credentials
    pub async fn admin_token(&mut self, api: &ApiClient) -> E2eResult<String> {
        let admin = self.admin.clone();
        self.get_token(api, Role::Admin, std::slice::from_ref(&admin)).await
    }

    pub fn session(&self, role: Role) -> Option<&Session> {
        self.sessions.get(&role)
    }

    /// Drop the cached session for `role`; the next request logs in again
    pub fn invalidate(&mut self, role: Role) {
        self.sessions.remove(&role);
    }

    /// Number of login requests issued so far
    pub fn login_attempts(&self) -> usize {
        self.login_attempts
    }
}
