//! Session manager: login, single-flight re-authentication and logout

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::error::{FmgError, Result};
use crate::protocol::{Method, Target};
use crate::sanitize::REDACTED;
use crate::transport::RpcTransport;

const LOGIN_URL: &str = "/sys/login/user";
const LOGOUT_URL: &str = "/sys/logout";

/// Credential material attached to one request
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMaterial {
    /// Only used for the login request itself
    Anonymous,
    Bearer(String),
    Session(String),
}

impl AuthMaterial {
    pub fn session_id(&self) -> Option<String> {
        match self {
            AuthMaterial::Session(sid) => Some(sid.clone()),
            _ => None,
        }
    }

    pub fn bearer(&self) -> Option<&str> {
        match self {
            AuthMaterial::Bearer(token) => Some(token),
            _ => None,
        }
    }
}

impl fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMaterial::Anonymous => f.write_str("Anonymous"),
            AuthMaterial::Bearer(_) => write!(f, "Bearer({})", REDACTED),
            AuthMaterial::Session(_) => write!(f, "Session({})", REDACTED),
        }
    }
}

/// Credentials for one request plus the session generation they belong to
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub auth: AuthMaterial,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    active: bool,
    session_id: Option<String>,
    generation: u64,
}

/// Owns the authentication state of one client.
///
/// Every issued session id gets a new generation number. Callers that see
/// `SessionExpired` pass the generation they used to [`refresh`](Self::refresh);
/// only the first of a concurrent burst logs in again, the rest pick up the
/// new id.
pub struct SessionManager {
    transport: Arc<RpcTransport>,
    credentials: Credentials,
    state: RwLock<SessionState>,
    relogin: Mutex<()>,
}

impl SessionManager {
    pub fn new(transport: Arc<RpcTransport>, credentials: Credentials) -> Self {
        Self {
            transport,
            credentials,
            state: RwLock::new(SessionState::default()),
            relogin: Mutex::new(()),
        }
    }

    pub fn mode(&self) -> &'static str {
        self.credentials.mode()
    }

    pub fn is_active(&self) -> bool {
        self.state.read().active
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Establish the session.
    ///
    /// Token mode only checks the token's shape; the appliance validates it
    /// on the first real request.
    pub async fn login(&self) -> Result<()> {
        match &self.credentials {
            Credentials::Token { token } => {
                validate_token(token)?;
                let mut state = self.state.write();
                state.active = true;
                state.generation += 1;
                info!("Using API token authentication");
            }
            Credentials::Password { username, .. } => {
                let _guard = self.relogin.lock().await;
                let sid = self.password_login().await?;
                let mut state = self.state.write();
                state.active = true;
                state.session_id = Some(sid);
                state.generation += 1;
                info!(user = %username, "Logged in");
            }
        }
        Ok(())
    }

    /// Current credentials; logs in again if the session id was dropped.
    pub async fn ensure_valid(&self) -> Result<SessionToken> {
        let stale = {
            let state = self.state.read();
            if !state.active {
                return Err(FmgError::NotConnected);
            }
            match (&self.credentials, &state.session_id) {
                (Credentials::Token { token }, _) => {
                    return Ok(SessionToken {
                        auth: AuthMaterial::Bearer(token.clone()),
                        generation: state.generation,
                    })
                }
                (Credentials::Password { .. }, Some(sid)) => {
                    return Ok(SessionToken {
                        auth: AuthMaterial::Session(sid.clone()),
                        generation: state.generation,
                    })
                }
                (Credentials::Password { .. }, None) => state.generation,
            }
        };
        self.refresh(stale).await
    }

    /// Replace a session id the appliance reported as expired.
    ///
    /// `stale_generation` is the generation the failed request used. If a
    /// concurrent caller already replaced it, no login is issued.
    pub async fn refresh(&self, stale_generation: u64) -> Result<SessionToken> {
        if matches!(self.credentials, Credentials::Token { .. }) {
            return Err(FmgError::Authentication(
                "API token was rejected by the appliance".to_string(),
            ));
        }

        let _guard = self.relogin.lock().await;

        {
            let state = self.state.read();
            if !state.active {
                return Err(FmgError::NotConnected);
            }
            if state.generation != stale_generation {
                if let Some(sid) = &state.session_id {
                    debug!(generation = state.generation, "Session already refreshed");
                    return Ok(SessionToken {
                        auth: AuthMaterial::Session(sid.clone()),
                        generation: state.generation,
                    });
                }
            }
        }

        info!(stale_generation, "Session expired, logging in again");
        let sid = self.password_login().await?;

        let mut state = self.state.write();
        state.session_id = Some(sid.clone());
        state.generation += 1;
        Ok(SessionToken {
            auth: AuthMaterial::Session(sid),
            generation: state.generation,
        })
    }

    /// End the session. Failures are logged, never raised.
    pub async fn logout(&self) {
        let sid = {
            let mut state = self.state.write();
            state.active = false;
            state.session_id.take()
        };

        let Some(sid) = sid else {
            return;
        };

        match self
            .transport
            .call(
                &AuthMaterial::Session(sid),
                Method::Exec,
                &[Target::new(LOGOUT_URL)],
            )
            .await
        {
            Ok(response) => match response.results.first() {
                Some(result) if !result.is_success() => {
                    warn!(code = result.status.code, "Logout rejected by appliance")
                }
                _ => info!("Logged out"),
            },
            Err(e) => warn!("Logout failed: {}", e),
        }
    }

    async fn password_login(&self) -> Result<String> {
        let Credentials::Password { username, password } = &self.credentials else {
            return Err(FmgError::Internal(
                "password login attempted in token mode".to_string(),
            ));
        };

        let target = Target::new(LOGIN_URL).with_data(json!({
            "user": username,
            "passwd": password,
        }));
        let response = self
            .transport
            .call(&AuthMaterial::Anonymous, Method::Exec, &[target])
            .await?;

        if let Some(result) = response.results.first() {
            if !result.is_success() {
                return Err(FmgError::Authentication(format!(
                    "login rejected: {} (code {})",
                    result.status.message, result.status.code
                )));
            }
        }

        response
            .session
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| FmgError::Authentication("login response carried no session".to_string()))
    }
}

/// Token shape check: non-empty printable ASCII without whitespace.
pub fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_graphic()) {
        return Err(FmgError::Authentication(
            "API token is empty or contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientSettings;

    fn manager(credentials: Credentials) -> SessionManager {
        let settings = ClientSettings::builder("http://127.0.0.1:9")
            .credentials(credentials.clone())
            .build()
            .unwrap();
        let transport = Arc::new(RpcTransport::new(&settings).unwrap());
        SessionManager::new(transport, credentials)
    }

    #[test]
    fn test_validate_token() {
        assert!(validate_token("abc123XYZ").is_ok());
        assert!(validate_token("").is_err());
        assert!(validate_token("abc def").is_err());
        assert!(validate_token("abc\n").is_err());
    }

    #[tokio::test]
    async fn test_token_login_needs_no_round_trip() {
        let session = manager(Credentials::Token {
            token: "tok".to_string(),
        });
        assert!(matches!(
            session.ensure_valid().await,
            Err(FmgError::NotConnected)
        ));

        session.login().await.unwrap();
        let token = session.ensure_valid().await.unwrap();
        assert_eq!(token.auth, AuthMaterial::Bearer("tok".to_string()));
        assert_eq!(token.generation, 1);
    }

    #[tokio::test]
    async fn test_token_refresh_is_authentication_error() {
        let session = manager(Credentials::Token {
            token: "tok".to_string(),
        });
        session.login().await.unwrap();
        let err = session.refresh(1).await.unwrap_err();
        assert!(matches!(err, FmgError::Authentication(_)));
    }

    #[test]
    fn test_auth_material_debug_is_redacted() {
        let out = format!("{:?}", AuthMaterial::Session("abc".to_string()));
        assert!(!out.contains("abc"));
    }
}
