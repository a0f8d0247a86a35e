//! Registration, password login and bearer tokens.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{
    Algorithm as HashAlgorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier,
    Version,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{HubError, Result};
use crate::model::{now, Role, User};
use crate::storage::{JsonStore, Users};

const TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub admin: bool,
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn context(&self) -> RequestContext {
        RequestContext {
            user_id: self.sub.clone(),
            is_admin: self.admin,
        }
    }
}

/// HS256 issuer and verifier sharing one secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, ctx: &RequestContext) -> Result<String> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            sub: ctx.user_id.clone(),
            admin: ctx.is_admin,
            sid: Uuid::new_v4().to_string(),
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Decode and check signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                warn!(error = %e, "rejected bearer token");
                HubError::Unauthorized
            })
    }
}

pub struct Accounts {
    store: Arc<JsonStore>,
    hasher: Argon2<'static>,
}

impl Accounts {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self {
            store,
            hasher: Argon2::default(),
        }
    }

    /// Use explicit argon2 cost parameters instead of the defaults.
    pub fn with_params(store: Arc<JsonStore>, params: Params) -> Self {
        Self {
            store,
            hasher: Argon2::new(HashAlgorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Argon2id with `memory_kib` of memory and `iterations` passes.
    pub fn with_cost(store: Arc<JsonStore>, memory_kib: u32, iterations: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| HubError::PasswordHash(e.to_string()))?;
        Ok(Self::with_params(store, params))
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| HubError::PasswordHash(e.to_string()))
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                self.hasher
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<()> {
        let username = username.trim();
        if username.is_empty() {
            return Err(HubError::missing("username"));
        }
        if password.is_empty() {
            return Err(HubError::missing("password"));
        }
        let password_hash = self.hash_password(password)?;
        self.store.update::<Users, _, _>(|users| {
            if users.contains_key(username) {
                return Err(HubError::Conflict(format!(
                    "username {username} is already taken"
                )));
            }
            users.insert(
                username.to_string(),
                User {
                    email: email.trim().to_string(),
                    password_hash,
                    role: Role::User,
                    created_at: now(),
                    last_login: None,
                    settings: Default::default(),
                },
            );
            Ok(())
        })?;
        info!(%username, "registered user");
        Ok(())
    }

    /// Check credentials and stamp `last_login`. Unknown users and wrong
    /// passwords fail the same way.
    pub fn login(&self, username: &str, password: &str) -> Result<RequestContext> {
        let user = self
            .store
            .load::<Users>()?
            .remove(username)
            .ok_or(HubError::Unauthorized)?;
        if !self.verify_password(password, &user.password_hash) {
            warn!(%username, "failed login");
            return Err(HubError::Unauthorized);
        }
        self.store.update::<Users, _, _>(|users| {
            if let Some(user) = users.get_mut(username) {
                user.last_login = Some(now());
            }
            Ok(())
        })?;
        info!(%username, "user logged in");
        Ok(RequestContext {
            user_id: username.to_string(),
            is_admin: user.is_admin(),
        })
    }

    /// Context for a known user, with admin status read from the record.
    pub fn context_for(&self, username: &str) -> Result<RequestContext> {
        let users = self.store.load::<Users>()?;
        let user = users.get(username).ok_or(HubError::Unauthorized)?;
        Ok(RequestContext {
            user_id: username.to_string(),
            is_admin: user.is_admin(),
        })
    }

    pub fn set_role(&self, username: &str, role: Role) -> Result<()> {
        self.store.update::<Users, _, _>(|users| {
            let user = users
                .get_mut(username)
                .ok_or_else(|| HubError::not_found(format!("user {username}")))?;
            user.role = role;
            Ok(())
        })?;
        info!(%username, ?role, "changed role");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn accounts(dir: &TempDir) -> Accounts {
        let store = Arc::new(JsonStore::new(dir.path()).unwrap());
        Accounts::with_cost(store, 8, 1).unwrap()
    }

    #[test]
    fn register_then_login() {
        let dir = TempDir::new().unwrap();
        let accounts = accounts(&dir);
        accounts.register("alice", "alice@example.com", "s3cret").unwrap();

        let ctx = accounts.login("alice", "s3cret").unwrap();
        assert_eq!(ctx, RequestContext::user("alice"));
        let users = accounts.store.load::<Users>().unwrap();
        assert!(users["alice"].last_login.is_some());
        assert!(users["alice"].password_hash.starts_with("$argon2id$"));

        assert!(matches!(accounts.login("alice", "wrong"), Err(HubError::Unauthorized)));
        assert!(matches!(accounts.login("bob", "s3cret"), Err(HubError::Unauthorized)));
    }

    #[test]
    fn duplicate_usernames_conflict() {
        let dir = TempDir::new().unwrap();
        let accounts = accounts(&dir);
        accounts.register("alice", "a@example.com", "pw").unwrap();
        assert!(matches!(
            accounts.register("alice", "b@example.com", "pw"),
            Err(HubError::Conflict(_))
        ));
        assert!(matches!(
            accounts.register(" ", "c@example.com", "pw"),
            Err(HubError::Validation(_))
        ));
    }

    #[test]
    fn promoted_users_log_in_as_admin() {
        let dir = TempDir::new().unwrap();
        let accounts = accounts(&dir);
        accounts.register("root", "root@example.com", "pw").unwrap();
        accounts.set_role("root", Role::Admin).unwrap();
        assert!(accounts.login("root", "pw").unwrap().is_admin);
        assert!(accounts.context_for("root").unwrap().is_admin);
        assert!(matches!(accounts.context_for("ghost"), Err(HubError::Unauthorized)));
        assert!(matches!(accounts.set_role("ghost", Role::Admin), Err(HubError::NotFound(_))));
    }

    #[test]
    fn tokens_round_trip_and_reject_other_secrets() {
        let issuer = TokenIssuer::new("secret");
        let token = issuer.issue(&RequestContext::admin("root")).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.context(), RequestContext::admin("root"));
        assert_eq!(claims.exp - claims.iat, TOKEN_LIFETIME_SECS);

        let other = TokenIssuer::new("other");
        assert!(matches!(other.verify(&token), Err(HubError::Unauthorized)));
        assert!(matches!(issuer.verify("garbage"), Err(HubError::Unauthorized)));
    }
}
