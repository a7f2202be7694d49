// Users, logins and sessions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{delete_each, stored};
use crate::auth::{new_token, CredentialHasher, SESSION_TOKEN_BYTES};
use crate::cascade::CascadeReport;
use crate::db::{CrmDb, Session, User, UserRole};
use crate::entity::EntityKind;
use crate::error::{CrmError, CrmResult};
use crate::util::{is_blank, new_id, normalize_email};

/// How long a login stays valid.
pub const SESSION_TTL_DAYS: i64 = 7;

/// User as submitted by an administrator. A blank id creates a new user;
/// a blank password keeps the current one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDraft {
    pub id: String,
    pub email_address: String,
    pub name: String,
    pub role: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(skip)]
    pub user_agent: String,
    #[serde(skip)]
    pub ip_address: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// The caller behind a valid session.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session: Session,
}

pub fn require_admin(actor: &User) -> CrmResult<()> {
    if actor.role == UserRole::Admin {
        Ok(())
    } else {
        Err(CrmError::Forbidden)
    }
}

// =============================================================================
// Users
// =============================================================================

/// Create or update a user. E-mail addresses are unique ignoring case.
pub fn save_user(
    db: &CrmDb,
    hasher: &dyn CredentialHasher,
    draft: UserDraft,
) -> CrmResult<User> {
    let email = normalize_email(&draft.email_address);
    if email.is_empty() {
        return Err(CrmError::validation("emailAddress is required"));
    }
    let name = draft.name.trim().to_string();
    if name.is_empty() {
        return Err(CrmError::validation("name is required"));
    }
    let role = if is_blank(&draft.role) {
        UserRole::default()
    } else {
        draft
            .role
            .parse::<UserRole>()
            .map_err(|_| CrmError::validation("invalid role"))?
    };

    let id = draft.id.trim().to_string();
    let is_new = id.is_empty();
    let password = draft.password.trim();
    if is_new && password.is_empty() {
        return Err(CrmError::validation("password is required"));
    }
    // Hashing is slow; keep it outside the write transaction
    let password_hash = if password.is_empty() {
        None
    } else {
        Some(hasher.hash(password)?)
    };

    db.with_transaction(|db| {
        let now = Utc::now();
        let mut user = if is_new {
            User {
                id: new_id(),
                created_at: now,
                ..Default::default()
            }
        } else {
            db.get_user(&id)?
                .ok_or_else(|| CrmError::not_found(EntityKind::User, &id))?
        };

        if let Some(owner) = db.get_user_by_email(&email)? {
            if owner.id != user.id {
                return Err(CrmError::Conflict("emailAddress already exists".into()));
            }
        }

        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }
        user.email_address = email;
        user.name = name;
        user.role = role;
        user.updated_at = now;

        db.upsert_user(&user)?;
        log::info!("Saved user {} ({})", user.id, user.role);
        stored(db.get_user(&user.id)?, EntityKind::User, &user.id)
    })
}

/// Delete users other than the caller. Their tasks, interactions and
/// quotations are kept with the reference cleared.
pub fn delete_users(db: &CrmDb, actor: &User, ids: &[String]) -> CrmResult<Vec<CascadeReport>> {
    if ids.iter().any(|id| id.trim() == actor.id) {
        return Err(CrmError::validation("cannot delete your own user"));
    }
    delete_each(db, ids, |db, id| Ok(db.delete_user(id)?))
}

// =============================================================================
// Sessions
// =============================================================================

/// Check credentials and open a session.
pub fn login(
    db: &CrmDb,
    hasher: &dyn CredentialHasher,
    request: &LoginRequest,
) -> CrmResult<LoginResponse> {
    let email = normalize_email(&request.email);
    if email.is_empty() || is_blank(&request.password) {
        return Err(CrmError::validation("email and password are required"));
    }

    let user = db
        .get_user_by_email(&email)?
        .ok_or(CrmError::InvalidCredentials)?;
    if !hasher.verify(&user.password_hash, &request.password)? {
        return Err(CrmError::InvalidCredentials);
    }

    let now = Utc::now();
    let session = Session {
        token: new_token(SESSION_TOKEN_BYTES),
        user_id: user.id.clone(),
        user_agent: request.user_agent.clone(),
        ip_address: request.ip_address.clone(),
        created_at: now,
        expires_at: now + Duration::days(SESSION_TTL_DAYS),
    };
    db.insert_session(&session)?;
    log::info!("User {} logged in", user.id);

    Ok(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        user,
    })
}

/// Resolve a bearer token. Expired sessions are removed on sight.
pub fn authenticate(db: &CrmDb, token: &str) -> CrmResult<Option<AuthContext>> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }
    let Some(session) = db.get_session(token)? else {
        return Ok(None);
    };
    if session.is_expired(Utc::now()) {
        db.delete_session(token)?;
        log::debug!("Removed expired session for user {}", session.user_id);
        return Ok(None);
    }
    let Some(user) = db.get_user(&session.user_id)? else {
        return Ok(None);
    };
    Ok(Some(AuthContext { user, session }))
}

pub fn logout(db: &CrmDb, token: &str) -> CrmResult<bool> {
    Ok(db.delete_session(token.trim())?)
}
