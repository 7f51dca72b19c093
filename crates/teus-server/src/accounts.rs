//! In-memory user accounts.
//!
//! Holds one record per email with an Argon2id password hash and a role.
//! Implements [`UserDirectory`] so the authentication gate and token
//! rotation see the current role of every subject.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use teus_auth::storage::{DirectoryEntry, UserDirectory};
use teus_auth::{AuthError, AuthResult, Principal, Role};

/// Stored account record.
#[derive(Debug, Clone)]
struct UserAccount {
    email: String,
    full_name: String,
    role: Role,
    password_hash: String,
}

/// Public view of an account. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

impl From<&UserAccount> for UserView {
    fn from(account: &UserAccount) -> Self {
        Self {
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            role: account.role,
        }
    }
}

/// Argon2id hash (default parameters) of no password anyone knows. Unknown
/// emails are verified against it so that login takes the same time whether
/// or not the account exists.
const DECOY_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$dGV1cy1kZWNveS1zYWx0IQ$8sRl1t8sG9l1ufFfimNwG59HbaQfaIaPohsuMj8WdiI";

/// Canonical form of an email used as the account key and token subject.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Hash a password for storage using Argon2id.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 hash.
///
/// Returns `Err` only if the hash format is invalid.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    let result = Argon2::default().verify_password(password.as_bytes(), &parsed_hash);
    Ok(result.is_ok())
}

/// Concurrent account registry keyed by normalized email.
#[derive(Debug, Default)]
pub struct UserAccounts {
    accounts: DashMap<String, UserAccount>,
}

impl UserAccounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    #[must_use]
    pub fn contains(&self, email: &str) -> bool {
        self.accounts.contains_key(&normalize_email(email))
    }

    /// Creates an account.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an empty or malformed email or an empty password.
    /// - `Conflict` if the email is already registered.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        role: Role,
    ) -> AuthResult<UserView> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::invalid_request("A valid email is required"));
        }
        if password.is_empty() {
            return Err(AuthError::invalid_request("Password is required"));
        }
        if self.accounts.contains_key(&email) {
            return Err(AuthError::conflict("Email is already registered"));
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::internal(format!("Password hashing task failed: {e}")))?
            .map_err(|e| AuthError::internal(format!("Failed to hash password: {e}")))?;

        // Re-checked under the shard lock; two concurrent registrations of
        // the same email cannot both succeed.
        match self.accounts.entry(email.clone()) {
            Entry::Occupied(_) => Err(AuthError::conflict("Email is already registered")),
            Entry::Vacant(slot) => {
                let account = UserAccount {
                    email,
                    full_name: full_name.trim().to_string(),
                    role,
                    password_hash,
                };
                let view = UserView::from(&account);
                slot.insert(account);
                tracing::info!(email = %view.email, role = %view.role, "User registered");
                Ok(view)
            }
        }
    }

    /// Verifies login credentials.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` for an unknown email or a wrong password, with no
    /// way to tell the two apart.
    pub async fn authenticate(&self, email: &str, password: &str) -> AuthResult<Principal> {
        let email = normalize_email(email);
        let account = self
            .accounts
            .get(&email)
            .map(|a| (a.password_hash.clone(), a.role));
        let password_hash = account
            .as_ref()
            .map_or_else(|| DECOY_PASSWORD_HASH.to_string(), |(hash, _)| hash.clone());

        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
            .await
            .map_err(|e| AuthError::internal(format!("Password verification task failed: {e}")))?
            .map_err(|e| AuthError::internal(format!("Stored password hash is invalid: {e}")))?;

        match account {
            Some((_, role)) if verified => Ok(Principal::new(email, role)),
            _ => {
                tracing::warn!(email = %email, "Invalid login attempt");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    #[must_use]
    pub fn find(&self, email: &str) -> Option<UserView> {
        self.accounts
            .get(&normalize_email(email))
            .map(|a| UserView::from(a.value()))
    }

    /// All accounts, ordered by email.
    #[must_use]
    pub fn list(&self) -> Vec<UserView> {
        let mut users: Vec<UserView> = self
            .accounts
            .iter()
            .map(|a| UserView::from(a.value()))
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    /// Changes the role of an account. Takes effect on the next request, for
    /// access tokens already issued as well.
    ///
    /// # Errors
    ///
    /// `NotFound` if the email is not registered.
    pub fn set_role(&self, email: &str, role: Role) -> AuthResult<UserView> {
        let email = normalize_email(email);
        let mut account = self
            .accounts
            .get_mut(&email)
            .ok_or_else(|| AuthError::not_found(format!("User '{email}' not found")))?;
        account.role = role;
        tracing::info!(email = %email, role = %role, "User role changed");
        Ok(UserView::from(&*account))
    }
}

#[async_trait]
impl UserDirectory for UserAccounts {
    async fn find_by_subject(&self, subject: &str) -> AuthResult<Option<DirectoryEntry>> {
        Ok(self
            .accounts
            .get(&normalize_email(subject))
            .map(|a| DirectoryEntry::new(a.email.clone(), a.role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_decoy_hash_is_verifiable() {
        // Must parse, or unknown emails would skip the Argon2 work.
        assert!(!verify_password("anything", DECOY_PASSWORD_HASH).unwrap());
        assert!(!verify_password("", DECOY_PASSWORD_HASH).unwrap());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Teus.PT "), "alice@teus.pt");
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let accounts = UserAccounts::new();
        let view = accounts
            .register("Alice@teus.pt", "pw-alice", "Alice", Role::User)
            .await
            .unwrap();
        assert_eq!(view.email, "alice@teus.pt");
        assert_eq!(view.role, Role::User);

        let principal = accounts.authenticate("alice@teus.pt", "pw-alice").await.unwrap();
        assert_eq!(principal.subject, "alice@teus.pt");
        assert_eq!(principal.role, Role::User);
    }

    #[tokio::test]
    async fn test_authenticate_failures_are_indistinguishable() {
        let accounts = UserAccounts::new();
        accounts
            .register("alice@teus.pt", "pw-alice", "Alice", Role::User)
            .await
            .unwrap();

        let wrong_password = accounts.authenticate("alice@teus.pt", "nope").await.unwrap_err();
        let unknown_user = accounts.authenticate("bob@teus.pt", "nope").await.unwrap_err();
        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_input() {
        let accounts = UserAccounts::new();
        accounts
            .register("alice@teus.pt", "pw", "Alice", Role::User)
            .await
            .unwrap();

        let dup = accounts
            .register(" ALICE@teus.pt", "pw2", "Other", Role::User)
            .await
            .unwrap_err();
        assert!(matches!(dup, AuthError::Conflict { .. }));

        assert!(matches!(
            accounts.register("not-an-email", "pw", "X", Role::User).await,
            Err(AuthError::InvalidRequest { .. })
        ));
        assert!(matches!(
            accounts.register("x@teus.pt", "", "X", Role::User).await,
            Err(AuthError::InvalidRequest { .. })
        ));
        assert_eq!(accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_set_role_is_visible_to_directory() {
        let accounts = UserAccounts::new();
        accounts
            .register("alice@teus.pt", "pw", "Alice", Role::User)
            .await
            .unwrap();

        let view = accounts.set_role("alice@teus.pt", Role::Admin).unwrap();
        assert_eq!(view.role, Role::Admin);

        let entry = accounts.find_by_subject("alice@teus.pt").await.unwrap().unwrap();
        assert_eq!(entry.role, Role::Admin);
        assert!(accounts.find_by_subject("ghost@teus.pt").await.unwrap().is_none());

        assert!(matches!(
            accounts.set_role("ghost@teus.pt", Role::Admin),
            Err(AuthError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_hides_hashes() {
        let accounts = UserAccounts::new();
        for email in ["carol@teus.pt", "alice@teus.pt", "bob@teus.pt"] {
            accounts.register(email, "pw", "", Role::User).await.unwrap();
        }
        let emails: Vec<_> = accounts.list().into_iter().map(|u| u.email).collect();
        assert_eq!(emails, ["alice@teus.pt", "bob@teus.pt", "carol@teus.pt"]);

        let json = serde_json::to_value(accounts.find("alice@teus.pt").unwrap()).unwrap();
        assert_eq!(json["fullName"], "");
        assert_eq!(json["role"], "USER");
        assert!(json.get("passwordHash").is_none());
    }
}
