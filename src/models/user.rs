use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{self, ACCESS_AUTH};
use crate::config;
use crate::models::ModelError;
use crate::store::{Collection, Store};

pub const COLLECTION: &str = "users";

pub const MIN_PASSWORD_LEN: usize = 6;

/// One active bearer credential. The raw token string is stored alongside its
/// access tag so logout can revoke by deleting the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
    /// bcrypt hash; the plaintext never survives registration.
    pub password: String,
    #[serde(default)]
    pub tokens: Vec<TokenRecord>,
}

/// The only user shape ever serialized to clients.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
}

impl User {
    fn collection(store: &Store) -> Collection<User> {
        store.collection(COLLECTION)
    }

    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
        }
    }

    pub async fn register(
        store: &Store,
        email: &str,
        password: &str,
    ) -> Result<(User, String), ModelError> {
        let email = email.trim().to_ascii_lowercase();
        if !is_email_shaped(&email) {
            return Err(ModelError::Validation {
                field: "email",
                message: format!("{email:?} is not a valid email"),
            });
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ModelError::Validation {
                field: "password",
                message: format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            });
        }
        if Self::collection(store)
            .find_one(json!({ "email": &email }))
            .await?
            .is_some()
        {
            return Err(ModelError::Validation {
                field: "email",
                message: "email already in use".to_string(),
            });
        }

        let hash = bcrypt::hash(password, config::config().security.bcrypt_cost)?;
        let mut user = User {
            id: Uuid::new_v4(),
            email,
            password: hash,
            tokens: Vec::new(),
        };
        let token = user.mint_auth_token(store).await?;
        Ok((user, token))
    }

    /// One generic rejection for both "no such email" and "wrong password".
    pub async fn find_by_credentials(
        store: &Store,
        email: &str,
        password: &str,
    ) -> Result<User, ModelError> {
        let email = email.trim().to_ascii_lowercase();
        let user = Self::collection(store)
            .find_one(json!({ "email": email }))
            .await?
            .ok_or(ModelError::Authentication)?;

        if bcrypt::verify(password, &user.password)? {
            Ok(user)
        } else {
            Err(ModelError::Authentication)
        }
    }

    pub async fn login(
        store: &Store,
        email: &str,
        password: &str,
    ) -> Result<(User, String), ModelError> {
        let mut user = Self::find_by_credentials(store, email, password).await?;
        let token = user.mint_auth_token(store).await?;
        Ok((user, token))
    }

    /// Resolve a presented token to its user.
    ///
    /// A valid signature is not enough: logout revokes by removing the token
    /// from the user's list, so the stored copy must still be present.
    pub async fn find_by_token(store: &Store, token: &str) -> Result<User, ModelError> {
        let claims = auth::verify(token).map_err(|_| ModelError::Authentication)?;
        if claims.access != ACCESS_AUTH {
            return Err(ModelError::Authentication);
        }

        Self::collection(store)
            .find_one(json!({
                "_id": claims.sub,
                "tokens.token": token,
                "tokens.access": ACCESS_AUTH,
            }))
            .await?
            .ok_or(ModelError::Authentication)
    }

    /// Mint a fresh auth token, append it to the token list, and persist.
    pub async fn mint_auth_token(&mut self, store: &Store) -> Result<String, ModelError> {
        let token = auth::mint(self.id)?;
        self.tokens.push(TokenRecord {
            access: ACCESS_AUTH.to_string(),
            token: token.clone(),
        });
        *self = Self::collection(store).save(self).await?;
        Ok(token)
    }

    /// Remove the matching token; removing an absent token is not an error.
    pub async fn remove_token(&mut self, store: &Store, token: &str) -> Result<(), ModelError> {
        self.tokens.retain(|record| record.token != token);
        *self = Self::collection(store).save(self).await?;
        Ok(())
    }
}

fn is_email_shaped(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
        && !domain.contains('@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check() {
        assert!(is_email_shaped("a@b.com"));
        assert!(is_email_shaped("first.last@sub.example.org"));
        assert!(!is_email_shaped("plainaddress"));
        assert!(!is_email_shaped("@example.com"));
        assert!(!is_email_shaped("user@"));
        assert!(!is_email_shaped("user@nodot"));
        assert!(!is_email_shaped("user@.com"));
        assert!(!is_email_shaped("user name@example.com"));
        assert!(!is_email_shaped("a@b@c.com"));
    }

    #[test]
    fn public_view_hides_password_and_tokens() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            password: "hash".to_string(),
            tokens: vec![TokenRecord {
                access: ACCESS_AUTH.to_string(),
                token: "tok".to_string(),
            }],
        };

        let body = serde_json::to_value(user.public()).unwrap();
        assert_eq!(body["email"], "a@b.com");
        assert!(body.get("password").is_none());
        assert!(body.get("tokens").is_none());
    }
}
