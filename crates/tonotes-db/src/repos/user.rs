//! User repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserRepository;
use crate::models::User;
use crate::{from_bson, to_bson, DbError, DbResult};

/// Collection name for user records
pub const USERS: &str = "users";

/// User record as laid out in the `users` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserDoc {
    #[serde(rename = "_id")]
    id: String,
    username: String,
    email: String,
    password_digest: String,
    created_at: BsonDateTime,
    last_password_change: Option<BsonDateTime>,
    last_email_change: Option<BsonDateTime>,
    two_factor_enabled: bool,
    totp_secret: Option<String>,
    #[serde(default)]
    recovery_codes: Vec<String>,
    active: bool,
}

impl From<&User> for UserDoc {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_digest: user.password_digest.clone(),
            created_at: to_bson(user.created_at),
            last_password_change: user.last_password_change.map(to_bson),
            last_email_change: user.last_email_change.map(to_bson),
            two_factor_enabled: user.two_factor_enabled,
            totp_secret: user.totp_secret.clone(),
            recovery_codes: user.recovery_codes.clone(),
            active: user.active,
        }
    }
}

impl TryFrom<UserDoc> for User {
    type Error = DbError;

    fn try_from(doc: UserDoc) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&doc.id)
                .map_err(|e| DbError::Serialization(format!("user id {}: {}", doc.id, e)))?,
            username: doc.username,
            email: doc.email,
            password_digest: doc.password_digest,
            created_at: from_bson(doc.created_at),
            last_password_change: doc.last_password_change.map(from_bson),
            last_email_change: doc.last_email_change.map(from_bson),
            two_factor_enabled: doc.two_factor_enabled,
            totp_secret: doc.totp_secret,
            recovery_codes: doc.recovery_codes,
            active: doc.active,
        })
    }
}

/// MongoDB-backed user repository
#[derive(Clone)]
pub struct MongoUserRepo {
    users: Collection<UserDoc>,
}

impl MongoUserRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection(USERS),
        }
    }

    /// Create the unique indexes on `username` and `email`
    pub async fn ensure_indexes(&self) -> DbResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "username": 1 })
                .options(unique())
                .build(),
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(unique())
                .build(),
        ];
        self.users.create_indexes(indexes, None).await?;
        Ok(())
    }

    async fn find_one(&self, filter: mongodb::bson::Document) -> DbResult<Option<User>> {
        self.users
            .find_one(filter, None)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserRepository for MongoUserRepo {
    async fn create(&self, user: &User) -> DbResult<()> {
        self.users.insert_one(UserDoc::from(user), None).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<User>> {
        self.find_one(doc! { "_id": id.to_string() }).await
    }

    async fn find_by_username(&self, username: &str) -> DbResult<Option<User>> {
        self.find_one(doc! { "username": username }).await
    }

    async fn update_password(&self, id: Uuid, digest: &str, changed_at: DateTime<Utc>) -> DbResult<bool> {
        let result = self
            .users
            .update_one(
                doc! { "_id": id.to_string() },
                doc! { "$set": {
                    "password_digest": digest,
                    "last_password_change": to_bson(changed_at),
                }},
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn update_email(&self, id: Uuid, email: &str, changed_at: DateTime<Utc>) -> DbResult<bool> {
        let result = self
            .users
            .update_one(
                doc! { "_id": id.to_string() },
                doc! { "$set": {
                    "email": email,
                    "last_email_change": to_bson(changed_at),
                }},
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn enable_two_factor(&self, id: Uuid, secret: &str, recovery_hashes: &[String]) -> DbResult<bool> {
        let result = self
            .users
            .update_one(
                doc! { "_id": id.to_string(), "two_factor_enabled": false },
                doc! { "$set": {
                    "two_factor_enabled": true,
                    "totp_secret": secret,
                    "recovery_codes": recovery_hashes.to_vec(),
                }},
                None,
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn disable_two_factor(&self, id: Uuid) -> DbResult<bool> {
        let result = self
            .users
            .update_one(
                doc! { "_id": id.to_string() },
                doc! { "$set": {
                    "two_factor_enabled": false,
                    "totp_secret": null,
                    "recovery_codes": [],
                }},
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn consume_recovery_code(&self, id: Uuid, hash: &str) -> DbResult<Option<usize>> {
        // Matching on the hash makes the pull a compare-and-set: two concurrent
        // submissions of the same code cannot both match.
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .users
            .find_one_and_update(
                doc! { "_id": id.to_string(), "recovery_codes": hash },
                doc! { "$pull": { "recovery_codes": hash } },
                options,
            )
            .await?;
        Ok(updated.map(|doc| doc.recovery_codes.len()))
    }

    async fn delete(&self, id: Uuid) -> DbResult<bool> {
        let result = self
            .users
            .delete_one(doc! { "_id": id.to_string() }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }
}
