//! Session repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SessionRepository;
use crate::models::{DeviceInfo, Session};
use crate::{from_bson, to_bson, DbError, DbResult};

/// Collection name for session records
pub const SESSIONS: &str = "sessions";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionDoc {
    #[serde(rename = "_id")]
    id: String,
    user_id: String,
    created_at: BsonDateTime,
    expires_at: BsonDateTime,
    last_activity_at: BsonDateTime,
    device: DeviceInfo,
    ip: String,
    location: String,
    active: bool,
}

impl From<&Session> for SessionDoc {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.to_string(),
            user_id: session.user_id.to_string(),
            created_at: to_bson(session.created_at),
            expires_at: to_bson(session.expires_at),
            last_activity_at: to_bson(session.last_activity_at),
            device: session.device.clone(),
            ip: session.ip.clone(),
            location: session.location.clone(),
            active: session.active,
        }
    }
}

impl TryFrom<SessionDoc> for Session {
    type Error = DbError;

    fn try_from(doc: SessionDoc) -> Result<Self, Self::Error> {
        let parse = |raw: &str| {
            Uuid::parse_str(raw).map_err(|e| DbError::Serialization(format!("session field {}: {}", raw, e)))
        };
        Ok(Self {
            id: parse(&doc.id)?,
            user_id: parse(&doc.user_id)?,
            created_at: from_bson(doc.created_at),
            expires_at: from_bson(doc.expires_at),
            last_activity_at: from_bson(doc.last_activity_at),
            device: doc.device,
            ip: doc.ip,
            location: doc.location,
            active: doc.active,
        })
    }
}

/// MongoDB-backed session repository
#[derive(Clone)]
pub struct MongoSessionRepo {
    sessions: Collection<SessionDoc>,
}

impl MongoSessionRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            sessions: db.collection(SESSIONS),
        }
    }

    /// Create the lookup index used by the active-session queries and the
    /// expiry index used by the janitor
    pub async fn ensure_indexes(&self) -> DbResult<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "active": 1, "expires_at": 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "expires_at": 1 })
                .options(IndexOptions::builder().name("expires_at_1".to_string()).build())
                .build(),
        ];
        self.sessions.create_indexes(indexes, None).await?;
        Ok(())
    }

    fn live_filter(user_id: Uuid, now: DateTime<Utc>) -> Document {
        doc! {
            "user_id": user_id.to_string(),
            "active": true,
            "expires_at": { "$gt": to_bson(now) },
        }
    }
}

#[async_trait]
impl SessionRepository for MongoSessionRepo {
    async fn insert(&self, session: &Session) -> DbResult<()> {
        self.sessions.insert_one(SessionDoc::from(session), None).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<Session>> {
        self.sessions
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?
            .map(Session::try_from)
            .transpose()
    }

    async fn list_active(&self, user_id: Uuid, now: DateTime<Utc>) -> DbResult<Vec<Session>> {
        let options = FindOptions::builder()
            .sort(doc! { "last_activity_at": -1, "created_at": -1 })
            .build();
        let docs: Vec<SessionDoc> = self
            .sessions
            .find(Self::live_filter(user_id, now), options)
            .await?
            .try_collect()
            .await?;
        docs.into_iter().map(Session::try_from).collect()
    }

    async fn count_active(&self, user_id: Uuid, now: DateTime<Utc>) -> DbResult<u64> {
        let count = self
            .sessions
            .count_documents(Self::live_filter(user_id, now), None)
            .await?;
        Ok(count)
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> DbResult<Option<Session>> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.sessions
            .find_one_and_update(
                doc! {
                    "_id": id.to_string(),
                    "active": true,
                    "expires_at": { "$gt": to_bson(now) },
                },
                doc! { "$max": { "last_activity_at": to_bson(now) } },
                options,
            )
            .await?
            .map(Session::try_from)
            .transpose()
    }

    async fn deactivate(&self, id: Uuid) -> DbResult<bool> {
        let result = self
            .sessions
            .update_one(
                doc! { "_id": id.to_string(), "active": true },
                doc! { "$set": { "active": false } },
                None,
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn deactivate_all(&self, user_id: Uuid) -> DbResult<u64> {
        let result = self
            .sessions
            .update_many(
                doc! { "user_id": user_id.to_string(), "active": true },
                doc! { "$set": { "active": false } },
                None,
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn update(&self, session: &Session) -> DbResult<bool> {
        let mut filter = doc! { "_id": session.id.to_string() };
        if session.active {
            // Only an already-active record may be written back as active
            filter.insert("active", true);
        }
        let mut fields = mongodb::bson::to_document(&SessionDoc::from(session))
            .map_err(|e| DbError::Serialization(e.to_string()))?;
        fields.remove("_id");
        fields.remove("last_activity_at");
        let result = self
            .sessions
            .update_one(
                filter,
                doc! {
                    "$set": fields,
                    "$max": { "last_activity_at": to_bson(session.last_activity_at) },
                },
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn delete_for_user(&self, user_id: Uuid) -> DbResult<u64> {
        let result = self
            .sessions
            .delete_many(doc! { "user_id": user_id.to_string() }, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = self
            .sessions
            .delete_many(doc! { "expires_at": { "$lte": to_bson(now) } }, None)
            .await?;
        Ok(result.deleted_count)
    }
}
