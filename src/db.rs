use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};

use crate::{ChatError, ChatResult};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoom {
    pub room_id: String,
    pub name: String,
    pub private: bool,
}

/// What clients see of a room; the `private` flag never leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub name: String,
}

/// Body of a posted message, and also the payload broadcast to the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub message_id: String,
    pub message: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub room_id: String,
    pub message_id: String,
    pub message: String,
    #[sqlx(rename = "sender")]
    pub from: String,
}

impl NewRoom {
    fn validate(&self) -> ChatResult<()> {
        if self.room_id.is_empty() {
            return Err(ChatError::Invalid("roomId must not be empty".to_owned()));
        }
        Ok(())
    }
}

impl NewMessage {
    fn validate(&self) -> ChatResult<()> {
        if self.message_id.is_empty() {
            return Err(ChatError::Invalid("messageId must not be empty".to_owned()));
        }
        Ok(())
    }
}

impl Message {
    pub fn payload(&self) -> NewMessage {
        NewMessage {
            message_id: self.message_id.clone(),
            message: self.message.clone(),
            from: self.from.clone(),
        }
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS rooms (
    room_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    private BOOLEAN NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    message_id TEXT NOT NULL UNIQUE,
    room_id TEXT NOT NULL,
    message TEXT NOT NULL,
    sender TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_room_id ON messages(room_id);
"#;

/// Room registry and message log on top of one SQLite pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> ChatResult<Store> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Ephemeral store. Held on a single connection that never expires,
    /// since an in-memory database dies with its last connection.
    pub async fn in_memory() -> ChatResult<Store> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> ChatResult<Store> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Store { pool })
    }

    pub async fn list_public_rooms(&self) -> ChatResult<Vec<RoomSummary>> {
        Ok(
            sqlx::query_as("SELECT room_id,name FROM rooms WHERE private=0")
                .fetch_all(&self.pool)
                .await?
        )
    }

    pub async fn get_room(&self, room_id: &str) -> ChatResult<RoomSummary> {
        sqlx::query_as("SELECT room_id,name FROM rooms WHERE room_id=?")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ChatError::NotFound(room_id.to_owned()))
    }

    pub async fn create_room(&self, room: &NewRoom) -> ChatResult<()> {
        room.validate()?;

        sqlx::query("INSERT INTO rooms (room_id,name,private) VALUES (?,?,?)")
            .bind(&room.room_id)
            .bind(&room.name)
            .bind(room.private)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, || format!("room {}", room.room_id)))?;

        tracing::info!(room_id = %room.room_id, private = room.private, "room created");
        Ok(())
    }

    pub async fn room_exists(&self, room_id: &str) -> ChatResult<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms WHERE room_id=?")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn list_messages(&self, room_id: &str) -> ChatResult<Vec<Message>> {
        Ok(
            sqlx::query_as(
                "SELECT room_id,message_id,message,sender FROM messages WHERE room_id=? ORDER BY rowid"
            )
                .bind(room_id)
                .fetch_all(&self.pool)
                .await?
        )
    }

    /// Checks the room exists, then validates and inserts. Nothing is written
    /// when the room is missing or the message id is already taken.
    pub async fn append_message(&self, room_id: &str, msg: NewMessage) -> ChatResult<Message> {
        if !self.room_exists(room_id).await? {
            return Err(ChatError::RoomNotFound(room_id.to_owned()));
        }
        msg.validate()?;

        sqlx::query("INSERT INTO messages (message_id,room_id,message,sender) VALUES (?,?,?,?)")
            .bind(&msg.message_id)
            .bind(room_id)
            .bind(&msg.message)
            .bind(&msg.from)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, || format!("message {}", msg.message_id)))?;

        tracing::debug!(room_id, message_id = %msg.message_id, "message saved");

        let NewMessage { message_id, message, from } = msg;
        Ok(Message {
            room_id: room_id.to_owned(),
            message_id,
            message,
            from,
        })
    }
}

fn conflict_or(err: sqlx::Error, what: impl FnOnce() -> String) -> ChatError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ChatError::Conflict(what()),
        _ => ChatError::Store(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str, name: &str, private: bool) -> NewRoom {
        NewRoom { room_id: id.to_owned(), name: name.to_owned(), private }
    }

    fn msg(id: &str, body: &str, from: &str) -> NewMessage {
        NewMessage { message_id: id.to_owned(), message: body.to_owned(), from: from.to_owned() }
    }

    #[tokio::test]
    async fn created_rooms_can_be_fetched() {
        let store = Store::in_memory().await.unwrap();
        store.create_room(&room("r1", "General", false)).await.unwrap();
        store.create_room(&room("r2", "Secret", true)).await.unwrap();

        assert_eq!(
            store.get_room("r1").await.unwrap(),
            RoomSummary { room_id: "r1".to_owned(), name: "General".to_owned() }
        );
        assert_eq!(store.get_room("r2").await.unwrap().name, "Secret");
        assert!(matches!(store.get_room("r3").await, Err(ChatError::NotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_room_is_rejected_and_original_kept() {
        let store = Store::in_memory().await.unwrap();
        store.create_room(&room("r1", "General", false)).await.unwrap();

        let err = store.create_room(&room("r1", "Hijack", true)).await.unwrap_err();
        assert!(matches!(err, ChatError::Conflict(_)), "{err:?}");

        let kept = store.get_room("r1").await.unwrap();
        assert_eq!(kept.name, "General");
        assert_eq!(store.list_public_rooms().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn private_rooms_are_not_listed() {
        let store = Store::in_memory().await.unwrap();
        store.create_room(&room("pub", "Lobby", false)).await.unwrap();
        store.create_room(&room("priv", "Hideout", true)).await.unwrap();

        let listed = store.list_public_rooms().await.unwrap();
        assert_eq!(listed, vec![RoomSummary { room_id: "pub".to_owned(), name: "Lobby".to_owned() }]);
    }

    #[tokio::test]
    async fn empty_room_id_is_invalid() {
        let store = Store::in_memory().await.unwrap();
        let err = store.create_room(&room("", "Nameless", false)).await.unwrap_err();
        assert!(matches!(err, ChatError::Invalid(_)));
    }

    #[tokio::test]
    async fn message_into_missing_room_writes_nothing() {
        let store = Store::in_memory().await.unwrap();

        let err = store.append_message("nope", msg("m1", "hi", "alice")).await.unwrap_err();
        assert!(matches!(err, ChatError::RoomNotFound(_)));
        assert!(store.list_messages("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_room_wins_over_invalid_message() {
        let store = Store::in_memory().await.unwrap();
        store.create_room(&room("r1", "General", false)).await.unwrap();

        let err = store.append_message("ghost", msg("", "hi", "alice")).await.unwrap_err();
        assert!(matches!(err, ChatError::RoomNotFound(_)), "{err:?}");

        let err = store.append_message("r1", msg("", "hi", "alice")).await.unwrap_err();
        assert!(matches!(err, ChatError::Invalid(_)), "{err:?}");
        assert!(store.list_messages("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn messages_are_listed_per_room_in_insertion_order() {
        let store = Store::in_memory().await.unwrap();
        store.create_room(&room("r1", "General", false)).await.unwrap();
        store.create_room(&room("r2", "Random", false)).await.unwrap();

        store.append_message("r1", msg("m2", "first", "alice")).await.unwrap();
        store.append_message("r2", msg("m3", "elsewhere", "bob")).await.unwrap();
        let saved = store.append_message("r1", msg("m1", "second", "bob")).await.unwrap();
        assert_eq!(saved.room_id, "r1");
        assert_eq!(saved.payload(), msg("m1", "second", "bob"));

        let ids: Vec<_> = store.list_messages("r1").await.unwrap()
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(ids, ["m2", "m1"]);
    }

    #[tokio::test]
    async fn duplicate_message_id_does_not_overwrite() {
        let store = Store::in_memory().await.unwrap();
        store.create_room(&room("r1", "General", false)).await.unwrap();
        store.create_room(&room("r2", "Random", false)).await.unwrap();
        store.append_message("r1", msg("m1", "hi", "alice")).await.unwrap();

        let err = store.append_message("r2", msg("m1", "overwrite", "mallory")).await.unwrap_err();
        assert!(matches!(err, ChatError::Conflict(_)), "{err:?}");

        let r1 = store.list_messages("r1").await.unwrap();
        assert_eq!(r1.len(), 1);
        assert_eq!(r1[0].message, "hi");
        assert_eq!(r1[0].from, "alice");
        assert!(store.list_messages("r2").await.unwrap().is_empty());
    }
}
