//! Conversation turns and per-principal running summaries.

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{params, OptionalExtension};
use tracing::instrument;

use echomind_core::{ConversationId, Principal, Role, Turn};

use crate::database::Database;
use crate::error::StoreError;

/// Storage for prompt context.
pub trait ConversationStore: Send + Sync {
    /// Up to `limit` most recent turns of one conversation, oldest first.
    fn recent_turns(
        &self,
        principal: &Principal,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>, StoreError>;

    /// Append turns in order.
    fn append(
        &self,
        principal: &Principal,
        conversation: &ConversationId,
        turns: &[Turn],
    ) -> Result<(), StoreError>;

    /// Running summary for the principal, `""` when none exists.
    fn summary(&self, principal: &Principal) -> Result<String, StoreError>;

    fn set_summary(&self, principal: &Principal, summary: &str) -> Result<(), StoreError>;

    /// Number of stored turns in one conversation.
    fn turn_count(
        &self,
        principal: &Principal,
        conversation: &ConversationId,
    ) -> Result<usize, StoreError>;
}

#[derive(Default)]
pub struct MemoryConversationStore {
    turns: DashMap<(Principal, ConversationId), Vec<Turn>>,
    summaries: DashMap<Principal, String>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryConversationStore {
    fn recent_turns(
        &self,
        principal: &Principal,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>, StoreError> {
        let key = (principal.clone(), conversation.clone());
        Ok(self
            .turns
            .get(&key)
            .map(|log| {
                let skip = log.len().saturating_sub(limit);
                log[skip..].to_vec()
            })
            .unwrap_or_default())
    }

    fn append(
        &self,
        principal: &Principal,
        conversation: &ConversationId,
        turns: &[Turn],
    ) -> Result<(), StoreError> {
        self.turns
            .entry((principal.clone(), conversation.clone()))
            .or_default()
            .extend_from_slice(turns);
        Ok(())
    }

    fn summary(&self, principal: &Principal) -> Result<String, StoreError> {
        Ok(self
            .summaries
            .get(principal)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }

    fn set_summary(&self, principal: &Principal, summary: &str) -> Result<(), StoreError> {
        let _ = self.summaries.insert(principal.clone(), summary.to_string());
        Ok(())
    }

    fn turn_count(
        &self,
        principal: &Principal,
        conversation: &ConversationId,
    ) -> Result<usize, StoreError> {
        let key = (principal.clone(), conversation.clone());
        Ok(self.turns.get(&key).map_or(0, |log| log.len()))
    }
}

pub struct SqliteConversationStore {
    db: Database,
}

impl SqliteConversationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl ConversationStore for SqliteConversationStore {
    #[instrument(skip_all, fields(principal = %principal, conversation = %conversation, limit))]
    fn recent_turns(
        &self,
        principal: &Principal,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content FROM turns
                 WHERE principal = ?1 AND conversation_id = ?2
                 ORDER BY id DESC LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(
                    params![principal.as_str(), conversation.as_str(), limit],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )?
                .collect::<Result<Vec<_>, _>>()?;

            let mut turns = rows
                .into_iter()
                .map(|(role, content)| {
                    let role: Role = role.parse().map_err(StoreError::Corrupt)?;
                    Ok(Turn { role, content })
                })
                .collect::<Result<Vec<_>, StoreError>>()?;
            turns.reverse();
            Ok(turns)
        })
    }

    #[instrument(skip_all, fields(principal = %principal, conversation = %conversation, count = turns.len()))]
    fn append(
        &self,
        principal: &Principal,
        conversation: &ConversationId,
        turns: &[Turn],
    ) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            let now = Utc::now().to_rfc3339();
            let mut stmt = tx.prepare(
                "INSERT INTO turns (principal, conversation_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for turn in turns {
                let _ = stmt.execute(params![
                    principal.as_str(),
                    conversation.as_str(),
                    turn.role.as_str(),
                    turn.content,
                    now
                ])?;
            }
            Ok(())
        })
    }

    #[instrument(skip_all, fields(principal = %principal))]
    fn summary(&self, principal: &Principal) -> Result<String, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT summary FROM summaries WHERE principal = ?1",
                    [principal.as_str()],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .unwrap_or_default())
        })
    }

    #[instrument(skip_all, fields(principal = %principal))]
    fn set_summary(&self, principal: &Principal, summary: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO summaries (principal, summary, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(principal) DO UPDATE SET summary = excluded.summary, updated_at = excluded.updated_at",
                params![principal.as_str(), summary, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    fn turn_count(
        &self,
        principal: &Principal,
        conversation: &ConversationId,
    ) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM turns WHERE principal = ?1 AND conversation_id = ?2",
                params![principal.as_str(), conversation.as_str()],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }
}
