//! Channel repository

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::{Channel, ChannelFilter, ChannelKind};
use crate::{Error, Result};

/// A channel definition ready to be numbered and persisted.
#[derive(Debug, Clone)]
pub struct ChannelDraft {
    pub name: String,
    pub kind: ChannelKind,
    pub preset_id: Option<String>,
    pub filter: Option<ChannelFilter>,
    pub item_ids: Vec<String>,
    pub sort_order: i64,
    pub ai_prompt: Option<String>,
}

/// Fields a channel update may change.
#[derive(Debug, Clone, Default)]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub filter: Option<Option<ChannelFilter>>,
    pub item_ids: Option<Vec<String>>,
    pub sort_order: Option<i64>,
    pub ai_prompt: Option<Option<String>>,
}

#[derive(Clone)]
pub struct ChannelRepository {
    pool: SqlitePool,
}

impl ChannelRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert one channel, allocating `max(number) + 1` inside the same
    /// transaction as the insert.
    pub async fn insert(&self, draft: &ChannelDraft) -> Result<Channel> {
        let mut tx = self.pool.begin().await?;
        let channel = Self::insert_in_tx(&mut tx, draft).await?;
        tx.commit().await?;
        Ok(channel)
    }

    /// Insert a batch of channels with contiguous numbers, atomically.
    pub async fn insert_many(&self, drafts: &[ChannelDraft]) -> Result<Vec<Channel>> {
        let mut tx = self.pool.begin().await?;
        let mut channels = Vec::with_capacity(drafts.len());
        for draft in drafts {
            channels.push(Self::insert_in_tx(&mut tx, draft).await?);
        }
        tx.commit().await?;
        Ok(channels)
    }

    async fn insert_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        draft: &ChannelDraft,
    ) -> Result<Channel> {
        let number: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(number), 0) + 1 FROM channels")
                .fetch_one(&mut **tx)
                .await?;
        let created_at = Utc::now();
        let filter_json = draft
            .filter
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let item_ids_json = serde_json::to_string(&draft.item_ids)?;

        sqlx::query(
            r"
            INSERT INTO channels (number, name, kind, preset_id, filter, item_ids, sort_order, ai_prompt, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(number)
        .bind(&draft.name)
        .bind(draft.kind.as_str())
        .bind(&draft.preset_id)
        .bind(filter_json)
        .bind(item_ids_json)
        .bind(draft.sort_order)
        .bind(&draft.ai_prompt)
        .bind(created_at)
        .execute(&mut **tx)
        .await?;

        Ok(Channel {
            number,
            name: draft.name.clone(),
            kind: draft.kind,
            preset_id: draft.preset_id.clone(),
            filter: draft.filter.clone(),
            item_ids: draft.item_ids.clone(),
            sort_order: draft.sort_order,
            ai_prompt: draft.ai_prompt.clone(),
            created_at,
        })
    }

    pub async fn list(&self) -> Result<Vec<Channel>> {
        let rows = sqlx::query("SELECT * FROM channels ORDER BY number")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(from_row).collect()
    }

    pub async fn get(&self, number: i64) -> Result<Channel> {
        let row = sqlx::query("SELECT * FROM channels WHERE number = ?")
            .bind(number)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Channel {number}")))?;
        from_row(&row)
    }

    pub async fn update(&self, number: i64, update: &ChannelUpdate) -> Result<Channel> {
        let mut channel = self.get(number).await?;
        if let Some(ref name) = update.name {
            channel.name = name.clone();
        }
        if let Some(ref filter) = update.filter {
            channel.filter = filter.clone();
        }
        if let Some(ref item_ids) = update.item_ids {
            channel.item_ids = item_ids.clone();
        }
        if let Some(sort_order) = update.sort_order {
            channel.sort_order = sort_order;
        }
        if let Some(ref ai_prompt) = update.ai_prompt {
            channel.ai_prompt = ai_prompt.clone();
        }

        let filter_json = channel
            .filter
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            r"
            UPDATE channels
            SET name = ?, filter = ?, item_ids = ?, sort_order = ?, ai_prompt = ?
            WHERE number = ?
            ",
        )
        .bind(&channel.name)
        .bind(filter_json)
        .bind(serde_json::to_string(&channel.item_ids)?)
        .bind(channel.sort_order)
        .bind(&channel.ai_prompt)
        .bind(number)
        .execute(&self.pool)
        .await?;

        Ok(channel)
    }

    /// Delete one channel; its schedule blocks go with it (FK cascade).
    pub async fn delete(&self, number: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM channels WHERE number = ?")
            .bind(number)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Channel {number}")));
        }
        Ok(())
    }

    /// Bulk-delete by kind; used by regeneration to clear auto/preset
    /// channels while keeping custom ones.
    pub async fn delete_by_kinds(&self, kinds: &[ChannelKind]) -> Result<u64> {
        let mut deleted = 0;
        let mut tx = self.pool.begin().await?;
        for kind in kinds {
            let result = sqlx::query("DELETE FROM channels WHERE kind = ?")
                .bind(kind.as_str())
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Channel> {
    let kind: String = row.try_get("kind")?;
    let filter: Option<String> = row.try_get("filter")?;
    let item_ids: String = row.try_get("item_ids")?;
    Ok(Channel {
        number: row.try_get("number")?,
        name: row.try_get("name")?,
        kind: ChannelKind::parse(&kind)?,
        preset_id: row.try_get("preset_id")?,
        filter: filter.as_deref().map(serde_json::from_str).transpose()?,
        item_ids: serde_json::from_str(&item_ids)?,
        sort_order: row.try_get("sort_order")?,
        ai_prompt: row.try_get("ai_prompt")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::test_pool;

    fn draft(name: &str, kind: ChannelKind) -> ChannelDraft {
        ChannelDraft {
            name: name.to_string(),
            kind,
            preset_id: Some("auto-genres".to_string()),
            filter: None,
            item_ids: vec!["a".to_string(), "b".to_string()],
            sort_order: 0,
            ai_prompt: None,
        }
    }

    #[tokio::test]
    async fn numbers_allocate_sequentially() {
        let repo = ChannelRepository::new(test_pool().await);
        let first = repo.insert(&draft("One", ChannelKind::Auto)).await.unwrap();
        let second = repo.insert(&draft("Two", ChannelKind::Auto)).await.unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);

        // Allocation follows the current maximum, so a freed top number
        // is handed out again.
        repo.delete(2).await.unwrap();
        let third = repo.insert(&draft("Three", ChannelKind::Auto)).await.unwrap();
        assert_eq!(third.number, 2);
    }

    #[tokio::test]
    async fn duplicate_names_rejected_by_store() {
        let repo = ChannelRepository::new(test_pool().await);
        repo.insert(&draft("Same", ChannelKind::Auto)).await.unwrap();
        let result = repo.insert(&draft("Same", ChannelKind::Custom)).await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn filter_and_items_round_trip() {
        let repo = ChannelRepository::new(test_pool().await);
        let mut d = draft("Filtered", ChannelKind::Preset);
        d.filter = Some(ChannelFilter {
            genres: vec!["Action".to_string()],
            include_episodes: false,
            ..Default::default()
        });
        let created = repo.insert(&d).await.unwrap();

        let fetched = repo.get(created.number).await.unwrap();
        assert_eq!(fetched.item_ids, vec!["a", "b"]);
        let filter = fetched.filter.unwrap();
        assert_eq!(filter.genres, vec!["Action"]);
        assert!(!filter.include_episodes);
        assert_eq!(fetched.kind, ChannelKind::Preset);
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let repo = ChannelRepository::new(test_pool().await);
        let created = repo.insert(&draft("Before", ChannelKind::Custom)).await.unwrap();

        let updated = repo
            .update(
                created.number,
                &ChannelUpdate {
                    name: Some("After".to_string()),
                    item_ids: Some(vec!["z".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "After");
        assert_eq!(updated.item_ids, vec!["z"]);
        assert_eq!(updated.kind, ChannelKind::Custom);
    }

    #[tokio::test]
    async fn delete_by_kinds_preserves_custom() {
        let repo = ChannelRepository::new(test_pool().await);
        repo.insert(&draft("A", ChannelKind::Auto)).await.unwrap();
        repo.insert(&draft("P", ChannelKind::Preset)).await.unwrap();
        repo.insert(&draft("C", ChannelKind::Custom)).await.unwrap();

        let deleted = repo
            .delete_by_kinds(&[ChannelKind::Auto, ChannelKind::Preset])
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let remaining = repo.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "C");
    }
}
