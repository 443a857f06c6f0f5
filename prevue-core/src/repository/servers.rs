//! Server repository
//!
//! Upstream server rows. Access tokens are encrypted before they touch the
//! database and decrypted on the way out, so callers only ever see
//! plaintext tokens in memory.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::MediaServer;
use crate::service::crypto::TokenCipher;
use crate::{Error, Result};

#[derive(Clone)]
pub struct ServerRepository {
    pool: SqlitePool,
    cipher: TokenCipher,
}

impl ServerRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool, cipher: TokenCipher) -> Self {
        Self { pool, cipher }
    }

    pub async fn create(&self, server: &MediaServer) -> Result<()> {
        let token = self.cipher.encrypt(&server.access_token)?;
        sqlx::query(
            r"
            INSERT INTO servers (id, name, base_url, username, access_token, upstream_user_id, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&server.id)
        .bind(&server.name)
        .bind(&server.base_url)
        .bind(&server.username)
        .bind(token)
        .bind(&server.upstream_user_id)
        .bind(server.is_active)
        .bind(server.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<MediaServer>> {
        let rows = sqlx::query("SELECT * FROM servers ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|row| self.from_row(&row)).collect()
    }

    pub async fn get(&self, id: &str) -> Result<MediaServer> {
        let row = sqlx::query("SELECT * FROM servers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Server {id}")))?;
        self.from_row(&row)
    }

    pub async fn get_active(&self) -> Result<Option<MediaServer>> {
        let row = sqlx::query("SELECT * FROM servers WHERE is_active = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| self.from_row(&r)).transpose()
    }

    pub async fn update(
        &self,
        id: &str,
        name: &str,
        base_url: &str,
        username: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE servers SET name = ?, base_url = ?, username = ? WHERE id = ?",
        )
        .bind(name)
        .bind(base_url)
        .bind(username)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Server {id}")));
        }
        Ok(())
    }

    /// Store fresh credentials after a (re)authentication.
    pub async fn update_credentials(
        &self,
        id: &str,
        access_token: &str,
        upstream_user_id: &str,
    ) -> Result<()> {
        let token = self.cipher.encrypt(access_token)?;
        let result = sqlx::query(
            "UPDATE servers SET access_token = ?, upstream_user_id = ? WHERE id = ?",
        )
        .bind(token)
        .bind(upstream_user_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Server {id}")));
        }
        Ok(())
    }

    /// Make one server active and every other server inactive.
    pub async fn set_active(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE servers SET is_active = 0")
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("UPDATE servers SET is_active = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Server {id}")));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Delete a server. Deleting the active server also removes all
    /// channels and schedule blocks, in one transaction; the library cache
    /// goes away via ON DELETE CASCADE either way.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let server = self.get(id).await?;
        let mut tx = self.pool.begin().await?;
        if server.is_active {
            sqlx::query("DELETE FROM schedule_blocks").execute(&mut *tx).await?;
            sqlx::query("DELETE FROM channels").execute(&mut *tx).await?;
        }
        sqlx::query("DELETE FROM library_cache WHERE server_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM servers WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    fn from_row(&self, row: &sqlx::sqlite::SqliteRow) -> Result<MediaServer> {
        let sealed: String = row.try_get("access_token")?;
        Ok(MediaServer {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            base_url: row.try_get("base_url")?,
            username: row.try_get("username")?,
            access_token: self.cipher.decrypt(&sealed)?,
            upstream_user_id: row.try_get("upstream_user_id")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::test_pool;

    fn cipher() -> TokenCipher {
        TokenCipher::from_key_material("test key material for server repo tests")
    }

    fn server(name: &str) -> MediaServer {
        MediaServer::new(name, "http://media.local:8096", "alice", "tok-secret", "u1")
    }

    #[tokio::test]
    async fn create_and_fetch_round_trips_token() {
        let repo = ServerRepository::new(test_pool().await, cipher());
        let created = server("Main");
        repo.create(&created).await.unwrap();

        let fetched = repo.get(&created.id).await.unwrap();
        assert_eq!(fetched.access_token, "tok-secret");
        assert_eq!(fetched.name, "Main");
        assert!(!fetched.is_active);

        // The stored column must not contain the plaintext token.
        let raw: String = sqlx::query_scalar("SELECT access_token FROM servers WHERE id = ?")
            .bind(&created.id)
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert!(!raw.contains("tok-secret"));
        assert_eq!(raw.split(':').count(), 3);
    }

    #[tokio::test]
    async fn set_active_is_exclusive() {
        let repo = ServerRepository::new(test_pool().await, cipher());
        let a = server("A");
        let b = server("B");
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();

        repo.set_active(&a.id).await.unwrap();
        repo.set_active(&b.id).await.unwrap();

        let active = repo.get_active().await.unwrap().unwrap();
        assert_eq!(active.id, b.id);
        assert!(!repo.get(&a.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn deleting_active_server_cascades() {
        let pool = test_pool().await;
        let repo = ServerRepository::new(pool.clone(), cipher());
        let srv = server("Main");
        repo.create(&srv).await.unwrap();
        repo.set_active(&srv.id).await.unwrap();

        sqlx::query(
            "INSERT INTO channels (number, name, kind, item_ids, sort_order, created_at) VALUES (1, 'Ch', 'auto', '[]', 0, ?)",
        )
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO library_cache (server_id, item_id, payload, synced_at) VALUES (?, 'i1', '{}', ?)",
        )
        .bind(&srv.id)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        repo.delete(&srv.id).await.unwrap();

        let channels: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM channels")
            .fetch_one(&pool)
            .await
            .unwrap();
        let cache: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM library_cache")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(channels, 0);
        assert_eq!(cache, 0);
        assert!(repo.get_active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_server_is_not_found() {
        let repo = ServerRepository::new(test_pool().await, cipher());
        assert!(matches!(
            repo.get("nope").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            repo.set_active("nope").await,
            Err(Error::NotFound(_))
        ));
    }
}
