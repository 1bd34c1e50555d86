//!
//! src/persistent.rs
//!
//! Defines the load stage: a sqlite table of tracks keyed by a unique
//! natural key, filled one all-or-nothing transaction per run
//!

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteConnectOptions, Pool, Row, Sqlite};
use tracing::{debug, warn};

use crate::errors::EtlError;
use crate::types::{NormalizedTrack, StoredTrack};

/// Outcome of one load call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub staged: usize,
    pub inserted: usize,
    pub skipped: usize
}

/// Seam between the pipeline and whatever persists its output
#[async_trait]
pub trait TrackStore: Send + Sync {
    async fn load_tracks(&self, tracks: &[NormalizedTrack]) -> Result<LoadReport, EtlError>;
}

pub struct Persistent {
    pool: Pool<Sqlite>
}

impl Persistent {

    async fn ensure_schema(pool: &Pool<Sqlite>) -> Result<(), EtlError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tracks (
              id                INTEGER PRIMARY KEY AUTOINCREMENT,
              natural_key       TEXT NOT NULL UNIQUE,
              deezer_id         TEXT,
              title             TEXT NOT NULL,
              artist            TEXT NOT NULL,
              artist_id         TEXT NOT NULL,
              album             TEXT NOT NULL,
              duration          INTEGER NOT NULL,
              popularity        INTEGER NOT NULL DEFAULT 0,
              explicit          INTEGER NOT NULL,
              release_year      INTEGER,
              decade            INTEGER,
              genre             TEXT NOT NULL,
              cover_url         TEXT,
              created_at        INTEGER NOT NULL,
              updated_at        INTEGER NOT NULL
            );
            "
        ).execute(pool).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_genre ON tracks(genre);")
            .execute(pool).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_decade ON tracks(decade);")
            .execute(pool).await?;

        Ok(())
    }

    pub async fn init(database_url: &str, busy_timeout: Duration) -> Result<Self, EtlError> {
        let is_memory = database_url.contains(":memory:");

        let mut opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(busy_timeout);

        // WAL is file-only
        if !is_memory {
            opts = opts.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                       .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        }

        // an in-memory database lives exactly as long as its one connection
        let mut pool_opts = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(if is_memory {1} else {8});
        if is_memory {
            pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        Self::ensure_schema(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn count_tracks(&self) -> Result<i64, EtlError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM tracks;")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Stages every record inside one transaction and commits once.
    /// Any error rolls the whole batch back
    pub async fn insert_new_tracks(&self, tracks: &[NormalizedTrack]) ->
        Result<LoadReport, EtlError> {
        let mut tx = self.pool.begin().await?;
        let mut report = LoadReport { staged: tracks.len(), ..LoadReport::default() };

        let staged: Result<(), sqlx::Error> = async {
            for track in tracks {
                let key = track.natural_key();

                let existing: Option<i64> = sqlx::query_scalar(
                    "SELECT id FROM tracks WHERE natural_key = ?1 LIMIT 1;"
                )
                .bind(key.as_str())
                .fetch_optional(&mut *tx)
                .await?;

                if existing.is_some() {
                    debug!(natural_key = %key, "load.skip.existing");
                    report.skipped += 1;
                    continue;
                }

                let now = Self::now();
                let inserted = sqlx::query(
                    r"
                    INSERT INTO tracks (
                        natural_key, deezer_id, title, artist, artist_id, album,
                        duration, popularity, explicit, release_year, decade,
                        genre, cover_url, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                    ON CONFLICT(natural_key) DO NOTHING;
                    "
                )
                .bind(key.as_str())
                .bind(track.deezer_id.as_deref())
                .bind(&track.title)
                .bind(&track.artist)
                .bind(&track.artist_id)
                .bind(&track.album)
                .bind(track.duration)
                .bind(track.popularity)
                .bind(i32::from(track.explicit))
                .bind(track.release_year)
                .bind(track.decade)
                .bind(&track.genre)
                .bind(track.cover_url.as_deref())
                .bind(now)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if inserted == 0 {
                    report.skipped += 1;
                } else {
                    report.inserted += 1;
                }
            }
            Ok(())
        }.await;

        if let Err(e) = staged {
            warn!(error = %e, "load.rollback");
            tx.rollback().await?;
            return Err(e.into());
        }

        tx.commit().await?;
        Ok(report)
    }

    /// Stored rows newest first, optionally restricted to one genre
    pub async fn list_tracks(&self, genre: Option<&str>, limit: i64) ->
        Result<Vec<StoredTrack>, EtlError> {
        let rows = sqlx::query(
            r"
            SELECT id, natural_key, deezer_id, title, artist, artist_id, album,
                   duration, popularity, explicit, release_year, decade, genre,
                   cover_url, created_at, updated_at
              FROM tracks
             WHERE ?1 IS NULL OR genre = ?1
             ORDER BY id DESC
             LIMIT ?2;
            "
        )
        .bind(genre)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|r| -> Result<StoredTrack, EtlError> { Ok(StoredTrack {
            id: r.try_get("id")?,
            natural_key: r.try_get("natural_key")?,
            deezer_id: r.try_get("deezer_id")?,
            title: r.try_get("title")?,
            artist: r.try_get("artist")?,
            artist_id: r.try_get("artist_id")?,
            album: r.try_get("album")?,
            duration: r.try_get("duration")?,
            popularity: r.try_get("popularity")?,
            explicit: r.try_get::<i64, _>("explicit")? == 1,
            release_year: r.try_get("release_year")?,
            decade: r.try_get("decade")?,
            genre: r.try_get("genre")?,
            cover_url: r.try_get("cover_url")?,
            created_at: r.try_get("created_at")?,
            updated_at: r.try_get("updated_at")?
        }) }).collect()
    }
}

#[async_trait]
impl TrackStore for Persistent {
    async fn load_tracks(&self, tracks: &[NormalizedTrack]) -> Result<LoadReport, EtlError> {
        self.insert_new_tracks(tracks).await
    }
}
