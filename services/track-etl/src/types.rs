use serde::{Deserialize, Serialize};

// Business key used to detect the same track across runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey(pub String);

impl NaturalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category, limit and genre label for one pipeline invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtlParams {
    pub category: String,
    pub limit: u32,
    pub genre: String
}

impl EtlParams {
    /// Genre follows the requested category unless a label is pinned
    pub fn new(category: &str, limit: u32, genre_label: Option<&str>) -> Self {
        Self {
            category: category.to_string(),
            limit,
            genre: genre_label.unwrap_or(category).to_string()
        }
    }
}

/// Track after the transform stage, the shape returned to http callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTrack {
    pub deezer_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub artist_id: String,
    pub album: String,
    pub duration: i64,
    pub popularity: i64,
    pub explicit: bool,
    pub release_year: Option<i32>,
    pub decade: Option<i32>,
    pub genre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>
}

impl NormalizedTrack {
    /// `deezer:<id>` when the catalog id is known, else `artist:<artist_id>:<title>`
    pub fn natural_key(&self) -> NaturalKey {
        match self.deezer_id.as_deref() {
            Some(id) => NaturalKey(format!("deezer:{id}")),
            None => NaturalKey(format!("artist:{}:{}", self.artist_id, self.title))
        }
    }
}

/// Row of the tracks table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTrack {
    pub id: i64,
    pub natural_key: String,
    pub deezer_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub artist_id: String,
    pub album: String,
    pub duration: i64,
    pub popularity: i64,
    pub explicit: bool,
    pub release_year: Option<i32>,
    pub decade: Option<i32>,
    pub genre: String,
    pub cover_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(deezer_id: Option<&str>) -> NormalizedTrack {
        NormalizedTrack {
            deezer_id: deezer_id.map(str::to_string),
            title: "Song A".to_string(),
            artist: "Art".to_string(),
            artist_id: "7".to_string(),
            album: "Alb".to_string(),
            duration: 200,
            popularity: 80,
            explicit: false,
            release_year: Some(2005),
            decade: Some(2000),
            genre: "pop".to_string(),
            cover_url: None
        }
    }

    #[test]
    fn natural_key_prefers_catalog_id() {
        assert_eq!(track(Some("3135556")).natural_key().as_str(), "deezer:3135556");
        assert_eq!(track(None).natural_key().as_str(), "artist:7:Song A");
    }

    #[test]
    fn genre_defaults_to_category() {
        assert_eq!(EtlParams::new("rock", 50, None).genre, "rock");
        assert_eq!(EtlParams::new("rock", 50, Some("pop")).genre, "pop");
    }
}
