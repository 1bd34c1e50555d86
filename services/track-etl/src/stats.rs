//!
//! src/stats.rs
//!
//! Aggregates stored tracks into the dashboard summary: top artists by
//! average popularity, counts per decade, duration and explicit share
//!

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::types::StoredTrack;

pub const TOP_ARTISTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistStat {
    pub name: String,
    pub track_count: usize,
    pub avg_popularity: i64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackStats {
    pub total_tracks: usize,
    pub top_artists: Vec<ArtistStat>,
    pub decade_counts: BTreeMap<i32, usize>,
    pub avg_duration: i64,
    pub explicit_count: usize,
    pub explicit_percent: i64
}

fn rounded_ratio(num: i64, den: i64) -> i64 {
    if den == 0 { 0 } else { (num as f64 / den as f64).round() as i64 }
}

pub fn summarize(tracks: &[StoredTrack]) -> TrackStats {
    let total = tracks.len();

    // (count, popularity sum) per artist
    let mut by_artist: HashMap<&str, (usize, i64)> = HashMap::new();
    for t in tracks {
        let entry = by_artist.entry(t.artist.as_str()).or_default();
        entry.0 += 1;
        entry.1 += t.popularity;
    }

    let mut top_artists: Vec<ArtistStat> = by_artist.into_iter()
        .map(|(name, (count, pop))| ArtistStat {
            name: name.to_string(),
            track_count: count,
            avg_popularity: rounded_ratio(pop, count as i64)
        })
        .collect();
    // ties broken by name so output is stable
    top_artists.sort_by(|a, b| b.avg_popularity.cmp(&a.avg_popularity)
        .then_with(|| a.name.cmp(&b.name)));
    top_artists.truncate(TOP_ARTISTS);

    let mut decade_counts = BTreeMap::new();
    for decade in tracks.iter().filter_map(|t| t.decade) {
        *decade_counts.entry(decade).or_insert(0) += 1;
    }

    let explicit_count = tracks.iter().filter(|t| t.explicit).count();
    let duration_sum: i64 = tracks.iter().map(|t| t.duration).sum();

    TrackStats {
        total_tracks: total,
        top_artists,
        decade_counts,
        avg_duration: rounded_ratio(duration_sum, total as i64),
        explicit_count,
        explicit_percent: rounded_ratio(explicit_count as i64 * 100, total as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(artist: &str, popularity: i64, decade: Option<i32>, explicit: bool, duration: i64) -> StoredTrack {
        StoredTrack {
            id: 0,
            natural_key: String::new(),
            deezer_id: None,
            title: "t".to_string(),
            artist: artist.to_string(),
            artist_id: "1".to_string(),
            album: "a".to_string(),
            duration,
            popularity,
            explicit,
            release_year: decade,
            decade,
            genre: "pop".to_string(),
            cover_url: None,
            created_at: 0,
            updated_at: 0
        }
    }

    #[test]
    fn empty_input_is_all_zero() {
        let s = summarize(&[]);
        assert_eq!(s.total_tracks, 0);
        assert!(s.top_artists.is_empty());
        assert!(s.decade_counts.is_empty());
        assert_eq!(s.avg_duration, 0);
        assert_eq!(s.explicit_percent, 0);
    }

    #[test]
    fn aggregates_dashboard_figures() {
        let tracks = vec![
            stored("A", 100, Some(1990), true, 200),
            stored("A", 51, Some(1990), false, 100),
            stored("B", 90, Some(2000), false, 300),
            stored("C", 10, None, false, 0),
        ];
        let s = summarize(&tracks);
        assert_eq!(s.total_tracks, 4);
        assert_eq!(s.top_artists[0], ArtistStat {
            name: "B".to_string(), track_count: 1, avg_popularity: 90
        });
        assert_eq!(s.top_artists[1].name, "A");
        assert_eq!(s.top_artists[1].avg_popularity, 76);
        assert_eq!(s.decade_counts.get(&1990), Some(&2));
        assert_eq!(s.decade_counts.get(&2000), Some(&1));
        assert_eq!(s.decade_counts.len(), 2);
        assert_eq!(s.avg_duration, 150);
        assert_eq!(s.explicit_count, 1);
        assert_eq!(s.explicit_percent, 25);
    }

    #[test]
    fn keeps_only_top_ten_artists() {
        let tracks: Vec<StoredTrack> = (0..15)
            .map(|i| stored(&format!("artist{i:02}"), i, None, false, 10))
            .collect();
        let s = summarize(&tracks);
        assert_eq!(s.top_artists.len(), TOP_ARTISTS);
        assert_eq!(s.top_artists[0].name, "artist14");
    }
}
