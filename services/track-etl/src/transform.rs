//!
//! src/transform.rs
//!
//! Maps raw catalog records onto NormalizedTrack. Same order and
//! cardinality as the input; the first malformed record fails the batch
//!

use serde_json::Value;

use crate::errors::EtlError;
use crate::types::NormalizedTrack;

fn missing(index: usize, path: &str) -> EtlError {
    EtlError::Transform(format!("record {index}: missing field `{path}`"))
}

fn mistyped(index: usize, path: &str, want: &str) -> EtlError {
    EtlError::Transform(format!("record {index}: field `{path}` is not {want}"))
}

/// Looks up a json pointer, treating null the same as absent
fn field<'a>(track: &'a Value, pointer: &str) -> Option<&'a Value> {
    track.pointer(pointer).filter(|v| !v.is_null())
}

fn required_str(track: &Value, index: usize, pointer: &str) -> Result<String, EtlError> {
    let path = &pointer[1..];
    match field(track, pointer) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(mistyped(index, path, "a string")),
        None => Err(missing(index, path))
    }
}

fn required_i64(track: &Value, index: usize, pointer: &str) -> Result<i64, EtlError> {
    let path = &pointer[1..];
    let value = field(track, pointer).ok_or_else(|| missing(index, path))?;
    value.as_i64().ok_or_else(|| mistyped(index, path, "an integer"))
}

fn required_bool(track: &Value, index: usize, pointer: &str) -> Result<bool, EtlError> {
    let path = &pointer[1..];
    let value = field(track, pointer).ok_or_else(|| missing(index, path))?;
    value.as_bool().ok_or_else(|| mistyped(index, path, "a boolean"))
}

/// Catalog ids arrive as numbers but are stored as text
fn id_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None
    }
}

/// Year from the first four characters of `YYYY-MM-DD`; empty dates are unset
pub fn parse_release_year(release_date: &str) -> Result<Option<i32>, String> {
    if release_date.is_empty() {
        return Ok(None);
    }
    let prefix: String = release_date.chars().take(4).collect();
    prefix.parse::<i32>()
        .map(Some)
        .map_err(|_| format!("release date {release_date:?} has no leading year"))
}

pub fn decade_of(year: i32) -> i32 {
    year.div_euclid(10) * 10
}

pub fn transform_track(track: &Value, index: usize, genre: &str) ->
    Result<NormalizedTrack, EtlError> {
    let deezer_id = match field(track, "/id") {
        Some(v) => Some(id_as_string(v).ok_or_else(|| mistyped(index, "id", "an id"))?),
        None => None
    };

    let artist_id = field(track, "/artist/id")
        .ok_or_else(|| missing(index, "artist/id"))
        .and_then(|v| id_as_string(v).ok_or_else(|| mistyped(index, "artist/id", "an id")))?;

    let release_year = match field(track, "/album/release_date") {
        Some(Value::String(date)) => parse_release_year(date)
            .map_err(|e| EtlError::Transform(format!("record {index}: {e}")))?,
        Some(_) => return Err(mistyped(index, "album/release_date", "a string")),
        None => None
    };

    let popularity = match field(track, "/rank") {
        Some(v) => v.as_i64().ok_or_else(|| mistyped(index, "rank", "an integer"))?,
        None => 0
    };

    Ok( NormalizedTrack {
        deezer_id,
        title: required_str(track, index, "/title")?,
        artist: required_str(track, index, "/artist/name")?,
        artist_id,
        album: required_str(track, index, "/album/title")?,
        duration: required_i64(track, index, "/duration")?,
        popularity,
        explicit: required_bool(track, index, "/explicit_lyrics")?,
        release_year,
        decade: release_year.map(decade_of),
        genre: genre.to_string(),
        cover_url: field(track, "/album/cover_medium")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    })
}

pub fn transform_tracks(raw: &[Value], genre: &str) -> Result<Vec<NormalizedTrack>, EtlError> {
    raw.iter()
        .enumerate()
        .map(|(index, track)| transform_track(track, index, genre))
        .collect()
}
