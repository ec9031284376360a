//! Public room list
//!
//! Freematch picks its room from the public lobby feed. Only open rooms whose
//! map file name contains every word of the configured keyword are kept.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::Result;

/// Lobby feed endpoint
pub const FEED_URL: &str = "https://hera.pet/games.json";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) nox-autopilot/0.1";
const FEED_TIMEOUT: Duration = Duration::from_secs(5);

/// One open lobby room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Feed identifier, used as the blacklist key
    pub id: String,
    pub name: String,
    pub host: String,
    /// Map path as published (may contain backslashes)
    pub map: String,
    pub players: u32,
}

/// Source of open rooms
pub trait RoomFeed: Send + Sync {
    /// Open rooms whose map matches `map_keyword`; empty on any failure
    fn fetch(&self, map_keyword: &str) -> Vec<Room>;
}

/// Upper-cased words of `text`, split on whitespace, `_` and `-`
pub fn map_words(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|w| !w.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// Whether the file name of `map_path` contains every keyword word
pub fn map_matches(map_path: &str, keyword_words: &[String]) -> bool {
    let normalized = map_path.replace('\\', "/");
    let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);
    let joined = map_words(file_name).join(" ");
    keyword_words.iter().all(|w| joined.contains(w.as_str()))
}

fn text_field(room: &serde_json::Map<String, Value>, key: &str) -> String {
    match room.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Non-negative count; values beyond `u32` saturate so the room reads as full
fn count_field(room: &serde_json::Map<String, Value>, key: &str) -> u32 {
    let count = match room.get(key) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    count.map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

/// Parse a feed document and keep open rooms matching `map_keyword`
pub fn parse_rooms(body: &str, map_keyword: &str) -> Result<Vec<Room>> {
    let document: Value = serde_json::from_str(body)?;
    let Value::Array(entries) = document else {
        return Ok(Vec::new());
    };
    let keyword = map_words(map_keyword);

    Ok(entries
        .iter()
        .filter_map(Value::as_object)
        .filter(|room| room.get("status").and_then(Value::as_str) == Some("open"))
        .filter(|room| map_matches(&text_field(room, "map"), &keyword))
        .map(|room| Room {
            id: text_field(room, "id"),
            name: text_field(room, "name"),
            host: text_field(room, "host"),
            map: text_field(room, "map"),
            players: count_field(room, "players"),
        })
        .collect())
}

/// Feed fetched over HTTPS
pub struct HttpRoomFeed {
    url: String,
    client: Option<reqwest::blocking::Client>,
}

impl HttpRoomFeed {
    pub fn new() -> Self {
        Self::with_url(FEED_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(FEED_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();
        let client = match client {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Room feed client unavailable: {}", e);
                None
            }
        };
        Self {
            url: url.into(),
            client,
        }
    }

    fn fetch_body(&self) -> Result<String> {
        let Some(client) = &self.client else {
            return Ok(String::from("[]"));
        };
        let body = client.get(&self.url).send()?.error_for_status()?.text()?;
        Ok(body)
    }
}

impl Default for HttpRoomFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomFeed for HttpRoomFeed {
    fn fetch(&self, map_keyword: &str) -> Vec<Room> {
        let rooms = self
            .fetch_body()
            .and_then(|body| parse_rooms(&body, map_keyword));
        match rooms {
            Ok(rooms) => {
                debug!("Room feed: {} matching rooms", rooms.len());
                rooms
            }
            Err(e) => {
                warn!("Room feed fetch failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Fixed room list (for testing)
#[derive(Debug, Default, Clone)]
pub struct StaticRoomFeed {
    rooms: Vec<Room>,
}

impl StaticRoomFeed {
    pub fn new(rooms: Vec<Room>) -> Self {
        Self { rooms }
    }
}

impl RoomFeed for StaticRoomFeed {
    fn fetch(&self, map_keyword: &str) -> Vec<Room> {
        let keyword = map_words(map_keyword);
        self.rooms
            .iter()
            .filter(|room| map_matches(&room.map, &keyword))
            .cloned()
            .collect()
    }
}
