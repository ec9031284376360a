//! Settings for the autopilot
//!
//! The persisted store is a flat key/value map (JSON, or TOML for hand-written
//! setups). `Settings` is the typed view of that map: well-known keys become
//! fields with defaults, everything else stays in `extra` and is read through
//! the typed accessors.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::input::Point;
use crate::{AutopilotError, Result};

fn default_true() -> bool {
    true
}

fn default_role() -> Role {
    Role::Freematch
}

fn default_fm_map() -> String {
    "NOX RPG".to_string()
}

fn default_fm_max() -> u32 {
    6
}

fn default_dr_delay() -> u32 {
    15
}

fn default_one() -> u32 {
    1
}

fn default_auto_start_timeout() -> u64 {
    180
}

fn default_autosave_interval() -> u64 {
    300
}

fn default_hunt_radius() -> u32 {
    1000
}

fn default_hero_group() -> u8 {
    1
}

fn default_storage_group() -> u8 {
    2
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("image_search")
}

/// Which lobby branch the login loop takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Create the room and wait for players
    Host,
    /// Join a preset room by name
    Guest,
    /// Pick an open room from the public feed
    Freematch,
}

/// What the hero does after walking through a portal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuntAction {
    /// Switch auto-hunt on where the portal drops the hero
    Instant,
    /// Walk to a preset zone first
    Zone,
    /// Walk a user-entered list of waypoints first
    Custom,
}

impl HuntAction {
    pub fn from_index(index: u8) -> Self {
        match index {
            1 => HuntAction::Zone,
            2 => HuntAction::Custom,
            _ => HuntAction::Instant,
        }
    }
}

/// Portal destinations on the town teleporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Portal {
    Q,
    W,
    E,
    R,
    A,
    S,
    D,
    F,
    Z,
    X,
    C,
}

impl Portal {
    pub const ALL: [Portal; 11] = [
        Portal::Q,
        Portal::W,
        Portal::E,
        Portal::R,
        Portal::A,
        Portal::S,
        Portal::D,
        Portal::F,
        Portal::Z,
        Portal::X,
        Portal::C,
    ];

    /// Prefix of the per-portal setting keys (`nh_boss_timer`, `nh_e_boss_timer`, ...)
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Portal::Q => "nh",
            Portal::W => "nh_w",
            Portal::E => "nh_e",
            Portal::R => "nh_r",
            Portal::A => "nh_a",
            Portal::S => "nh_s",
            Portal::D => "nh_d",
            Portal::F => "nh_f",
            Portal::Z => "nh_z",
            Portal::X => "nh_x",
            Portal::C => "nh_c",
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Portal::Q => 'Q',
            Portal::W => 'W',
            Portal::E => 'E',
            Portal::R => 'R',
            Portal::A => 'A',
            Portal::S => 'S',
            Portal::D => 'D',
            Portal::F => 'F',
            Portal::Z => 'Z',
            Portal::X => 'X',
            Portal::C => 'C',
        }
    }
}

impl FromStr for Portal {
    type Err = AutopilotError;

    /// Accepts the bare letter or a label that starts with it ("E portal | ...").
    fn from_str(s: &str) -> Result<Self> {
        let letter = s
            .trim()
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .ok_or_else(|| AutopilotError::InvalidSetting("empty portal key".to_string()))?;
        Portal::ALL
            .iter()
            .copied()
            .find(|p| p.letter() == letter)
            .ok_or_else(|| AutopilotError::InvalidSetting(format!("unknown portal '{}'", s)))
    }
}

/// Playable characters on the selection screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Character {
    SwordSaint,
    Templar,
    Hunter,
    Mage,
    Lancer,
    Swordsman,
}

impl Character {
    pub const ALL: [Character; 6] = [
        Character::SwordSaint,
        Character::Templar,
        Character::Hunter,
        Character::Mage,
        Character::Lancer,
        Character::Swordsman,
    ];
}

impl FromStr for Character {
    type Err = AutopilotError;

    /// Accepts the slug or the in-game display name
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "sword_saint" | "검성" => Ok(Character::SwordSaint),
            "templar" | "템플러" => Ok(Character::Templar),
            "hunter" | "사냥꾼" => Ok(Character::Hunter),
            "mage" | "마도사" => Ok(Character::Mage),
            "lancer" | "창술사" => Ok(Character::Lancer),
            "swordsman" | "검객" => Ok(Character::Swordsman),
            other => Err(AutopilotError::InvalidSetting(format!(
                "unknown character '{}'",
                other
            ))),
        }
    }
}

/// Hunting options resolved from either the normal-hunt or boss-raid keys
#[derive(Debug, Clone, PartialEq)]
pub struct HuntProfile {
    pub portal: Portal,
    pub action: HuntAction,
    /// Whether a death detector runs (and a death restarts the portal loop)
    pub respawn: bool,
    pub zone_index: usize,
    pub custom_waypoints: Vec<Point>,
}

/// Typed view of the persisted settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ---- login & lobby ----
    #[serde(default)]
    pub bnet_password: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub room_name: String,
    #[serde(default)]
    pub room_private: bool,

    // ---- freematch ----
    #[serde(default)]
    pub fm_room_name: String,
    #[serde(default)]
    pub fm_host: String,
    #[serde(default = "default_fm_map")]
    pub fm_map_name: String,
    #[serde(default = "default_fm_max")]
    pub fm_max_players: u32,

    // ---- host ----
    #[serde(default = "default_dr_delay")]
    pub dr_delay: u32,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_one")]
    pub auto_start_count: u32,
    /// Seconds; 0 waits forever
    #[serde(default = "default_auto_start_timeout")]
    pub auto_start_timeout: u64,

    // ---- loading ----
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default = "default_true")]
    pub attendance_check: bool,

    // ---- in-game ----
    #[serde(default = "default_true")]
    pub ingame_restart_on_event: bool,
    #[serde(default = "default_true")]
    pub auto_save_enabled: bool,
    #[serde(default = "default_autosave_interval")]
    pub auto_save_interval: u64,
    #[serde(default)]
    pub auto_hunt: bool,
    #[serde(default)]
    pub stay_hunt: bool,
    #[serde(default = "default_hunt_radius")]
    pub hunt_radius: u32,
    #[serde(default = "default_true")]
    pub control_group_enabled: bool,
    #[serde(default = "default_hero_group")]
    pub hero_group: u8,
    #[serde(default = "default_storage_group")]
    pub storage_group: u8,

    // ---- hunting ----
    #[serde(default)]
    pub normal_hunt_enabled: bool,
    #[serde(default)]
    pub normal_hunt_portal_key: String,
    #[serde(default)]
    pub normal_hunt_action: u8,
    #[serde(default = "default_true")]
    pub normal_hunt_respawn: bool,
    #[serde(default = "default_true")]
    pub normal_hunt_boss_enabled: bool,
    #[serde(default)]
    pub boss_raid_enabled: bool,
    #[serde(default)]
    pub boss_raid_portal_key: String,
    #[serde(default)]
    pub boss_raid_action: u8,
    #[serde(default = "default_true")]
    pub boss_raid_respawn: bool,
    #[serde(default)]
    pub nh_custom_coords: Vec<Vec<i32>>,
    #[serde(default)]
    pub br_custom_coords: Vec<Vec<i32>>,

    // ---- environment ----
    #[serde(default)]
    pub launcher_path: Option<PathBuf>,
    #[serde(default)]
    pub launcher_args: Vec<String>,
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    /// Every key without a dedicated field
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bnet_password: String::new(),
            role: default_role(),
            room_name: String::new(),
            room_private: false,
            fm_room_name: String::new(),
            fm_host: String::new(),
            fm_map_name: default_fm_map(),
            fm_max_players: default_fm_max(),
            dr_delay: default_dr_delay(),
            auto_start: false,
            auto_start_count: default_one(),
            auto_start_timeout: default_auto_start_timeout(),
            character: None,
            attendance_check: true,
            ingame_restart_on_event: true,
            auto_save_enabled: true,
            auto_save_interval: default_autosave_interval(),
            auto_hunt: false,
            stay_hunt: false,
            hunt_radius: default_hunt_radius(),
            control_group_enabled: true,
            hero_group: default_hero_group(),
            storage_group: default_storage_group(),
            normal_hunt_enabled: false,
            normal_hunt_portal_key: String::new(),
            normal_hunt_action: 0,
            normal_hunt_respawn: true,
            normal_hunt_boss_enabled: true,
            boss_raid_enabled: false,
            boss_raid_portal_key: String::new(),
            boss_raid_action: 0,
            boss_raid_respawn: true,
            nh_custom_coords: Vec::new(),
            br_custom_coords: Vec::new(),
            launcher_path: None,
            launcher_args: Vec::new(),
            template_dir: default_template_dir(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Settings {
    /// Build settings from an already parsed JSON value.
    ///
    /// A key whose value does not fit its field is dropped with a warning and
    /// the field keeps its default. Only a document that is not a map fails.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(AutopilotError::InvalidSetting(
                "settings document is not a key/value map".to_string(),
            ));
        };
        let mut accepted = serde_json::Map::with_capacity(map.len());
        for (key, value) in map {
            let mut single = serde_json::Map::with_capacity(1);
            single.insert(key.clone(), value.clone());
            match serde_json::from_value::<Settings>(Value::Object(single)) {
                Ok(_) => {
                    accepted.insert(key, value);
                }
                Err(e) => log::warn!("ignoring setting '{}': {}", key, e),
            }
        }
        Ok(serde_json::from_value(Value::Object(accepted))?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::from_value(toml::from_str::<Value>(text)?)
    }

    /// Load from a `.toml` or `.json` file, picked by extension
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    /// Boolean stored under an arbitrary key
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.extra.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Number stored under an arbitrary key
    pub fn number(&self, key: &str, default: f64) -> f64 {
        self.extra.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    /// String list stored under an arbitrary key
    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.extra
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Configured character, defaulting to the first one on the selection screen
    pub fn character(&self) -> Result<Character> {
        match &self.character {
            Some(name) => name.parse(),
            None => Ok(Character::SwordSaint),
        }
    }

    /// Whether any portal routine should run after the in-game setup
    pub fn portal_active(&self) -> bool {
        (self.normal_hunt_enabled && !self.normal_hunt_portal_key.trim().is_empty())
            || (self.boss_raid_enabled && !self.boss_raid_portal_key.trim().is_empty())
    }

    /// Portal selected by the active hunting mode; Q when unset or unknown
    pub fn portal(&self) -> Portal {
        let key = if self.normal_hunt_enabled {
            &self.normal_hunt_portal_key
        } else {
            &self.boss_raid_portal_key
        };
        key.parse().unwrap_or(Portal::Q)
    }

    /// Resolve the hunting options of the active mode
    pub fn hunt_profile(&self) -> HuntProfile {
        let portal = self.portal();
        let normal = self.normal_hunt_enabled;
        let (action, respawn, coords) = if normal {
            (
                self.normal_hunt_action,
                self.normal_hunt_respawn,
                &self.nh_custom_coords,
            )
        } else {
            (
                self.boss_raid_action,
                self.boss_raid_respawn,
                &self.br_custom_coords,
            )
        };
        let zone_key = if normal {
            format!("{}_zone_idx", portal.key_prefix())
        } else {
            "br_zone_idx".to_string()
        };
        let zone_index = self.number(&zone_key, 0.0).max(0.0) as usize;

        HuntProfile {
            portal,
            action: HuntAction::from_index(action),
            respawn,
            zone_index,
            custom_waypoints: coords
                .iter()
                .filter(|c| c.len() >= 2 && (c[0] != 0 || c[1] != 0))
                .map(|c| Point::new(c[0], c[1]))
                .collect(),
        }
    }

    /// Auto-save period, never shorter than five minutes
    pub fn auto_save_period(&self) -> u64 {
        self.auto_save_interval
            .max(crate::timing::AUTOSAVE_MIN_INTERVAL.as_secs())
    }
}

/// Read access to the persisted settings
pub trait ConfigStore: Send + Sync {
    /// Current settings; each call returns an independent snapshot
    fn snapshot(&self) -> Settings;
}

/// Settings file cached in memory until invalidated
pub struct FileConfigStore {
    path: PathBuf,
    cache: RwLock<Option<Settings>>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the cached copy; the next snapshot re-reads the file
    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    /// Re-read the file now
    pub fn reload(&self) -> Result<Settings> {
        let settings = Settings::load(&self.path)?;
        *self.cache.write() = Some(settings.clone());
        Ok(settings)
    }
}

impl ConfigStore for FileConfigStore {
    fn snapshot(&self) -> Settings {
        if let Some(settings) = self.cache.read().as_ref() {
            return settings.clone();
        }
        match self.reload() {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!(
                    "failed to load settings from {}: {}; using defaults",
                    self.path.display(),
                    e
                );
                let settings = Settings::default();
                *self.cache.write() = Some(settings.clone());
                settings
            }
        }
    }
}

/// In-memory settings, replaceable at runtime
#[derive(Default)]
pub struct MemoryConfigStore {
    settings: RwLock<Settings>,
}

impl MemoryConfigStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub fn replace(&self, settings: Settings) {
        *self.settings.write() = settings;
    }
}

impl ConfigStore for MemoryConfigStore {
    fn snapshot(&self) -> Settings {
        self.settings.read().clone()
    }
}
