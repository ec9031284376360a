//! Hunting zones and boss sub-zones
//!
//! Coordinates are minimap positions at the 1920x1080 reference resolution.
//! The tables describe one known client build; a zone is a path of one to
//! three waypoints, optionally with an exit used to leave a sub-map.

use std::borrow::Cow;
use std::time::Duration;

use crate::config::{Portal, Settings};
use crate::input::Point;

/// Raw table coordinate
type Xy = (i32, i32);

fn points(path: &[Xy]) -> Vec<Point> {
    path.iter().map(|&(x, y)| Point::new(x, y)).collect()
}

/// A destination reached through chained minimap clicks
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub name: Cow<'static, str>,
    pub waypoints: Vec<Point>,
    /// Waypoint that leaves the sub-map this zone lives in
    pub exit: Option<Point>,
}

impl Zone {
    pub fn new(name: impl Into<Cow<'static, str>>, waypoints: Vec<Point>) -> Self {
        Self {
            name: name.into(),
            waypoints,
            exit: None,
        }
    }

    /// Single-waypoint zone for a user-entered coordinate
    pub fn waypoint(index: usize, at: Point) -> Self {
        Self::new(format!("waypoint {}", index), vec![at])
    }

    /// Zone that walks through this zone's exit, if it has one
    pub fn exit_zone(&self) -> Option<Zone> {
        self.exit
            .map(|at| Zone::new(format!("{} exit", self.name), vec![at]))
    }
}

// =============================================================================
// Field zones
// =============================================================================

/// Static row of a field zone table
#[derive(Debug)]
pub struct FieldSpot {
    pub name: &'static str,
    pub path: &'static [Xy],
    pub exit: Option<Xy>,
}

impl FieldSpot {
    pub fn zone(&self) -> Zone {
        Zone {
            name: Cow::Borrowed(self.name),
            waypoints: points(self.path),
            exit: self.exit.map(|(x, y)| Point::new(x, y)),
        }
    }
}

const fn field(name: &'static str, path: &'static [Xy]) -> FieldSpot {
    FieldSpot {
        name,
        path,
        exit: None,
    }
}

const fn field_with_exit(name: &'static str, path: &'static [Xy], exit: Xy) -> FieldSpot {
    FieldSpot {
        name,
        path,
        exit: Some(exit),
    }
}

static FIELDS_Q: [FieldSpot; 5] = [
    field("old forest spirit (south)", &[(34, 887)]),
    field("old forest spirit (north)", &[(36, 876)]),
    field("cave toad king", &[(35, 867)]),
    field_with_exit("rabbit burrow", &[(28, 865), (211, 834)], (208, 828)),
    field("soot bandit lieutenant", &[(67, 887)]),
];

static FIELDS_W: [FieldSpot; 4] = [
    field("guard captain lowell", &[(62, 905)]),
    field("ironclaw", &[(58, 918)]),
    field("tx-005", &[(48, 921)]),
    field("dwarven garrison", &[(41, 914)]),
];

static FIELDS_E: [FieldSpot; 3] = [
    field("vares", &[(38, 937)]),
    field("ancient ruin guardian", &[(46, 936)]),
    field("mirror queen shard", &[(32, 944)]),
];

static FIELDS_R: [FieldSpot; 4] = [
    field("imperial knight wraith (west)", &[(96, 841)]),
    field("imperial knight wraith (east)", &[(112, 834)]),
    field("old garrison captain felix", &[(102, 846)]),
    field("old executor lana", &[(126, 832)]),
];

static FIELDS_A: [FieldSpot; 5] = [
    field("goblins (7 o'clock)", &[(128, 886)]),
    field("goblins (5 o'clock)", &[(137, 886)]),
    field("goblins (10 o'clock)", &[(126, 871)]),
    field("goblins (2 o'clock)", &[(139, 870)]),
    field_with_exit("deep cave forest giant", &[(144, 878), (276, 885)], (286, 885)),
];

static FIELDS_S: [FieldSpot; 6] = [
    field("wind spirit (west)", &[(101, 908)]),
    field("wind spirit (east)", &[(111, 900)]),
    field("windy", &[(99, 912)]),
    field("blackhide druid", &[(115, 918)]),
    field_with_exit("cave depths", &[(123, 909), (277, 898)], (274, 894)),
    field_with_exit("sylph", &[(123, 909), (280, 902)], (274, 894)),
];

static FIELDS_D: [FieldSpot; 2] = [
    field("mana stone golem (west)", &[(117, 951)]),
    field("mana stone golem (east)", &[(131, 948)]),
];

static FIELDS_F: [FieldSpot; 2] = [
    field("steel pincer (north)", &[(183, 837)]),
    field("steel pincer (south)", &[(167, 851)]),
];

static FIELDS_Z: [FieldSpot; 4] = [
    field("lava cave (entrance)", &[(178, 883)]),
    field("lava cave (north)", &[(178, 869)]),
    field("lava cave (west)", &[(164, 870)]),
    field("lava cave (south)", &[(160, 881)]),
];

static FIELDS_X: [FieldSpot; 2] = [
    field("spirit realm (west)", &[(163, 925)]),
    field("spirit realm (east)", &[(183, 921)]),
];

/// Field zones reachable through a portal. Portal C shares Q's table.
pub fn field_zones(portal: Portal) -> &'static [FieldSpot] {
    match portal {
        Portal::W => &FIELDS_W,
        Portal::E => &FIELDS_E,
        Portal::R => &FIELDS_R,
        Portal::A => &FIELDS_A,
        Portal::S => &FIELDS_S,
        Portal::D => &FIELDS_D,
        Portal::F => &FIELDS_F,
        Portal::Z => &FIELDS_Z,
        Portal::X => &FIELDS_X,
        Portal::Q | Portal::C => &FIELDS_Q,
    }
}

/// Field zone by configured index, clamped into the table
pub fn field_zone(portal: Portal, index: usize) -> Zone {
    let table = field_zones(portal);
    table[index.min(table.len() - 1)].zone()
}

// =============================================================================
// Boss sub-zones
// =============================================================================

/// Static row of a boss table
#[derive(Debug)]
pub struct BossSpot {
    /// Setting key that enables this boss
    pub key: &'static str,
    pub name: &'static str,
    pub path: &'static [Xy],
    /// Path out of the boss sub-map, empty when the boss shares the field map
    pub exit: &'static [Xy],
    /// Direct paths to other bosses of the same portal
    pub shortcuts: &'static [(&'static str, &'static [Xy])],
}

const fn boss(
    key: &'static str,
    name: &'static str,
    path: &'static [Xy],
    exit: &'static [Xy],
) -> BossSpot {
    BossSpot {
        key,
        name,
        path,
        exit,
        shortcuts: &[],
    }
}

static BOSSES_Q: [BossSpot; 4] = [
    boss("nh_zone_boss", "bandit chief kalein", &[(70, 884), (237, 834)], &[(237, 839)]),
    boss("nh_q_boss_kingcrab", "centennial king crab", &[(76, 881), (212, 869)], &[(212, 874)]),
    boss(
        "nh_q_boss_giant",
        "swamp giant",
        &[(76, 881), (211, 864), (235, 863)],
        &[(234, 872), (212, 874)],
    ),
    boss("nh_q_boss_pap", "forgotten guardian pap", &[(69, 873)], &[]),
];

static BOSSES_W: [BossSpot; 1] = [boss(
    "nh_w_zone_boss",
    "magic wagon",
    &[(29, 912), (234, 849)],
    &[(234, 855)],
)];

static BOSSES_E: [BossSpot; 4] = [
    BossSpot {
        key: "nh_e_boss_maureus",
        name: "maureus",
        path: &[(28, 942), (49, 986)],
        exit: &[(49, 994)],
        shortcuts: &[("nh_e_boss_tarod", &[(49, 980), (49, 972)])],
    },
    BossSpot {
        key: "nh_e_boss_tarod",
        name: "tarod",
        path: &[(28, 942), (49, 980), (49, 972)],
        exit: &[(49, 994)],
        shortcuts: &[("nh_e_boss_maureus", &[(49, 979), (49, 980)])],
    },
    boss("nh_e_boss_colossus", "rock giant colossus", &[(49, 934), (233, 883)], &[(233, 887)]),
    boss("nh_e_boss_tulak", "apostle tul'ak", &[(53, 938), (65, 934)], &[(52, 938)]),
];

static BOSSES_R: [BossSpot; 2] = [
    boss("nh_r_boss_hedan", "quartermaster hedan", &[(94, 835), (213, 883)], &[(212, 888)]),
    boss("nh_r_boss_thanatos", "reaper thanatos", &[(120, 857), (279, 850)], &[(279, 857)]),
];

static BOSSES_A: [BossSpot; 2] = [
    boss("nh_a_boss_bx485", "bx-485", &[(133, 878)], &[]),
    boss("nh_a_boss_ivan", "engineer ivan", &[(133, 866)], &[]),
];

static BOSSES_S: [BossSpot; 2] = [
    boss("nh_s_boss_callis", "executor callis", &[(120, 909)], &[]),
    boss("nh_s_boss_kalipa", "dragon kalipa", &[(120, 917), (256, 848)], &[(256, 856)]),
];

static BOSSES_D: [BossSpot; 3] = [
    boss("nh_d_boss_klak", "klak", &[(127, 941)], &[]),
    boss("nh_d_boss_mirdon", "mirdon", &[(127, 954)], &[]),
    boss("nh_d_boss_rex", "rex", &[(142, 942), (253, 864)], &[(263, 871)]),
];

static BOSSES_F: [BossSpot; 1] = [boss("nh_f_boss_doombaou", "doombaou", &[(186, 852)], &[])];

static BOSSES_Z: [BossSpot; 1] = [boss("nh_z_boss_flame", "flame", &[(160, 867)], &[])];

/// Boss table of a portal; empty for portals without bosses
pub fn boss_spots(portal: Portal) -> &'static [BossSpot] {
    match portal {
        Portal::Q => &BOSSES_Q,
        Portal::W => &BOSSES_W,
        Portal::E => &BOSSES_E,
        Portal::R => &BOSSES_R,
        Portal::A => &BOSSES_A,
        Portal::S => &BOSSES_S,
        Portal::D => &BOSSES_D,
        Portal::F => &BOSSES_F,
        Portal::Z => &BOSSES_Z,
        Portal::X | Portal::C => &[],
    }
}

/// An enabled boss, resolved from its table row
#[derive(Debug, Clone, PartialEq)]
pub struct Boss {
    pub key: &'static str,
    pub zone: Zone,
    /// Path back out of the boss sub-map
    pub exit: Option<Zone>,
    shortcuts: Vec<(&'static str, Zone)>,
}

impl Boss {
    fn from_spot(spot: &BossSpot) -> Self {
        let exit = (!spot.exit.is_empty())
            .then(|| Zone::new(format!("{} exit", spot.name), points(spot.exit)));
        let shortcuts = spot
            .shortcuts
            .iter()
            .map(|(target, path)| {
                let name = format!("{} shortcut to {}", spot.name, target);
                (*target, Zone::new(name, points(path)))
            })
            .collect();
        Self {
            key: spot.key,
            zone: Zone::new(spot.name, points(spot.path)),
            exit,
            shortcuts,
        }
    }

    pub fn name(&self) -> &str {
        &self.zone.name
    }

    /// Direct path to the boss enabled by `key`, if one is defined
    pub fn shortcut_to(&self, key: &str) -> Option<&Zone> {
        self.shortcuts
            .iter()
            .find(|(target, _)| *target == key)
            .map(|(_, zone)| zone)
    }
}

/// Boss settings of one portal entry
///
/// Only exists when at least one boss is enabled, so the boss list is never
/// empty.
#[derive(Debug, Clone, PartialEq)]
pub struct BossConfig {
    bosses: Vec<Boss>,
    /// Hunt this long before each boss visit; `None` fights immediately
    pub timer: Option<Duration>,
    /// Fight the bosses once before the first hunting pass
    pub priority: bool,
    /// Return to the field after a kill instead of restarting the portal loop
    pub no_return: bool,
}

impl BossConfig {
    /// Build the boss plan for `portal`, or `None` when no boss is enabled.
    ///
    /// Kill order follows the `<prefix>_boss_order` list. Enabled bosses that
    /// the list does not mention go last, in table order.
    pub fn from_settings(settings: &Settings, portal: Portal) -> Option<Self> {
        if !settings.normal_hunt_boss_enabled {
            return None;
        }
        let prefix = portal.key_prefix();
        let order = settings.string_list(&format!("{}_boss_order", prefix));
        let mut enabled: Vec<&BossSpot> = boss_spots(portal)
            .iter()
            .filter(|spot| settings.flag(spot.key, false))
            .collect();
        if enabled.is_empty() {
            return None;
        }
        enabled.sort_by_key(|spot| {
            order
                .iter()
                .position(|key| key == spot.key)
                .unwrap_or(order.len())
        });

        let timer = settings
            .flag(&format!("{}_boss_timer", prefix), false)
            .then(|| {
                let secs = settings.number(&format!("{}_boss_timer_sec", prefix), 60.0);
                Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or_else(|_| {
                    log::warn!("boss timer of {}s is out of range, using 60s", secs);
                    Duration::from_secs(60)
                })
            });

        Some(Self {
            bosses: enabled.into_iter().map(Boss::from_spot).collect(),
            timer,
            priority: settings.flag(&format!("{}_boss_priority", prefix), false),
            no_return: settings.flag(&format!("{}_boss_no_return", prefix), false),
        })
    }

    /// Enabled bosses in kill order; never empty
    pub fn bosses(&self) -> &[Boss] {
        &self.bosses
    }

    pub fn first(&self) -> &Boss {
        &self.bosses[0]
    }

    /// Way back to the field after the last boss
    pub fn exit(&self) -> Option<&Zone> {
        self.bosses.last().and_then(|boss| boss.exit.as_ref())
    }
}
