//! Game-specific memory probes
//!
//! Values live in heap nodes that are reached by walking a singly linked
//! chain from a static slot in a module, until a node carries a known
//! signature right after its `next` pointer.

use image::Rgb;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::{MemoryReader, ProcessFinder, ProcessMemory};
use crate::error::{AutopilotError, Result};
use crate::input::Point;
use crate::vision::CaptureProvider;

/// Executable name of the game client
pub const CLIENT_PROCESS: &str = "War3.exe";

const STORM_MODULE: &str = "storm.dll";
const GAME_MODULE: &str = "game.dll";

/// Upper bound on chain length
pub const MAX_CHAIN_NODES: usize = 2000;

const PLAYER_COUNT_SLOT: usize = 0x58160;
const PLAYER_COUNT_SIGNATURE: [u8; 5] = [0x4C, 0x7F, 0x65, 0x07, 0x4C];
const PLAYER_COUNT_OFFSET: usize = 0x340;

const DELAY_SLOT: usize = 0x58330;
const DELAY_SIGNATURE: [u8; 5] = [0xC0, 0xD6, 0xDB, 0x68, 0xC0];
const DELAY_OFFSET: usize = 0x2F0;
const DELAY_BLOCKS: [usize; 3] = [0, 0x220, 0x440];
const DELAY_FIELDS: [usize; 2] = [0, 4];
/// Highest accepted network delay in milliseconds
pub const MAX_GAME_DELAY: u32 = 550;

const START_SPEED_OFFSET: usize = 0x324146;
const START_SPEED_ZERO: f32 = 0.01;

/// Client pixel that turns pure black while the hero is dead
pub const DEATH_PIXEL: Point = Point::new(13, 49);

/// Walk the signature chain starting at the pointer stored in `slot`.
///
/// Returns the address of the first node whose bytes at offset 4 equal
/// `signature`. A null link, an unreadable node or more than
/// [`MAX_CHAIN_NODES`] hops end the walk without a result.
pub fn follow_chain(memory: &dyn MemoryReader, slot: usize, signature: &[u8]) -> Option<usize> {
    let mut node = memory.read_ptr32(slot)?;
    for _ in 0..MAX_CHAIN_NODES {
        if node == 0 {
            return None;
        }
        let data = memory.read_bytes(node, 4 + signature.len())?;
        if &data[4..] == signature {
            return Some(node);
        }
        node = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    }
    None
}

/// Live counters and patches exposed by the game client
pub trait MemoryProbe: Send + Sync {
    /// Players currently in the lobby room; `None` when unknown
    fn player_count(&self) -> Option<i32>;
    /// Write the network delay (0..=550 ms) into every delay field
    fn write_game_delay(&self, delay: u32) -> Result<()>;
    /// Make the game start without the lobby countdown
    fn write_start_speed_zero(&self) -> Result<()>;
    /// Colour of a client pixel through the occlusion-safe capture path
    fn pixel_at(&self, at: Point) -> Option<Rgb<u8>>;

    /// Death check: `Some(true)` when the death pixel is pure black
    fn is_dead(&self) -> Option<bool> {
        self.pixel_at(DEATH_PIXEL).map(|p| p.0 == [0, 0, 0])
    }
}

/// Probe that opens the client anew on every call, so a restarted client is
/// picked up without re-attaching
pub struct GameProbe {
    finder: Arc<dyn ProcessFinder>,
    capture: Arc<dyn CaptureProvider>,
}

impl GameProbe {
    pub fn new(finder: Arc<dyn ProcessFinder>, capture: Arc<dyn CaptureProvider>) -> Self {
        Self { finder, capture }
    }

    fn open(&self) -> Result<Box<dyn ProcessMemory>> {
        let (pid, _) = self
            .finder
            .find_process(&[CLIENT_PROCESS])
            .ok_or_else(|| AutopilotError::Memory(format!("{} is not running", CLIENT_PROCESS)))?;
        self.finder
            .open_process(pid)
            .ok_or_else(|| AutopilotError::Memory(format!("cannot open process {}", pid)))
    }

    fn module(memory: &dyn ProcessMemory, name: &str) -> Result<usize> {
        memory
            .module_base(name)
            .ok_or_else(|| AutopilotError::Memory(format!("{} not loaded", name)))
    }

    fn read_player_count(&self) -> Result<i32> {
        let memory = self.open()?;
        let storm = Self::module(memory.as_ref(), STORM_MODULE)?;
        let node = follow_chain(memory.as_ref(), storm + PLAYER_COUNT_SLOT, &PLAYER_COUNT_SIGNATURE)
            .ok_or_else(|| AutopilotError::Memory("player count node not found".to_string()))?;
        memory
            .read_i32(node + PLAYER_COUNT_OFFSET)
            .ok_or_else(|| AutopilotError::Memory("player count unreadable".to_string()))
    }
}

impl MemoryProbe for GameProbe {
    fn player_count(&self) -> Option<i32> {
        match self.read_player_count() {
            Ok(count) => Some(count),
            Err(e) => {
                debug!("Player count unavailable: {}", e);
                None
            }
        }
    }

    fn write_game_delay(&self, delay: u32) -> Result<()> {
        if delay > MAX_GAME_DELAY {
            return Err(AutopilotError::InvalidSetting(format!(
                "game delay {} outside 0..={}",
                delay, MAX_GAME_DELAY
            )));
        }
        let memory = self.open()?;
        let storm = Self::module(memory.as_ref(), STORM_MODULE)?;
        let node = follow_chain(memory.as_ref(), storm + DELAY_SLOT, &DELAY_SIGNATURE)
            .ok_or_else(|| AutopilotError::Memory("delay node not found".to_string()))?;

        let base = node + DELAY_OFFSET;
        for block in DELAY_BLOCKS {
            for field in DELAY_FIELDS {
                if !memory.write_u32(base + block + field, delay) {
                    return Err(AutopilotError::Memory(format!(
                        "delay write at {:#x} failed",
                        base + block + field
                    )));
                }
            }
        }
        Ok(())
    }

    fn write_start_speed_zero(&self) -> Result<()> {
        let memory = self.open()?;
        let game = Self::module(memory.as_ref(), GAME_MODULE)?;
        if memory.write_f32(game + START_SPEED_OFFSET, START_SPEED_ZERO) {
            Ok(())
        } else {
            Err(AutopilotError::Memory("start speed write failed".to_string()))
        }
    }

    fn pixel_at(&self, at: Point) -> Option<Rgb<u8>> {
        let (Ok(x), Ok(y)) = (u32::try_from(at.x), u32::try_from(at.y)) else {
            warn!("Pixel probe outside the client: {:?}", at);
            return None;
        };
        self.capture.pixel_at(x, y)
    }
}

/// Scripted probe (for testing)
///
/// Player counts are served from a queue; once it runs dry the last value
/// repeats.
#[derive(Default)]
pub struct MockProbe {
    counts: Mutex<VecDeque<Option<i32>>>,
    last_count: Mutex<Option<i32>>,
    dead: Mutex<Option<bool>>,
    delays: Mutex<Vec<u32>>,
    start_speed_writes: Mutex<usize>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue player counts returned by successive calls
    pub fn with_counts(self, counts: impl IntoIterator<Item = Option<i32>>) -> Self {
        self.counts.lock().extend(counts);
        self
    }

    /// `Some(true)` dead, `Some(false)` alive, `None` pixel unavailable
    pub fn set_dead(&self, dead: Option<bool>) {
        *self.dead.lock() = dead;
    }

    pub fn delays_written(&self) -> Vec<u32> {
        self.delays.lock().clone()
    }

    pub fn start_speed_writes(&self) -> usize {
        *self.start_speed_writes.lock()
    }
}

impl MemoryProbe for MockProbe {
    fn player_count(&self) -> Option<i32> {
        let mut last = self.last_count.lock();
        if let Some(next) = self.counts.lock().pop_front() {
            *last = next;
        }
        *last
    }

    fn write_game_delay(&self, delay: u32) -> Result<()> {
        if delay > MAX_GAME_DELAY {
            return Err(AutopilotError::InvalidSetting(format!(
                "game delay {} outside 0..={}",
                delay, MAX_GAME_DELAY
            )));
        }
        self.delays.lock().push(delay);
        Ok(())
    }

    fn write_start_speed_zero(&self) -> Result<()> {
        *self.start_speed_writes.lock() += 1;
        Ok(())
    }

    fn pixel_at(&self, at: Point) -> Option<Rgb<u8>> {
        if at != DEATH_PIXEL {
            return Some(Rgb([128, 128, 128]));
        }
        match *self.dead.lock() {
            Some(true) => Some(Rgb([0, 0, 0])),
            Some(false) => Some(Rgb([90, 20, 20])),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockProcessFinder, MockProcessMemory};
    use crate::vision::MockCaptureProvider;
    use image::RgbImage;

    const STORM: usize = 0x1500_0000;
    const GAME: usize = 0x6F00_0000;

    fn node(next: u32, signature: &[u8]) -> Vec<u8> {
        let mut data = next.to_le_bytes().to_vec();
        data.extend_from_slice(signature);
        data
    }

    fn client() -> (MockProcessMemory, GameProbe) {
        let memory = MockProcessMemory::new()
            .with_module("Storm.dll", STORM)
            .with_module("Game.dll", GAME);
        let mut finder = MockProcessFinder::new();
        finder.add_process_with_memory(7, "War3.exe", memory.clone());
        let probe = GameProbe::new(
            Arc::new(finder),
            Arc::new(MockCaptureProvider::with_frame(RgbImage::new(64, 64))),
        );
        (memory, probe)
    }

    // =============================================================================
    // Chain walk
    // =============================================================================

    #[test]
    fn test_follow_chain_finds_signature() {
        let memory = MockProcessMemory::new();
        memory.put_u32(0x100, 0x2000);
        memory.put_bytes(0x2000, &node(0x3000, &[1, 2, 3, 4, 5]));
        memory.put_bytes(0x3000, &node(0, &DELAY_SIGNATURE));
        assert_eq!(follow_chain(&memory, 0x100, &DELAY_SIGNATURE), Some(0x3000));
    }

    #[test]
    fn test_follow_chain_null_terminates() {
        let memory = MockProcessMemory::new();
        memory.put_u32(0x100, 0x2000);
        memory.put_bytes(0x2000, &node(0, &[9, 9, 9, 9, 9]));
        assert_eq!(follow_chain(&memory, 0x100, &DELAY_SIGNATURE), None);
    }

    #[test]
    fn test_follow_chain_cycle_is_bounded() {
        let memory = MockProcessMemory::new();
        memory.put_u32(0x100, 0x2000);
        memory.put_bytes(0x2000, &node(0x2000, &[9, 9, 9, 9, 9]));
        assert_eq!(follow_chain(&memory, 0x100, &DELAY_SIGNATURE), None);
    }

    // =============================================================================
    // Game probe
    // =============================================================================

    #[test]
    fn test_player_count() {
        let (memory, probe) = client();
        memory.put_u32(STORM + PLAYER_COUNT_SLOT, 0x4000);
        let mut data = node(0, &PLAYER_COUNT_SIGNATURE);
        data.resize(PLAYER_COUNT_OFFSET + 4, 0);
        data[PLAYER_COUNT_OFFSET..].copy_from_slice(&3i32.to_le_bytes());
        memory.put_bytes(0x4000, &data);

        assert_eq!(probe.player_count(), Some(3));
    }

    #[test]
    fn test_player_count_unknown_without_chain() {
        let (_, probe) = client();
        assert_eq!(probe.player_count(), None);
    }

    #[test]
    fn test_write_game_delay_patches_six_fields() {
        let (memory, probe) = client();
        memory.put_u32(STORM + DELAY_SLOT, 0x5000);
        memory.put_bytes(0x5000, &node(0, &DELAY_SIGNATURE));

        probe.write_game_delay(15).unwrap();
        let addresses: Vec<usize> = memory.writes().iter().map(|(a, _)| *a).collect();
        let base = 0x5000 + DELAY_OFFSET;
        assert_eq!(
            addresses,
            vec![base, base + 4, base + 0x220, base + 0x224, base + 0x440, base + 0x444]
        );
        assert!(memory.writes().iter().all(|(_, v)| v == &15u32.to_le_bytes()));
    }

    #[test]
    fn test_write_game_delay_rejects_out_of_range() {
        let (memory, probe) = client();
        assert!(matches!(
            probe.write_game_delay(551),
            Err(AutopilotError::InvalidSetting(_))
        ));
        assert!(memory.writes().is_empty());
    }

    #[test]
    fn test_write_start_speed_zero() {
        let (memory, probe) = client();
        probe.write_start_speed_zero().unwrap();
        assert_eq!(
            memory.writes(),
            vec![(GAME + START_SPEED_OFFSET, 0.01f32.to_le_bytes().to_vec())]
        );
    }

    #[test]
    fn test_probe_without_client_fails_softly() {
        let probe = GameProbe::new(
            Arc::new(MockProcessFinder::new()),
            Arc::new(MockCaptureProvider::new()),
        );
        assert_eq!(probe.player_count(), None);
        assert!(probe.write_start_speed_zero().is_err());
        assert_eq!(probe.is_dead(), None);
    }

    #[test]
    fn test_death_pixel_from_capture() {
        let (_, probe) = client();
        // a fresh RgbImage is all black
        assert_eq!(probe.is_dead(), Some(true));
    }

    #[test]
    fn test_pixel_probe_rejects_negative_coordinates() {
        let (_, probe) = client();
        assert!(probe.pixel_at(Point::new(0, 0)).is_some());
        assert_eq!(probe.pixel_at(Point::new(-1, 0)), None);
        assert_eq!(probe.pixel_at(Point::new(0, i32::MIN)), None);
    }

    #[test]
    fn test_mock_probe_counts_repeat_last() {
        let probe = MockProbe::new().with_counts([Some(1), None, Some(4)]);
        assert_eq!(probe.player_count(), Some(1));
        assert_eq!(probe.player_count(), None);
        assert_eq!(probe.player_count(), Some(4));
        assert_eq!(probe.player_count(), Some(4));
    }
}
