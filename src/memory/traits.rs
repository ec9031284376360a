//! Traits for process memory access and process management
//!
//! These traits allow for dependency injection, enabling mock implementations
//! for testing without requiring a running game client.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for reading memory from a process
pub trait MemoryReader: Send + Sync {
    /// Read raw bytes from memory
    fn read_bytes(&self, address: usize, size: usize) -> Option<Vec<u8>>;

    /// Read a u8 from memory
    fn read_u8(&self, address: usize) -> Option<u8> {
        let bytes = self.read_bytes(address, 1)?;
        Some(bytes[0])
    }

    /// Read a u32 from memory
    fn read_u32(&self, address: usize) -> Option<u32> {
        let bytes = self.read_bytes(address, 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an i32 from memory
    fn read_i32(&self, address: usize) -> Option<i32> {
        let bytes = self.read_bytes(address, 4)?;
        Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an f32 from memory
    fn read_f32(&self, address: usize) -> Option<f32> {
        let bytes = self.read_bytes(address, 4)?;
        Some(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 32-bit pointer; the client is a 32-bit process
    fn read_ptr32(&self, address: usize) -> Option<usize> {
        self.read_u32(address).map(|v| v as usize)
    }
}

/// Trait for patching memory of a process
///
/// Implementations lift page protection around the write, so code pages can
/// be patched as well.
pub trait MemoryWriter: Send + Sync {
    /// Write raw bytes; `false` if the write did not complete
    fn write_bytes(&self, address: usize, data: &[u8]) -> bool;

    fn write_u32(&self, address: usize, value: u32) -> bool {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn write_f32(&self, address: usize, value: f32) -> bool {
        self.write_bytes(address, &value.to_le_bytes())
    }
}

/// An opened process: memory access plus module lookup
pub trait ProcessMemory: MemoryReader + MemoryWriter {
    /// Base address of a loaded module (case-insensitive file name)
    fn module_base(&self, module_name: &str) -> Option<usize>;

    /// Check if the process is still running
    fn is_valid(&self) -> bool;
}

/// Trait for finding, opening and terminating processes
pub trait ProcessFinder: Send + Sync {
    /// Find a process by name from a list of target names
    /// Returns (pid, process_name) if found
    fn find_process(&self, target_names: &[&str]) -> Option<(u32, String)>;

    /// Open a process for reading and writing
    fn open_process(&self, pid: u32) -> Option<Box<dyn ProcessMemory>>;

    /// Forcefully terminate a process
    fn terminate(&self, pid: u32) -> bool;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

#[derive(Default)]
struct MockState {
    /// Memory contents: address -> bytes
    memory: HashMap<usize, Vec<u8>>,
    /// Module bases by lower-case name
    modules: HashMap<String, usize>,
    /// Every write, in order
    writes: Vec<(usize, Vec<u8>)>,
    /// Whether the process is "running"
    valid: bool,
}

/// Mock process memory backed by a pre-configured memory map
///
/// Clones share the same state, so a test can keep a handle while the code
/// under test opens the "process" through a [`MockProcessFinder`].
#[derive(Clone)]
pub struct MockProcessMemory {
    state: Arc<Mutex<MockState>>,
}

impl MockProcessMemory {
    /// Create a new mock process memory
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                valid: true,
                ..MockState::default()
            })),
        }
    }

    /// Register a loaded module
    pub fn with_module(self, name: &str, base: usize) -> Self {
        self.state.lock().modules.insert(name.to_lowercase(), base);
        self
    }

    /// Set whether the process is valid
    pub fn with_valid(self, valid: bool) -> Self {
        self.state.lock().valid = valid;
        self
    }

    /// Place a contiguous block of memory
    pub fn put_bytes(&self, address: usize, data: &[u8]) {
        self.state.lock().memory.insert(address, data.to_vec());
    }

    /// Place a u32
    pub fn put_u32(&self, address: usize, value: u32) {
        self.put_bytes(address, &value.to_le_bytes());
    }

    /// Place an i32
    pub fn put_i32(&self, address: usize, value: i32) {
        self.put_bytes(address, &value.to_le_bytes());
    }

    /// All writes performed through [`MemoryWriter`], in order
    pub fn writes(&self) -> Vec<(usize, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    /// Invalidate the process (simulate process exit)
    pub fn invalidate(&self) {
        self.state.lock().valid = false;
    }
}

impl Default for MockProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReader for MockProcessMemory {
    fn read_bytes(&self, address: usize, size: usize) -> Option<Vec<u8>> {
        let state = self.state.lock();
        if !state.valid {
            return None;
        }

        // Check if the address falls within any stored block
        for (&block_start, block_data) in &state.memory {
            if address >= block_start && address < block_start + block_data.len() {
                let offset = address - block_start;
                if offset + size <= block_data.len() {
                    return Some(block_data[offset..offset + size].to_vec());
                }
            }
        }

        None
    }
}

impl MemoryWriter for MockProcessMemory {
    fn write_bytes(&self, address: usize, data: &[u8]) -> bool {
        let mut state = self.state.lock();
        if !state.valid {
            return false;
        }
        state.writes.push((address, data.to_vec()));
        state.memory.insert(address, data.to_vec());
        true
    }
}

impl ProcessMemory for MockProcessMemory {
    fn module_base(&self, module_name: &str) -> Option<usize> {
        self.state
            .lock()
            .modules
            .get(&module_name.to_lowercase())
            .copied()
    }

    fn is_valid(&self) -> bool {
        self.state.lock().valid
    }
}

/// Mock process finder for testing
#[derive(Default)]
pub struct MockProcessFinder {
    /// List of mock processes: (pid, name)
    processes: Mutex<Vec<(u32, String)>>,
    /// Memory to return for each process
    memories: HashMap<u32, MockProcessMemory>,
    /// Pids passed to `terminate`
    terminated: Mutex<Vec<u32>>,
}

impl MockProcessFinder {
    /// Create a new mock process finder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mock process
    pub fn add_process(&mut self, pid: u32, name: &str) {
        self.processes.lock().push((pid, name.to_string()));
    }

    /// Add a mock process with memory
    pub fn add_process_with_memory(&mut self, pid: u32, name: &str, memory: MockProcessMemory) {
        self.add_process(pid, name);
        self.memories.insert(pid, memory);
    }

    /// Pids terminated so far
    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().clone()
    }
}

impl ProcessFinder for MockProcessFinder {
    fn find_process(&self, target_names: &[&str]) -> Option<(u32, String)> {
        for (pid, name) in self.processes.lock().iter() {
            let name_lower = name.to_lowercase();
            for target in target_names {
                let target_lower = target.to_lowercase();
                if name_lower == target_lower
                    || name_lower == format!("{}.exe", target_lower.trim_end_matches(".exe"))
                {
                    return Some((*pid, name.clone()));
                }
            }
        }
        None
    }

    fn open_process(&self, pid: u32) -> Option<Box<dyn ProcessMemory>> {
        if !self.processes.lock().iter().any(|(p, _)| *p == pid) {
            return None;
        }
        self.memories
            .get(&pid)
            .cloned()
            .map(|m| Box::new(m) as Box<dyn ProcessMemory>)
    }

    fn terminate(&self, pid: u32) -> bool {
        let mut processes = self.processes.lock();
        let before = processes.len();
        processes.retain(|(p, _)| *p != pid);
        if processes.len() == before {
            return false;
        }
        if let Some(memory) = self.memories.get(&pid) {
            memory.invalidate();
        }
        self.terminated.lock().push(pid);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================================================
    // MockProcessMemory tests
    // =============================================================================

    #[test]
    fn test_mock_memory_new() {
        let memory = MockProcessMemory::new();
        assert!(memory.is_valid());
        assert_eq!(memory.module_base("storm.dll"), None);
    }

    #[test]
    fn test_mock_memory_module_lookup_case_insensitive() {
        let memory = MockProcessMemory::new().with_module("Storm.dll", 0x1500_0000);
        assert_eq!(memory.module_base("storm.dll"), Some(0x1500_0000));
        assert_eq!(memory.module_base("STORM.DLL"), Some(0x1500_0000));
    }

    #[test]
    fn test_mock_memory_read_u32_and_i32() {
        let memory = MockProcessMemory::new();
        memory.put_u32(0x1000, 0x12345678);
        memory.put_i32(0x2000, -6);

        assert_eq!(memory.read_u32(0x1000), Some(0x12345678));
        assert_eq!(memory.read_ptr32(0x1000), Some(0x12345678));
        assert_eq!(memory.read_i32(0x2000), Some(-6));
    }

    #[test]
    fn test_mock_memory_read_partial_block() {
        let memory = MockProcessMemory::new();
        memory.put_bytes(0x1000, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);

        assert_eq!(memory.read_bytes(0x1002, 3), Some(vec![0x03, 0x04, 0x05]));
        assert_eq!(memory.read_u32(0x1004), Some(0x08070605));
        assert_eq!(memory.read_bytes(0x1006, 4), None);
    }

    #[test]
    fn test_mock_memory_read_nonexistent() {
        let memory = MockProcessMemory::new();
        assert_eq!(memory.read_u32(0x9999), None);
    }

    #[test]
    fn test_mock_memory_writes_are_logged_and_readable() {
        let memory = MockProcessMemory::new();
        assert!(memory.write_f32(0x3000, 0.01));
        assert!(memory.write_u32(0x3010, 15));

        assert_eq!(memory.writes().len(), 2);
        assert_eq!(memory.read_u32(0x3010), Some(15));
        assert!((memory.read_f32(0x3000).unwrap() - 0.01).abs() < f32::EPSILON);
    }

    #[test]
    fn test_mock_memory_invalid() {
        let memory = MockProcessMemory::new();
        memory.put_u32(0x1000, 1);
        memory.invalidate();

        assert_eq!(memory.read_u32(0x1000), None);
        assert!(!memory.write_u32(0x1000, 2));
        assert!(!memory.is_valid());
    }

    #[test]
    fn test_mock_memory_clones_share_state() {
        let memory = MockProcessMemory::new();
        let handle = memory.clone();
        memory.write_u32(0x10, 7);
        assert_eq!(handle.read_u32(0x10), Some(7));
    }

    // =============================================================================
    // MockProcessFinder tests
    // =============================================================================

    #[test]
    fn test_mock_process_finder_new() {
        let finder = MockProcessFinder::new();
        assert_eq!(finder.find_process(&["War3.exe"]), None);
    }

    #[test]
    fn test_mock_process_finder_case_insensitive() {
        let mut finder = MockProcessFinder::new();
        finder.add_process(1234, "War3.exe");

        let result = finder.find_process(&["war3.exe"]);
        assert_eq!(result, Some((1234, "War3.exe".to_string())));
        assert_eq!(finder.find_process(&["war3"]), Some((1234, "War3.exe".to_string())));
    }

    #[test]
    fn test_mock_process_finder_with_memory() {
        let mut finder = MockProcessFinder::new();
        let memory = MockProcessMemory::new();
        memory.put_u32(0x1000, 0xDEADBEEF);
        finder.add_process_with_memory(1234, "War3.exe", memory);

        let opened = finder.open_process(1234).unwrap();
        assert_eq!(opened.read_u32(0x1000), Some(0xDEADBEEF));
        assert!(finder.open_process(9999).is_none());
    }

    #[test]
    fn test_mock_process_finder_terminate() {
        let mut finder = MockProcessFinder::new();
        let memory = MockProcessMemory::new();
        finder.add_process_with_memory(42, "War3.exe", memory.clone());

        assert!(finder.terminate(42));
        assert!(!finder.terminate(42));
        assert_eq!(finder.terminated(), vec![42]);
        assert_eq!(finder.find_process(&["War3.exe"]), None);
        assert!(finder.open_process(42).is_none());
        assert!(!memory.is_valid());
    }
}
