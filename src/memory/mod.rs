//! Access to the game client process
//!
//! Platform back-ends implement [`ProcessMemory`] (Windows through
//! `ReadProcessMemory`/`WriteProcessMemory`, Linux through
//! `process_vm_readv`/`process_vm_writev`). The game-specific reads and
//! patches built on top of it live in [`probe`].

#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
mod linux;

mod process;
pub mod probe;
mod traits;

pub use probe::{follow_chain, GameProbe, MemoryProbe, MockProbe, CLIENT_PROCESS, DEATH_PIXEL};
pub use process::{
    find_process, find_process_by_names, get_module_info, is_process_running, terminate_process,
    ModuleInfo, ProcessInfo, SystemProcessFinder,
};
pub use traits::{
    MemoryReader, MemoryWriter, MockProcessFinder, MockProcessMemory, ProcessFinder, ProcessMemory,
};

#[cfg(target_os = "windows")]
pub use windows::WindowsProcessMemory;

#[cfg(target_os = "linux")]
pub use linux::LinuxProcessMemory;
