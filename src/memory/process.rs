//! Process finding, module information and termination

#[cfg(target_os = "windows")]
use windows::Win32::Foundation::HANDLE;

use super::{ProcessFinder, ProcessMemory};

/// A running process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Process name
    pub name: String,
}

/// Information about a module loaded in a process
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// Module name
    pub name: String,
    /// Base address
    pub base_address: usize,
    /// Size in bytes
    pub size: usize,
}

/// Find a process by name
#[cfg(target_os = "windows")]
pub fn find_process(process_name: &str) -> Option<ProcessInfo> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
        TH32CS_SNAPPROCESS,
    };

    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0).ok()?;

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                let name = String::from_utf16_lossy(
                    &entry.szExeFile[..entry
                        .szExeFile
                        .iter()
                        .position(|&c| c == 0)
                        .unwrap_or(entry.szExeFile.len())],
                );

                if name.eq_ignore_ascii_case(process_name) {
                    let _ = CloseHandle(snapshot);
                    return Some(ProcessInfo {
                        pid: entry.th32ProcessID,
                        name,
                    });
                }

                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }

        let _ = CloseHandle(snapshot);
    }

    None
}

/// Find a process by name (Linux implementation)
///
/// Matches `comm` or the file name of the first `cmdline` argument, which is
/// how a Wine-hosted `War3.exe` shows up.
#[cfg(target_os = "linux")]
pub fn find_process(process_name: &str) -> Option<ProcessInfo> {
    use std::fs;
    use std::path::Path;

    for entry in fs::read_dir("/proc").ok()?.flatten() {
        let path = entry.path();
        let Some(pid) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            continue;
        };

        let Ok(comm) = fs::read_to_string(path.join("comm")) else {
            continue;
        };
        let comm = comm.trim();

        let exe_name = fs::read_to_string(path.join("cmdline"))
            .ok()
            .and_then(|s| s.split('\0').next().map(|s| s.replace('\\', "/")))
            .and_then(|s| {
                Path::new(&s)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| comm.to_string());

        if comm.eq_ignore_ascii_case(process_name) || exe_name.eq_ignore_ascii_case(process_name)
        {
            return Some(ProcessInfo {
                pid,
                name: exe_name,
            });
        }
    }

    None
}

/// Get module information for a process
#[cfg(target_os = "windows")]
pub fn get_module_info(pid: u32, module_name: &str) -> Option<ModuleInfo> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, MODULEENTRY32W,
        TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
    };

    unsafe {
        let snapshot =
            CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid).ok()?;

        let mut entry = MODULEENTRY32W {
            dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };

        if Module32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                let name = String::from_utf16_lossy(
                    &entry.szModule[..entry
                        .szModule
                        .iter()
                        .position(|&c| c == 0)
                        .unwrap_or(entry.szModule.len())],
                );

                if name.eq_ignore_ascii_case(module_name) {
                    let _ = CloseHandle(snapshot);
                    return Some(ModuleInfo {
                        name,
                        base_address: entry.modBaseAddr as usize,
                        size: entry.modBaseSize as usize,
                    });
                }

                if Module32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }

        let _ = CloseHandle(snapshot);
    }

    None
}

/// Get module information from /proc/[pid]/maps
#[cfg(target_os = "linux")]
pub fn get_module_info(pid: u32, module_name: &str) -> Option<ModuleInfo> {
    let maps = std::fs::read_to_string(format!("/proc/{}/maps", pid)).ok()?;
    module_from_maps(&maps, module_name)
}

/// Lowest and highest address mapped from a file named `module_name`
#[cfg(any(target_os = "linux", test))]
fn module_from_maps(maps: &str, module_name: &str) -> Option<ModuleInfo> {
    let mut start_address: Option<usize> = None;
    let mut end_address = 0usize;

    for line in maps.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }

        let path = parts[5..].join(" ").replace('\\', "/");
        let file = path.rsplit('/').next().unwrap_or(&path);
        if !file.eq_ignore_ascii_case(module_name) {
            continue;
        }

        let Some((start, end)) = parts[0].split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (
            usize::from_str_radix(start, 16),
            usize::from_str_radix(end, 16),
        ) else {
            continue;
        };

        start_address = Some(start_address.map_or(start, |s| s.min(start)));
        end_address = end_address.max(end);
    }

    let base = start_address?;
    Some(ModuleInfo {
        name: module_name.to_string(),
        base_address: base,
        size: end_address - base,
    })
}

/// Check if a process is still running by its HANDLE
#[cfg(target_os = "windows")]
pub fn is_process_running_by_handle(handle: HANDLE) -> bool {
    use windows::Win32::System::Threading::GetExitCodeProcess;

    // STILL_ACTIVE is 259 (STATUS_PENDING)
    const STILL_ACTIVE: u32 = 259;

    if handle.is_invalid() {
        return false;
    }

    unsafe {
        let mut exit_code = 0u32;
        if GetExitCodeProcess(handle, &mut exit_code).is_ok() {
            return exit_code == STILL_ACTIVE;
        }
    }

    false
}

/// Check if a process is still running by its PID
#[cfg(target_os = "windows")]
pub fn is_process_running(pid: u32) -> bool {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    unsafe {
        if let Ok(handle) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
            let result = is_process_running_by_handle(handle);
            let _ = CloseHandle(handle);
            return result;
        }
    }

    false
}

/// Check if a process is still running by its PID (Linux)
#[cfg(target_os = "linux")]
pub fn is_process_running(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{}", pid)).exists()
}

/// Forcefully terminate a process
#[cfg(target_os = "windows")]
pub fn terminate_process(pid: u32) -> bool {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

    unsafe {
        let Ok(handle) = OpenProcess(PROCESS_TERMINATE, false, pid) else {
            return false;
        };
        let result = TerminateProcess(handle, 1).is_ok();
        let _ = CloseHandle(handle);
        result
    }
}

/// Forcefully terminate a process (Linux)
#[cfg(target_os = "linux")]
pub fn terminate_process(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) == 0 }
}

/// Find a process by any of the given names
pub fn find_process_by_names(process_names: &[&str]) -> Option<ProcessInfo> {
    process_names.iter().find_map(|name| find_process(name))
}

/// Process finder backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessFinder;

impl ProcessFinder for SystemProcessFinder {
    fn find_process(&self, target_names: &[&str]) -> Option<(u32, String)> {
        find_process_by_names(target_names).map(|info| (info.pid, info.name))
    }

    #[cfg(target_os = "windows")]
    fn open_process(&self, pid: u32) -> Option<Box<dyn ProcessMemory>> {
        super::windows::WindowsProcessMemory::open(pid)
            .map(|m| Box::new(m) as Box<dyn ProcessMemory>)
    }

    #[cfg(target_os = "linux")]
    fn open_process(&self, pid: u32) -> Option<Box<dyn ProcessMemory>> {
        if !is_process_running(pid) {
            return None;
        }
        Some(Box::new(super::linux::LinuxProcessMemory::new(pid as i32)))
    }

    fn terminate(&self, pid: u32) -> bool {
        terminate_process(pid)
    }
}
