//! Windows process memory implementation

#![cfg(target_os = "windows")]

use super::process::get_module_info;
use super::{MemoryReader, MemoryWriter, ProcessMemory};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::Memory::{
    VirtualProtectEx, PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS,
};
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
    PROCESS_VM_WRITE,
};

use super::process::is_process_running_by_handle;

/// Process handle opened for reading and patching
pub struct WindowsProcessMemory {
    handle: HANDLE,
    pid: u32,
}

impl WindowsProcessMemory {
    /// Open the process with read, write and protection rights
    pub fn open(pid: u32) -> Option<Self> {
        let access =
            PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION;
        let handle = unsafe { OpenProcess(access, false, pid) }.ok()?;
        Some(Self { handle, pid })
    }

    /// Get the underlying handle
    pub fn handle(&self) -> HANDLE {
        self.handle
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Temporarily switch the pages under `[address, address + size)` to
    /// execute-read-write, returning the previous protection
    fn unprotect(&self, address: usize, size: usize) -> Option<PAGE_PROTECTION_FLAGS> {
        let mut old = PAGE_PROTECTION_FLAGS(0);
        unsafe {
            VirtualProtectEx(
                self.handle,
                address as *const _,
                size,
                PAGE_EXECUTE_READWRITE,
                &mut old,
            )
        }
        .ok()
        .map(|_| old)
    }

    fn restore(&self, address: usize, size: usize, protection: PAGE_PROTECTION_FLAGS) {
        let mut ignored = PAGE_PROTECTION_FLAGS(0);
        let _ = unsafe {
            VirtualProtectEx(
                self.handle,
                address as *const _,
                size,
                protection,
                &mut ignored,
            )
        };
    }
}

impl MemoryReader for WindowsProcessMemory {
    fn read_bytes(&self, address: usize, size: usize) -> Option<Vec<u8>> {
        let mut buffer = vec![0u8; size];
        let mut bytes_read = 0;

        let result = unsafe {
            ReadProcessMemory(
                self.handle,
                address as *const _,
                buffer.as_mut_ptr() as *mut _,
                size,
                Some(&mut bytes_read),
            )
        };

        if result.is_ok() && bytes_read == size {
            Some(buffer)
        } else {
            None
        }
    }
}

impl MemoryWriter for WindowsProcessMemory {
    fn write_bytes(&self, address: usize, data: &[u8]) -> bool {
        let previous = self.unprotect(address, data.len());
        let mut written = 0;

        let result = unsafe {
            WriteProcessMemory(
                self.handle,
                address as *const _,
                data.as_ptr() as *const _,
                data.len(),
                Some(&mut written),
            )
        };

        if let Some(protection) = previous {
            self.restore(address, data.len(), protection);
        }
        result.is_ok() && written == data.len()
    }
}

impl ProcessMemory for WindowsProcessMemory {
    fn module_base(&self, module_name: &str) -> Option<usize> {
        get_module_info(self.pid, module_name).map(|m| m.base_address)
    }

    fn is_valid(&self) -> bool {
        is_process_running_by_handle(self.handle)
    }
}

impl Drop for WindowsProcessMemory {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.handle) };
    }
}

// Note: HANDLE is not Send/Sync by default; the handle is only used for
// stateless Read/WriteProcessMemory calls
unsafe impl Send for WindowsProcessMemory {}
unsafe impl Sync for WindowsProcessMemory {}
