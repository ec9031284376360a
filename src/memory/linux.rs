//! Linux process memory implementation

#![cfg(target_os = "linux")]

use super::process::{get_module_info, is_process_running};
use super::{MemoryReader, MemoryWriter, ProcessMemory};

/// Process memory accessed with process_vm_readv / process_vm_writev
pub struct LinuxProcessMemory {
    pid: i32,
}

impl LinuxProcessMemory {
    /// Create a new accessor for the given process ID
    pub fn new(pid: i32) -> Self {
        Self { pid }
    }

    /// Get the process ID
    pub fn pid(&self) -> i32 {
        self.pid
    }
}

impl MemoryReader for LinuxProcessMemory {
    fn read_bytes(&self, address: usize, size: usize) -> Option<Vec<u8>> {
        let mut buffer = vec![0u8; size];

        let local_iov = libc::iovec {
            iov_base: buffer.as_mut_ptr() as *mut _,
            iov_len: size,
        };

        let remote_iov = libc::iovec {
            iov_base: address as *mut _,
            iov_len: size,
        };

        let result = unsafe { libc::process_vm_readv(self.pid, &local_iov, 1, &remote_iov, 1, 0) };

        if result == size as isize {
            Some(buffer)
        } else {
            None
        }
    }
}

impl MemoryWriter for LinuxProcessMemory {
    fn write_bytes(&self, address: usize, data: &[u8]) -> bool {
        let local_iov = libc::iovec {
            iov_base: data.as_ptr() as *mut _,
            iov_len: data.len(),
        };

        let remote_iov = libc::iovec {
            iov_base: address as *mut _,
            iov_len: data.len(),
        };

        let result =
            unsafe { libc::process_vm_writev(self.pid, &local_iov, 1, &remote_iov, 1, 0) };

        result == data.len() as isize
    }
}

impl ProcessMemory for LinuxProcessMemory {
    fn module_base(&self, module_name: &str) -> Option<usize> {
        get_module_info(self.pid as u32, module_name).map(|m| m.base_address)
    }

    fn is_valid(&self) -> bool {
        is_process_running(self.pid as u32)
    }
}

unsafe impl Send for LinuxProcessMemory {}
unsafe impl Sync for LinuxProcessMemory {}
