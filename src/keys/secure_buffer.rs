// Locked, zeroized storage for private key material
// Memory is pinned against swapping where the platform allows it

use std::fmt;
use std::ops::Deref;

use zeroize::Zeroize;

/// Heap buffer holding secret bytes, wiped when dropped
pub struct SecureBuffer {
    data: Vec<u8>,
    locked: bool,
}

impl SecureBuffer {
    /// Copy `bytes` into a fresh locked buffer
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    /// Take ownership of `data`; no other copy should outlive the caller
    pub fn from_vec(data: Vec<u8>) -> Self {
        let mut buffer = Self { data, locked: false };

        #[cfg(unix)]
        {
            buffer.try_lock_memory();
        }

        buffer
    }

    /// mlock may fail without CAP_IPC_LOCK or under RLIMIT_MEMLOCK; the
    /// buffer still works, just unpinned
    #[cfg(unix)]
    fn try_lock_memory(&mut self) {
        use libc::{c_void, mlock};

        if self.data.is_empty() {
            return;
        }

        let ptr = self.data.as_ptr() as *const c_void;
        let len = self.data.len();

        unsafe {
            if mlock(ptr, len) == 0 {
                self.locked = true;
            }
        }
    }

    #[cfg(unix)]
    fn unlock_memory(&mut self, len: usize) {
        use libc::{c_void, munlock};

        if self.locked && len > 0 {
            let ptr = self.data.as_ptr() as *const c_void;

            unsafe {
                munlock(ptr, len);
            }
            self.locked = false;
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Deref for SecureBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBuffer([REDACTED; {}])", self.data.len())
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        // Wipe while still pinned, then release the lock
        let len = self.data.len();
        self.data.as_mut_slice().zeroize();

        #[cfg(unix)]
        {
            self.unlock_memory(len);
        }

        #[cfg(not(unix))]
        let _ = len;

        self.data.zeroize();
    }
}
