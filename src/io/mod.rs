//! Buffer management for the v4l2 I/O methods.
//!
//! Each method owns its buffers differently: read I/O fills a single heap
//! buffer, mmap I/O borrows kernel-owned mappings, user-pointer I/O
//! registers page-aligned process memory with the kernel. The mmap and
//! user-pointer arenas share the queue/dequeue protocol: a buffer belongs
//! to either the kernel or the arena at any instant, never both.

use std::fmt;

use crate::capability::{Capabilities, Flags};

pub mod mmap;
pub mod read;
pub mod userptr;

/// How pixel data crosses the kernel boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Plain read() calls on the device node
    Read,
    /// Kernel buffers mapped into the process
    Mmap,
    /// Process buffers registered with the kernel
    UserPtr,
}

impl Method {
    /// Picks the I/O method for a device.
    ///
    /// Streaming devices get mmap unless read I/O is forced; everything
    /// else reads. User-pointer I/O is never auto-selected, but remains
    /// available to integrations that want caller-owned buffers.
    pub fn select(caps: &Capabilities, force_read: bool) -> Method {
        if !force_read && caps.capabilities.contains(Flags::STREAMING) {
            Method::Mmap
        } else {
            Method::Read
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Method::Read => write!(f, "read"),
            Method::Mmap => write!(f, "memory-mapped"),
            Method::UserPtr => write!(f, "user pointer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(flags: Flags) -> Capabilities {
        Capabilities {
            driver: String::new(),
            card: String::new(),
            bus: String::new(),
            version: (0, 0, 0),
            capabilities: flags,
        }
    }

    #[test]
    fn streaming_devices_use_mmap() {
        let c = caps(Flags::VIDEO_CAPTURE | Flags::STREAMING);
        assert_eq!(Method::select(&c, false), Method::Mmap);
    }

    #[test]
    fn forced_read_wins_over_streaming() {
        let c = caps(Flags::VIDEO_CAPTURE | Flags::STREAMING | Flags::READ_WRITE);
        assert_eq!(Method::select(&c, true), Method::Read);
    }

    #[test]
    fn non_streaming_devices_fall_back_to_read() {
        let c = caps(Flags::VIDEO_CAPTURE | Flags::READ_WRITE);
        assert_eq!(Method::select(&c, false), Method::Read);
    }
}
