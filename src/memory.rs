use std::fmt;

use crate::v4l2::videodev;

/// Memory used for buffer exchange with the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Memory {
    Mmap = videodev::V4L2_MEMORY_MMAP,
    UserPtr = videodev::V4L2_MEMORY_USERPTR,
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Memory::Mmap => write!(f, "memory-mapped"),
            Memory::UserPtr => write!(f, "user pointer"),
        }
    }
}
