use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::os::raw::{c_int, c_ulong, c_void};
use std::{io, mem, slice};

use log::warn;

use crate::error::{Error, Result};
use crate::memory::Memory;
use crate::v4l2;
use crate::v4l2::videodev::*;

/// One page-aligned allocation registered with the kernel.
///
/// Drivers require user-pointer buffers to start on a page boundary, so
/// these cannot come from a plain Vec.
#[derive(Debug)]
struct PageBuffer {
    ptr: *mut u8,
    layout: Layout,
}

impl PageBuffer {
    fn new(size: usize, page_size: usize) -> Option<Self> {
        let layout = Layout::from_size_align(size, page_size).ok()?;
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return None;
        }
        Some(PageBuffer { ptr, layout })
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for PageBuffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) }
    }
}

/// Caller-allocated capture buffers handed to the kernel by address.
///
/// The kernel writes frames directly into process memory; dequeued buffers
/// are identified by matching the reported (address, length) pair against
/// the allocations.
#[derive(Debug)]
pub struct Arena {
    fd: c_int,
    bufs: Vec<PageBuffer>,
}

impl Arena {
    pub fn new(fd: c_int) -> Self {
        Arena {
            fd,
            bufs: Vec::new(),
        }
    }

    /// Registers `count` user-pointer buffers of at least `buffer_size`
    /// bytes with the device.
    ///
    /// The size is rounded up to a whole number of pages.
    pub fn allocate(&mut self, count: u32, buffer_size: usize) -> Result<u32> {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let buffer_size = (buffer_size + page_size - 1) & !(page_size - 1);

        let mut req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        req.count = count;
        req.memory = Memory::UserPtr as u32;
        unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_REQBUFS,
                &mut req as *mut _ as *mut c_void,
            )
            .map_err(|e| {
                if e.raw_os_error() == Some(libc::EINVAL) {
                    Error::Unsupported("device does not support user pointer i/o".into())
                } else {
                    Error::Io(e)
                }
            })?;
        }

        for _ in 0..req.count {
            let buf = PageBuffer::new(buffer_size, page_size).ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::OutOfMemory,
                    "user buffer allocation failed",
                ))
            })?;
            self.bufs.push(buf);
        }

        Ok(req.count)
    }

    /// Drops the allocations and releases the device-side buffers.
    pub fn release(&mut self) -> Result<()> {
        self.bufs.clear();

        let mut req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        req.count = 0;
        req.memory = Memory::UserPtr as u32;
        unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_REQBUFS,
                &mut req as *mut _ as *mut c_void,
            )?;
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    /// Hands the buffer at `index` to the kernel.
    pub fn queue(&mut self, index: u32) -> io::Result<()> {
        let b = &self.bufs[index as usize];

        let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
        buf.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = Memory::UserPtr as u32;
        buf.index = index;
        buf.m.userptr = b.ptr as c_ulong;
        buf.length = b.len() as u32;
        unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_QBUF,
                &mut buf as *mut _ as *mut c_void,
            )
        }
    }

    /// Takes one filled buffer back from the kernel.
    ///
    /// The kernel reports the buffer by address, so the matching index is
    /// recovered by comparing (address, length) against the allocations.
    /// EAGAIN/EIO pass through for the caller's readiness loop.
    pub fn dequeue(&mut self) -> io::Result<u32> {
        let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
        buf.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = Memory::UserPtr as u32;
        unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_DQBUF,
                &mut buf as *mut _ as *mut c_void,
            )?;
        }

        let userptr = unsafe { buf.m.userptr };
        self.bufs
            .iter()
            .position(|b| b.ptr as c_ulong == userptr && b.len() == buf.length as usize)
            .map(|index| index as u32)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "dequeued buffer does not match any registered allocation",
                )
            })
    }

    /// View of the allocation at `index`.
    pub fn get(&self, index: u32) -> &[u8] {
        let b = &self.bufs[index as usize];
        unsafe { slice::from_raw_parts(b.ptr, b.len()) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if !self.bufs.is_empty() {
            if let Err(e) = self.release() {
                warn!("failed to release user buffers: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PageBuffer;

    #[test]
    fn allocations_are_page_aligned() {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let buf = PageBuffer::new(page_size * 3, page_size).unwrap();
        assert_eq!(buf.ptr as usize % page_size, 0);
        assert_eq!(buf.len(), page_size * 3);
    }
}
