use std::os::raw::{c_int, c_void};
use std::{io, mem, slice};

use log::warn;

use crate::error::{Error, Result};
use crate::memory::Memory;
use crate::v4l2;
use crate::v4l2::videodev::*;

/// Kernel-owned capture buffers mapped into the process.
///
/// The kernel allocates the backing memory on REQBUFS; the arena maps each
/// buffer and unmaps them all again on release (or drop). Ownership of an
/// individual buffer moves to the kernel on queue and back on dequeue.
#[derive(Debug)]
pub struct Arena {
    fd: c_int,
    bufs: Vec<(*mut c_void, usize)>,
}

impl Arena {
    pub fn new(fd: c_int) -> Self {
        Arena {
            fd,
            bufs: Vec::new(),
        }
    }

    /// Requests and maps `count` buffers on the device.
    ///
    /// Returns the number of buffers actually granted; drivers may hand out
    /// fewer than requested, and fewer than two is not workable.
    pub fn allocate(&mut self, count: u32) -> Result<u32> {
        let mut req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        req.count = count;
        req.memory = Memory::Mmap as u32;
        unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_REQBUFS,
                &mut req as *mut _ as *mut c_void,
            )
            .map_err(|e| {
                if e.raw_os_error() == Some(libc::EINVAL) {
                    Error::Unsupported("device does not support memory mapping".into())
                } else {
                    Error::Io(e)
                }
            })?;
        }

        if req.count < 2 {
            return Err(Error::Unsupported(
                "insufficient buffer memory on device".into(),
            ));
        }

        for index in 0..req.count {
            let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
            buf.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
            buf.memory = Memory::Mmap as u32;
            buf.index = index;
            unsafe {
                v4l2::xioctl(
                    self.fd,
                    v4l2::vidioc::VIDIOC_QUERYBUF,
                    &mut buf as *mut _ as *mut c_void,
                )?;

                let ptr = v4l2::mmap(buf.length as usize, self.fd, buf.m.offset as libc::off_t)?;
                self.bufs.push((ptr, buf.length as usize));
            }
        }

        Ok(req.count)
    }

    /// Unmaps all buffers and releases them on the device.
    pub fn release(&mut self) -> Result<()> {
        for buf in &self.bufs {
            unsafe {
                v4l2::munmap(buf.0, buf.1)?;
            }
        }
        self.bufs.clear();

        // free the device-side buffers by requesting 0
        let mut req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        req.count = 0;
        req.memory = Memory::Mmap as u32;
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
        let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
        buf.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = Memory::Mmap as u32;
        buf.index = index;
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
    /// Returns the buffer index; EAGAIN/EIO pass through for the caller's
    /// readiness loop.
    pub fn dequeue(&mut self) -> io::Result<u32> {
        let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
        buf.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = Memory::Mmap as u32;
        unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_DQBUF,
                &mut buf as *mut _ as *mut c_void,
            )?;
        }

        Ok(buf.index)
    }

    /// View of the mapping at `index`.
    pub fn get(&self, index: u32) -> &[u8] {
        let (ptr, len) = self.bufs[index as usize];
        unsafe { slice::from_raw_parts(ptr as *const u8, len) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if !self.bufs.is_empty() {
            if let Err(e) = self.release() {
                warn!("failed to release mapped buffers: {}", e);
            }
        }
    }
}
