use std::io;
use std::os::raw::c_int;

/// Single heap buffer for read-style I/O, sized to the negotiated image.
#[derive(Debug)]
pub struct Arena {
    buf: Vec<u8>,
}

impl Arena {
    pub fn new(size: usize) -> Self {
        Arena {
            buf: vec![0u8; size],
        }
    }

    /// Reads one frame from the device into the buffer.
    ///
    /// EAGAIN and EIO are the caller's "not ready" signals and are passed
    /// through untouched.
    pub fn fill(&mut self, fd: c_int) -> io::Result<usize> {
        let ret = unsafe {
            libc::read(
                fd,
                self.buf.as_mut_ptr() as *mut std::os::raw::c_void,
                self.buf.len(),
            )
        };

        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret as usize)
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }
}
