use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::{io, mem, path::Path, ptr, time};

use crate::v4l2::vidioc;

/// A convenience wrapper around open(2).
///
/// Returns the file descriptor on success.
/// In case of errors, the last OS error will be reported, aka errno on Linux.
///
/// # Arguments
///
/// * `path` - Path to the device node
/// * `flags` - Open flags
pub fn open<P: AsRef<Path>>(path: P, flags: i32) -> io::Result<std::os::raw::c_int> {
    let c_path = CString::new(path.as_ref().as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let fd = unsafe { libc::open(c_path.as_ptr(), flags) };

    if fd == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

/// A convenience wrapper around close(2).
pub fn close(fd: std::os::raw::c_int) -> io::Result<()> {
    let ret = unsafe { libc::close(fd) };

    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// A convenience wrapper around ioctl(2).
///
/// In case of errors, the last OS error will be reported, aka errno on Linux.
///
/// # Arguments
///
/// * `fd` - File descriptor
/// * `request` - IO control code (see [`vidioc`])
/// * `argp` - Pointer to memory region holding the argument type
///
/// # Safety
///
/// For maximum flexibility, argp must be a raw pointer. Thus, the entire
/// function is unsafe.
pub unsafe fn ioctl(
    fd: std::os::raw::c_int,
    request: vidioc::_IOC_TYPE,
    argp: *mut std::os::raw::c_void,
) -> io::Result<()> {
    /*
     * It turns out the libc crate (and libc itself!) defines ioctl() with
     * different, incompatible argument types on different platforms. To
     * hack around this without conditional compilation, use syscall()
     * instead as a drop-in replacement. Details:
     * https://github.com/rust-lang/libc/issues/1036
     */
    let ret = libc::syscall(libc::SYS_ioctl, fd, request, argp) as std::os::raw::c_int;

    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Like [`ioctl`], but transparently restarted when the call is interrupted
/// by a signal.
///
/// # Safety
///
/// See [`ioctl`].
pub unsafe fn xioctl(
    fd: std::os::raw::c_int,
    request: vidioc::_IOC_TYPE,
    argp: *mut std::os::raw::c_void,
) -> io::Result<()> {
    loop {
        match ioctl(fd, request, argp) {
            Err(ref e) if e.raw_os_error() == Some(libc::EINTR) => continue,
            res => return res,
        }
    }
}

/// A convenience wrapper around mmap(2).
///
/// # Arguments
///
/// * `length` - Length of the mapped region
/// * `fd` - File descriptor representing an opened device
/// * `offset` - Offset in the source region, usually taken from
///   `v4l2_buffer.m.offset`
///
/// # Safety
///
/// The returned pointer stays valid until [`munmap`], independently of any
/// Rust lifetime. Callers must not touch it after unmapping.
pub unsafe fn mmap(
    length: usize,
    fd: std::os::raw::c_int,
    offset: libc::off_t,
) -> io::Result<*mut std::os::raw::c_void> {
    let ret = libc::mmap(
        ptr::null_mut(),
        length,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        offset,
    );

    if ret == libc::MAP_FAILED {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// A convenience wrapper around munmap(2).
///
/// # Safety
///
/// Start must be a pointer previously returned by [`mmap`].
pub unsafe fn munmap(start: *mut std::os::raw::c_void, length: usize) -> io::Result<()> {
    let ret = libc::munmap(start, length);

    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Waits for the device to become readable.
///
/// Blocks on select(2) with the given timeout, transparently restarting the
/// wait when a signal interrupts it. Returns `true` when the descriptor has
/// data, `false` when the timeout elapsed.
///
/// # Arguments
///
/// * `fd` - File descriptor of an opened device
/// * `timeout` - Upper bound on the wait
pub fn wait_readable(fd: std::os::raw::c_int, timeout: time::Duration) -> io::Result<bool> {
    loop {
        let mut readfds = unsafe {
            let mut fds = mem::MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(fds.as_mut_ptr());
            libc::FD_SET(fd, fds.as_mut_ptr());
            fds.assume_init()
        };

        let mut tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };

        let ret = unsafe {
            libc::select(
                fd + 1,
                &mut readfds,
                ptr::null_mut(),
                ptr::null_mut(),
                &mut tv,
            )
        };

        match ret {
            -1 => {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(err);
            }
            0 => return Ok(false),
            _ => return Ok(true),
        }
    }
}
