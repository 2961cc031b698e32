//! UEFI-variable-file medium: a 4-byte attributes prefix invisible to the
//! engine, and the immutable inode flag toggled around writes. Grounded in
//! `nvram_interface_efi.c`; uses the `FS_IOC_*` ioctls directly rather than
//! an ext2-specific crate, so any Linux filesystem supporting the immutable
//! flag works, not only ext2.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use super::Medium;
use crate::error::{NvramError, Result};

/// The attributes word the original always wrote: `EFI_VARIABLE_NON_VOLATILE
/// | EFI_VARIABLE_BOOTSERVICE_ACCESS | EFI_VARIABLE_RUNTIME_ACCESS`.
const EFI_ATTR: u32 = 0x7;
const ATTR_HEADER_SIZE: usize = 4;

const FS_IOC_GETFLAGS: libc::c_ulong = 0x80086601;
const FS_IOC_SETFLAGS: libc::c_ulong = 0x40086601;
const FS_IMMUTABLE_FL: libc::c_long = 0x00000010;

pub struct EfiMedium {
    path: String,
}

impl Medium for EfiMedium {
    fn init(section_name: &str) -> Result<Self> {
        if section_name.is_empty() {
            return Err(NvramError::invalid_argument("efi medium requires a variable path"));
        }
        Ok(EfiMedium { path: section_name.to_string() })
    }

    fn size(&self) -> Result<u64> {
        let meta = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        Ok(meta.len().saturating_sub(ATTR_HEADER_SIZE as u64))
    }

    fn read(&self, buf: &mut [u8]) -> Result<()> {
        let mut f = File::open(&self.path)?;
        let mut attr = [0u8; ATTR_HEADER_SIZE];
        f.read_exact(&mut attr)?;
        f.read_exact(buf)?;
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        set_immutable(&self.path, false)?;
        let result = write_with_header(&self.path, buf);
        set_immutable(&self.path, true)?;
        result
    }

    fn section(&self) -> &str {
        &self.path
    }
}

fn write_with_header(path: &str, buf: &[u8]) -> Result<()> {
    let mut f = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
    f.write_all(&EFI_ATTR.to_le_bytes())?;
    f.write_all(buf)?;
    f.flush()?;
    Ok(())
}

/// No-op (and not an error) if the path does not exist yet, matching the
/// original's tolerance for setting flags on a variable being created.
fn set_immutable(path: &str, immutable: bool) -> Result<()> {
    let f = match OpenOptions::new().read(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let mut flags: libc::c_long = 0;
    let ret = unsafe { libc::ioctl(f.as_raw_fd(), FS_IOC_GETFLAGS, &mut flags as *mut libc::c_long) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    if immutable {
        flags |= FS_IMMUTABLE_FL;
    } else {
        flags &= !FS_IMMUTABLE_FL;
    }
    let ret = unsafe { libc::ioctl(f.as_raw_fd(), FS_IOC_SETFLAGS, &flags as *const libc::c_long) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}
