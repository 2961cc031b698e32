//! Raw flash character-device medium: erase-before-write via `MEMERASE`,
//! with an optional write-protect GPIO toggled around the write. Grounded
//! in `nvram_interface_mtd.c`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use super::Medium;
use crate::error::{NvramError, Result};

/// Matches the kernel's `struct erase_info_user` from `mtd-abi.h`.
#[repr(C)]
struct EraseInfoUser {
    start: u32,
    length: u32,
}

const MEMGETINFO: libc::c_ulong = 0x80204d01;
const MEMERASE: libc::c_ulong = 0x40084d02;

/// Mirrors the subset of `struct mtd_info_user` this medium needs.
#[repr(C)]
struct MtdInfoUser {
    mtd_type: u8,
    flags: u32,
    size: u32,
    erasesize: u32,
    writesize: u32,
    oobsize: u32,
    padding: u64,
}

pub struct MtdMedium {
    path: String,
    wp_gpio: Option<String>,
}

impl Medium for MtdMedium {
    fn init(section_name: &str) -> Result<Self> {
        if section_name.is_empty() {
            return Err(NvramError::invalid_argument("mtd medium requires a device path"));
        }
        let wp_gpio = std::env::var("NVRAM_WP_GPIO").ok();
        Ok(MtdMedium { path: section_name.to_string(), wp_gpio })
    }

    fn size(&self) -> Result<u64> {
        let f = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut info: MtdInfoUser = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::ioctl(f.as_raw_fd(), MEMGETINFO, &mut info as *mut MtdInfoUser) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(info.size as u64)
    }

    fn read(&self, buf: &mut [u8]) -> Result<()> {
        let mut f = File::open(&self.path)?;
        f.read_exact(buf)?;
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        self.set_write_protect(false)?;
        let result = self.erase_and_write(buf);
        self.set_write_protect(true)?;
        result
    }

    fn section(&self) -> &str {
        &self.path
    }
}

impl MtdMedium {
    fn erase_and_write(&self, buf: &[u8]) -> Result<()> {
        let mut f = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let size = self.size()?;
        let mut erase = EraseInfoUser { start: 0, length: size as u32 };
        let ret = unsafe { libc::ioctl(f.as_raw_fd(), MEMERASE, &mut erase as *mut EraseInfoUser) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        f.write_all(buf)?;
        f.flush()?;
        Ok(())
    }

    fn set_write_protect(&self, protected: bool) -> Result<()> {
        let Some(gpio_path) = &self.wp_gpio else { return Ok(()) };
        let value = if protected { "1" } else { "0" };
        std::fs::write(gpio_path, value)?;
        Ok(())
    }
}
