//! Plain-file and block-device backed medium. Opens the path fresh on every
//! `read`/`write` rather than holding a persistent descriptor, matching
//! `nvram_interface_file.c`'s style.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use super::Medium;
use crate::error::{NvramError, Result};

pub struct FileMedium {
    path: PathBuf,
}

impl Medium for FileMedium {
    fn init(section_name: &str) -> Result<Self> {
        if section_name.is_empty() {
            return Err(NvramError::invalid_argument("file medium requires a path"));
        }
        Ok(FileMedium { path: PathBuf::from(section_name) })
    }

    fn size(&self) -> Result<u64> {
        let meta = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        if meta.file_type().is_block_device_like() {
            return block_device_size(&self.path);
        }
        Ok(meta.len())
    }

    fn read(&self, buf: &mut [u8]) -> Result<()> {
        let mut f = File::open(&self.path)?;
        f.read_exact(buf)?;
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        let mut f = OpenOptions::new().write(true).create(true).truncate(true).open(&self.path)?;
        f.write_all(buf)?;
        f.flush()?;
        Ok(())
    }

    fn section(&self) -> &str {
        self.path.to_str().unwrap_or("<non-utf8 path>")
    }
}

/// Extension used to branch on block-device sizing without a `cfg` at every
/// call site.
trait FileTypeExt {
    fn is_block_device_like(&self) -> bool;
}

#[cfg(unix)]
impl FileTypeExt for fs::FileType {
    fn is_block_device_like(&self) -> bool {
        use std::os::unix::fs::FileTypeExt;
        self.is_block_device()
    }
}

#[cfg(not(unix))]
impl FileTypeExt for fs::FileType {
    fn is_block_device_like(&self) -> bool {
        false
    }
}

#[cfg(target_os = "linux")]
fn block_device_size(path: &std::path::Path) -> Result<u64> {
    use std::os::unix::io::AsRawFd;

    const BLKGETSIZE64: libc::c_ulong = 0x80081272;

    let f = File::open(path)?;
    let mut size: u64 = 0;
    let ret = unsafe { libc::ioctl(f.as_raw_fd(), BLKGETSIZE64, &mut size as *mut u64) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(size)
}

#[cfg(not(target_os = "linux"))]
fn block_device_size(_path: &std::path::Path) -> Result<u64> {
    Err(NvramError::unsupported("block device sizing is only implemented on linux"))
}
