//! CLI entry point: logging init, advisory lockfile, argument dispatch.
//! Thin by design — all engine logic lives in the library crate.

mod cli;

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::process::ExitCode;
use std::time::Duration;

use cli::{Args, NamespaceSelector, Op};
use nvram::error::{NvramError, Result};
use nvram::format::{self, FormatHandle};
use nvram::interface::{self, Namespace as IfaceNamespace, Side as IfaceSide};
use nvram::namespace::{Namespace, NamespaceGate};
use nvram::EntrySet;

const DEFAULT_LOCKFILE: &str = "/run/lock/nvram.lock";
const SYSTEM_UNLOCK_SENTINEL: &str = "16440";
const SYSTEM_PREFIX: &str = "SYS_";

fn main() -> ExitCode {
    init_logging();

    let argv = std::env::args().collect::<Vec<_>>();
    let parsed = match cli::parse(argv) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("nvram: {e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    let lockfile_path =
        std::env::var("NVRAM_LOCKFILE").unwrap_or_else(|_| DEFAULT_LOCKFILE.to_string());
    let _lock = match LockFile::acquire(&lockfile_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("nvram: failed to acquire lockfile {lockfile_path}: {e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    match run(&parsed) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("nvram: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn init_logging() {
    let debug = std::env::var("NVRAM_DEBUG").map(|v| v != "0" && !v.is_empty()).unwrap_or(false);
    let level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

struct NamespaceStore {
    handle: FormatHandle,
    entries: EntrySet,
}

fn section_path(
    args: &Args,
    iface_ns: IfaceNamespace,
    side: IfaceSide,
    override_value: &Option<String>,
) -> Result<String> {
    if let Some(v) = override_value {
        return Ok(v.clone());
    }
    interface::resolve_section_path(&args.interface, iface_ns, side)
}

fn open_namespace(args: &Args, gate_namespace: Namespace) -> Result<NamespaceStore> {
    let (iface_ns, a_override, b_override) = match gate_namespace {
        Namespace::System => (IfaceNamespace::System, &args.sys_a, &args.sys_b),
        Namespace::User => (IfaceNamespace::User, &args.user_a, &args.user_b),
    };
    let a = section_path(args, iface_ns, IfaceSide::A, a_override)?;
    let b = section_path(args, iface_ns, IfaceSide::B, b_override)?;
    let (handle, entries) = format::open(&args.format, &args.interface, &a, &b)?;
    Ok(NamespaceStore { handle, entries })
}

fn run(args: &Args) -> Result<()> {
    let gate = NamespaceGate::from_env(SYSTEM_PREFIX, "NVRAM_SYSTEM_UNLOCK", SYSTEM_UNLOCK_SENTINEL);

    let open_system = matches!(args.namespace, NamespaceSelector::System | NamespaceSelector::Both);
    let open_user = matches!(args.namespace, NamespaceSelector::Both | NamespaceSelector::User);

    let mut system = if open_system { Some(open_namespace(args, Namespace::System)?) } else { None };
    let mut user = if open_user { Some(open_namespace(args, Namespace::User)?) } else { None };

    let result = dispatch(args, &gate, &mut system, &mut user);

    // Only the namespace actually mutated by Set/Del is committed; reads
    // (and any namespace untouched by a write) are closed without writing,
    // regardless of whether the operation itself errored.
    let mutated = result.as_ref().ok().copied().flatten();
    let close_result = (|| -> Result<()> {
        if let Some(s) = system.take() {
            if mutated == Some(Namespace::System) { commit_and_close(s)? } else { s.handle.close() }
        }
        if let Some(u) = user.take() {
            if mutated == Some(Namespace::User) { commit_and_close(u)? } else { u.handle.close() }
        }
        Ok(())
    })();

    result?;
    close_result
}

/// Returns which namespace (if any) was mutated, so `run` knows what to
/// commit. `Get`/`List` never mutate and always return `None`.
fn dispatch(
    args: &Args,
    gate: &NamespaceGate,
    system: &mut Option<NamespaceStore>,
    user: &mut Option<NamespaceStore>,
) -> Result<Option<Namespace>> {
    match args.op {
        Op::List => {
            if let Some(s) = system {
                print_entries(&s.entries);
            }
            if let Some(u) = user {
                print_entries(&u.entries);
            }
            Ok(None)
        }
        Op::Get => {
            let key =
                args.key.as_deref().ok_or_else(|| NvramError::invalid_argument("--get requires a key"))?;
            let found = user
                .as_ref()
                .and_then(|u| u.entries.get(key.as_bytes()))
                .or_else(|| system.as_ref().and_then(|s| s.entries.get(key.as_bytes())));
            match found {
                Some(value) => {
                    println!("{}", render_value(value));
                    Ok(None)
                }
                None => Err(NvramError::not_found(key.as_bytes())),
            }
        }
        Op::Set => {
            let key =
                args.key.as_deref().ok_or_else(|| NvramError::invalid_argument("--set requires a key"))?;
            let value = args
                .value
                .as_deref()
                .ok_or_else(|| NvramError::invalid_argument("--set requires a value"))?;
            let (namespace, target) = pick_write_target(args, system, user, gate, key.as_bytes())?;
            target.entries.set(key.as_bytes(), value.as_bytes());
            Ok(Some(namespace))
        }
        Op::Del => {
            let key =
                args.key.as_deref().ok_or_else(|| NvramError::invalid_argument("--del requires a key"))?;
            let (namespace, target) = pick_write_target(args, system, user, gate, key.as_bytes())?;
            target.entries.remove(key.as_bytes());
            Ok(Some(namespace))
        }
    }
}

/// Writes always target exactly one namespace: the explicit `--sys`/`--user`
/// selector, or `user` by default ("default = both readable, user
/// writable", per the external CLI contract).
fn pick_write_target<'a>(
    args: &Args,
    system: &'a mut Option<NamespaceStore>,
    user: &'a mut Option<NamespaceStore>,
    gate: &NamespaceGate,
    key: &[u8],
) -> Result<(Namespace, &'a mut NamespaceStore)> {
    let namespace = match args.namespace {
        NamespaceSelector::System => Namespace::System,
        NamespaceSelector::User | NamespaceSelector::Both => Namespace::User,
    };
    gate.check_write(namespace, key)?;
    let store = match namespace {
        Namespace::System => system.as_mut().expect("system namespace was opened"),
        Namespace::User => user.as_mut().expect("user namespace was opened"),
    };
    Ok((namespace, store))
}

fn commit_and_close(mut store: NamespaceStore) -> Result<()> {
    store.handle.commit(&store.entries)?;
    store.handle.close();
    Ok(())
}

fn print_entries(entries: &EntrySet) {
    for (key, value) in entries.iter() {
        println!("{}={}", render_value(key), render_value(value));
    }
}

/// A byte sequence is "string-typed" iff its last byte is `0x00`; otherwise
/// it is rendered as hex. Presentation only, matches `append_hex` in
/// `original_source/main.c`.
fn render_value(bytes: &[u8]) -> String {
    if bytes.last() == Some(&0) {
        String::from_utf8_lossy(&bytes[..bytes.len() - 1]).into_owned()
    } else {
        let mut s = String::from("0x");
        for b in bytes {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
        }
        s
    }
}

/// Advisory exclusive flock held for the lifetime of the process, matching
/// `acquire_lockfile`/`release_lockfile` in `original_source/main.c`.
struct LockFile {
    fd: RawFd,
}

impl LockFile {
    fn acquire(path: &str) -> Result<Self> {
        let c_path = CString::new(path)
            .map_err(|_| NvramError::invalid_argument("lockfile path contains a NUL byte"))?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o644) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        const RETRIES: u32 = 10;
        for attempt in 0..=RETRIES {
            let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if ret == 0 {
                return Ok(LockFile { fd });
            }
            if attempt == RETRIES {
                unsafe { libc::close(fd) };
                return Err(NvramError::permission_denied("could not acquire advisory lockfile"));
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        unreachable!()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.fd, libc::LOCK_UN);
            libc::close(self.fd);
        }
    }
}
