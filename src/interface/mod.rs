//! Maps an interface name to a `Medium` constructor, plus the default
//! section paths and env-var overrides for each `(namespace, side)`,
//! mirroring `nvram_interface.c`'s `available_interfaces` table.

use crate::error::{NvramError, Result};
use crate::medium::{FileMedium, Medium};
#[cfg(target_os = "linux")]
use crate::medium::{EfiMedium, MtdMedium};

/// Constructs the concrete `Medium` named by `interface_name`, bound to
/// `section_name`.
pub fn construct_medium(interface_name: &str, section_name: &str) -> Result<Box<dyn Medium>> {
    match interface_name {
        "file" => Ok(Box::new(FileMedium::init(section_name)?)),
        #[cfg(target_os = "linux")]
        "mtd" => Ok(Box::new(MtdMedium::init(section_name)?)),
        #[cfg(target_os = "linux")]
        "efi" => Ok(Box::new(EfiMedium::init(section_name)?)),
        #[cfg(not(target_os = "linux"))]
        "mtd" | "efi" => Err(NvramError::unsupported(format!(
            "interface '{interface_name}' is only available on linux"
        ))),
        other => Err(NvramError::invalid_argument(format!("unknown interface '{other}'"))),
    }
}

pub struct DefaultPaths {
    pub system_a: &'static str,
    pub system_b: &'static str,
    pub user_a: &'static str,
    pub user_b: &'static str,
}

fn default_paths(interface_name: &str) -> Result<DefaultPaths> {
    match interface_name {
        "file" => Ok(DefaultPaths {
            system_a: "/etc/nvram/system_a",
            system_b: "/etc/nvram/system_b",
            user_a: "/etc/nvram/user_a",
            user_b: "/etc/nvram/user_b",
        }),
        "mtd" => Ok(DefaultPaths {
            system_a: "/dev/mtd0",
            system_b: "/dev/mtd1",
            user_a: "/dev/mtd2",
            user_b: "/dev/mtd3",
        }),
        "efi" => Ok(DefaultPaths {
            system_a: "/sys/firmware/efi/efivars/NvramSystemA-00000000-0000-0000-0000-000000000000",
            system_b: "/sys/firmware/efi/efivars/NvramSystemB-00000000-0000-0000-0000-000000000000",
            user_a: "/sys/firmware/efi/efivars/NvramUserA-00000000-0000-0000-0000-000000000000",
            user_b: "/sys/firmware/efi/efivars/NvramUserB-00000000-0000-0000-0000-000000000000",
        }),
        other => Err(NvramError::invalid_argument(format!("unknown interface '{other}'"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    System,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// Per-interface env var override name, e.g. `NVRAM_FILE_SYSTEM_A`.
fn override_env_var(interface_name: &str, namespace: Namespace, side: Side) -> String {
    let ns = match namespace {
        Namespace::System => "SYSTEM",
        Namespace::User => "USER",
    };
    let side = match side {
        Side::A => "A",
        Side::B => "B",
    };
    format!("NVRAM_{}_{}_{}", interface_name.to_uppercase(), ns, side)
}

/// Resolves the section path for `(interface, namespace, side)`: an env var
/// override if set, else the interface's default.
pub fn resolve_section_path(interface_name: &str, namespace: Namespace, side: Side) -> Result<String> {
    let env_var = override_env_var(interface_name, namespace, side);
    if let Ok(v) = std::env::var(&env_var) {
        return Ok(v);
    }
    let defaults = default_paths(interface_name)?;
    let default = match (namespace, side) {
        (Namespace::System, Side::A) => defaults.system_a,
        (Namespace::System, Side::B) => defaults.system_b,
        (Namespace::User, Side::A) => defaults.user_a,
        (Namespace::User, Side::B) => defaults.user_b,
    };
    Ok(default.to_string())
}
