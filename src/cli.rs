//! Argument parsing and validation, grounded in `original_source/main.c`'s
//! argv loop. Built with clap's builder API to match the teacher's own
//! style rather than the derive macros it doesn't use elsewhere.

use clap::{Arg, ArgAction, Command};

use crate::error::{NvramError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Set,
    Get,
    Del,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceSelector {
    Both,
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Args {
    pub op: Op,
    pub key: Option<String>,
    pub value: Option<String>,
    pub namespace: NamespaceSelector,
    pub interface: String,
    pub format: String,
    pub sys_a: Option<String>,
    pub sys_b: Option<String>,
    pub user_a: Option<String>,
    pub user_b: Option<String>,
}

fn command() -> Command {
    Command::new("nvram")
        .about("Transactional dual-section NVRAM store")
        .arg(Arg::new("set").long("set").num_args(2).value_names(["KEY", "VALUE"]))
        .arg(Arg::new("get").long("get").num_args(1).value_name("KEY"))
        .arg(Arg::new("del").long("del").num_args(1).value_name("KEY"))
        .arg(Arg::new("list").long("list").action(ArgAction::SetTrue))
        .arg(Arg::new("sys").long("sys").action(ArgAction::SetTrue))
        .arg(Arg::new("user").long("user").action(ArgAction::SetTrue))
        .arg(Arg::new("interface").long("interface").short('i').value_name("NAME").default_value("file"))
        .arg(Arg::new("format").long("format").short('f').value_name("NAME").default_value("v2"))
        .arg(Arg::new("sys_a").long("sys_a").value_name("PATH"))
        .arg(Arg::new("sys_b").long("sys_b").value_name("PATH"))
        .arg(Arg::new("user_a").long("user_a").value_name("PATH"))
        .arg(Arg::new("user_b").long("user_b").value_name("PATH"))
}

/// Parses and validates `argv`. Rejects mixed read/write operations and
/// conflicting namespace selectors before any I/O, per spec §6.
pub fn parse(argv: impl IntoIterator<Item = String>) -> Result<Args> {
    let matches = command()
        .try_get_matches_from(argv)
        .map_err(|e| NvramError::invalid_argument(e.to_string()))?;

    let ops_present = [
        matches.contains_id("set"),
        matches.contains_id("get"),
        matches.contains_id("del"),
        matches.get_flag("list"),
    ];
    if ops_present.iter().filter(|p| **p).count() > 1 {
        return Err(NvramError::invalid_argument(
            "a single run must not mix operations (--set/--get/--del/--list)",
        ));
    }

    let (op, key, value) = if let Some(mut vals) = matches.get_many::<String>("set") {
        (Op::Set, vals.next().cloned(), vals.next().cloned())
    } else if let Some(k) = matches.get_one::<String>("get") {
        (Op::Get, Some(k.clone()), None)
    } else if let Some(k) = matches.get_one::<String>("del") {
        (Op::Del, Some(k.clone()), None)
    } else {
        (Op::List, None, None)
    };

    if matches.get_flag("sys") && matches.get_flag("user") {
        return Err(NvramError::invalid_argument("--sys and --user are mutually exclusive"));
    }
    let namespace = if matches.get_flag("sys") {
        NamespaceSelector::System
    } else if matches.get_flag("user") {
        NamespaceSelector::User
    } else {
        NamespaceSelector::Both
    };

    Ok(Args {
        op,
        key,
        value,
        namespace,
        interface: matches.get_one::<String>("interface").unwrap().clone(),
        format: matches.get_one::<String>("format").unwrap().clone(),
        sys_a: matches.get_one::<String>("sys_a").cloned(),
        sys_b: matches.get_one::<String>("sys_b").cloned(),
        user_a: matches.get_one::<String>("user_a").cloned(),
        user_b: matches.get_one::<String>("user_b").cloned(),
    })
}
