//! Decides which section is active on open, and which section to write (and
//! whether to reset the counter) on commit. Uses RFC 1982 serial-number
//! arithmetic for the counter comparison — never naive `>` on the raw u32,
//! since the counter wraps.

use crate::codec::SectionHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    Empty,
    HeaderOnlyValid,
    AllVerified,
    Corrupt,
}

/// What `open` learned about one physical section before activation is
/// decided.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub state: SectionState,
    pub header: Option<SectionHeader>,
}

impl Candidate {
    pub fn absent() -> Self {
        Candidate { state: SectionState::Empty, header: None }
    }
}

/// RFC 1982 serial-number comparison: `a` is strictly newer than `b` iff
/// `(a - b) mod 2^32` lies in the open interval `(0, 2^31)`.
fn counter_greater(a: u32, b: u32) -> bool {
    let diff = a.wrapping_sub(b);
    diff != 0 && diff < (1u32 << 31)
}

/// §4.4 "Active selection". `None` means the store opens empty.
pub fn select_active(a: &Candidate, b: &Candidate) -> Option<Side> {
    let a_verified = a.state == SectionState::AllVerified;
    let b_verified = b.state == SectionState::AllVerified;

    match (a_verified, b_verified) {
        (false, false) => None,
        (true, false) => Some(Side::A),
        (false, true) => Some(Side::B),
        (true, true) => {
            let ca = a.header.expect("verified candidate has a header").counter;
            let cb = b.header.expect("verified candidate has a header").counter;
            if counter_greater(ca, cb) {
                Some(Side::A)
            } else if counter_greater(cb, ca) {
                Some(Side::B)
            } else {
                // Equal counters should not occur for two independently
                // valid sides, but if they do (e.g. two intact post-reset
                // copies), A is preferred.
                Some(Side::A)
            }
        }
    }
}

/// §4.4 "Next-transaction decision".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextTransaction {
    pub write_target: Side,
    pub next_counter: u32,
    pub counter_reset: bool,
}

/// `active`, the current counter of the active side (if any), and which
/// sides physically exist, determine the next write. `restore_redundancy`
/// is set by the caller when exactly one side was valid at open (the other
/// was empty, header-only, or corrupt) — the first commit after such an
/// open writes the same buffer to both sides to resynchronize them, per
/// §4.4, independent of whether the counter happens to wrap.
pub fn next_transaction(
    active: Option<Side>,
    active_counter: Option<u32>,
    a_present: bool,
    b_present: bool,
    restore_redundancy: bool,
) -> NextTransaction {
    match active {
        None => {
            let write_target = if a_present { Side::A } else { Side::B };
            NextTransaction { write_target, next_counter: 1, counter_reset: false }
        }
        Some(side) => {
            let current = active_counter.expect("active side has a counter");
            if !a_present || !b_present {
                // Single-section mode: ping-pongs to itself, COUNTER_RESET
                // never fires since there is no other side to resynchronize.
                let next_counter = current.wrapping_add(1).max(1);
                return NextTransaction { write_target: side, next_counter, counter_reset: false };
            }
            let write_target = side.other();
            match current.checked_add(1) {
                Some(next_counter) => {
                    NextTransaction { write_target, next_counter, counter_reset: restore_redundancy }
                }
                None => NextTransaction { write_target, next_counter: 1, counter_reset: true },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{PayloadType, SectionHeader};

    fn verified(counter: u32) -> Candidate {
        Candidate {
            state: SectionState::AllVerified,
            header: Some(SectionHeader::skeleton(counter, PayloadType::List)),
        }
    }

    #[test]
    fn neither_verified_is_inactive() {
        assert_eq!(select_active(&Candidate::absent(), &Candidate::absent()), None);
    }

    #[test]
    fn exactly_one_verified_wins() {
        assert_eq!(select_active(&verified(5), &Candidate::absent()), Some(Side::A));
        assert_eq!(select_active(&Candidate::absent(), &verified(5)), Some(Side::B));
    }

    #[test]
    fn greater_counter_wins() {
        assert_eq!(select_active(&verified(2), &verified(1)), Some(Side::A));
        assert_eq!(select_active(&verified(1), &verified(2)), Some(Side::B));
    }

    #[test]
    fn tie_prefers_a() {
        assert_eq!(select_active(&verified(7), &verified(7)), Some(Side::A));
    }

    #[test]
    fn wraparound_comparison_is_modular() {
        // counter near the top of the range is "less than" a small counter
        // that follows it after wraparound.
        assert_eq!(select_active(&verified(u32::MAX), &verified(1)), Some(Side::B));
        assert_eq!(select_active(&verified(1), &verified(u32::MAX)), Some(Side::A));
    }

    #[test]
    fn fresh_store_targets_a_first() {
        let next = next_transaction(None, None, true, true, false);
        assert_eq!(next, NextTransaction { write_target: Side::A, next_counter: 1, counter_reset: false });
    }

    #[test]
    fn fresh_store_single_section_b_only() {
        let next = next_transaction(None, None, false, true, false);
        assert_eq!(next.write_target, Side::B);
    }

    #[test]
    fn alternation_after_a() {
        let next = next_transaction(Some(Side::A), Some(1), true, true, false);
        assert_eq!(next, NextTransaction { write_target: Side::B, next_counter: 2, counter_reset: false });
    }

    #[test]
    fn wraparound_triggers_reset() {
        let next = next_transaction(Some(Side::A), Some(u32::MAX), true, true, false);
        assert_eq!(next, NextTransaction { write_target: Side::B, next_counter: 1, counter_reset: true });
    }

    #[test]
    fn single_section_ping_pongs_without_reset_flag_until_wrap() {
        let next = next_transaction(Some(Side::A), Some(4), true, false, false);
        assert_eq!(next, NextTransaction { write_target: Side::A, next_counter: 5, counter_reset: false });
    }

    #[test]
    fn single_section_wraparound_never_sets_reset() {
        let next = next_transaction(Some(Side::A), Some(u32::MAX), true, false, false);
        assert_eq!(next, NextTransaction { write_target: Side::A, next_counter: 1, counter_reset: false });
    }

    #[test]
    fn one_side_valid_at_open_restores_redundancy_on_next_commit() {
        let next = next_transaction(Some(Side::A), Some(5), true, true, true);
        assert_eq!(next, NextTransaction { write_target: Side::B, next_counter: 6, counter_reset: true });
    }

    #[test]
    fn single_section_mode_ignores_restore_redundancy() {
        let next = next_transaction(Some(Side::A), Some(5), true, false, true);
        assert_eq!(next, NextTransaction { write_target: Side::A, next_counter: 6, counter_reset: false });
    }
}
