//! Verbosity-gated logging for the TTI grid.
//!
//! The macros compile to a single integer comparison when the configured
//! verbosity is below their level, so they can sit on the per-TTI hot path.
//! Every line is tagged with its level, e.g. `SCHED[check] ...`.
//!
//! Levels (`CellConfig::verbosity`):
//! - 0: SILENT
//! - 1: ALLOCS. TTI starts and every committed DL/UL allocation with the
//!   RBGs or PRBs it took.
//! - 2: CHECKS. Rejected attempts: RBG/PRB collisions, DCI collisions,
//!   invalid masks or aggregation indices, double allocation of a user,
//!   refused CFI changes.
//! - 3: DEBUG. Dump of every PDCCH placement combination after each DCI.

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_ALLOCS: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Tag printed in front of messages of the given level.
pub fn level_name(verbosity: u8) -> &'static str {
    match verbosity {
        VERBOSITY_SILENT => "silent",
        VERBOSITY_ALLOCS => "alloc",
        VERBOSITY_CHECKS => "check",
        _ => "debug",
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __sched_log {
    ($level:expr, $verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $level {
            eprintln!(
                "SCHED[{}] {}",
                $crate::logging::level_name($level),
                format_args!($($arg)*)
            );
        }
    };
}

/// Log a committed allocation or TTI start (verbosity >= 1).
#[macro_export]
macro_rules! log_allocs {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::__sched_log!($crate::logging::VERBOSITY_ALLOCS, $verbosity, $($arg)*)
    };
}

/// Log a rejected allocation attempt (verbosity >= 2).
///
/// The grid is unchanged whenever one of these is printed.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::__sched_log!($crate::logging::VERBOSITY_CHECKS, $verbosity, $($arg)*)
    };
}

/// Log PDCCH tree internals (verbosity >= 3).
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::__sched_log!($crate::logging::VERBOSITY_DEBUG, $verbosity, $($arg)*)
    };
}
