//! Logging shims, private to the crate.
//!
//! Every level forwards to the matching [defmt](https://docs.rs/defmt/latest/defmt) macro when
//! the `defmt` feature is enabled. Without it the arguments are only borrowed, so values that
//! exist just for a log line do not trigger unused warnings.

#[collapse_debuginfo(yes)]
macro_rules! log_at {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            defmt::$level!($s $(, $x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($(&$x),*);
        }
    };
}

macro_rules! error {
    ($($t:tt)*) => { $crate::util::log_at!(error, $($t)*) };
}

macro_rules! warn_ {
    ($($t:tt)*) => { $crate::util::log_at!(warn, $($t)*) };
}

macro_rules! info {
    ($($t:tt)*) => { $crate::util::log_at!(info, $($t)*) };
}

macro_rules! debug {
    ($($t:tt)*) => { $crate::util::log_at!(debug, $($t)*) };
}

// Reached from the interrupt path; free when the feature is off.
macro_rules! trace {
    ($($t:tt)*) => { $crate::util::log_at!(trace, $($t)*) };
}

pub(crate) use {debug, error, info, log_at, trace, warn_ as warn};
