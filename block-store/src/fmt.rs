//! Log/defmt shim, lifted from the embassy-rs convention used throughout the
//! `embedded-fatfs` family of crates. MUST be the first module listed so the
//! macros below are in scope for every other module in the crate.

#![allow(unused)]

#[cfg(all(feature = "defmt", feature = "log"))]
compile_error!("You may not enable both `defmt` and `log` features.");

#[cfg(feature = "log")]
macro_rules! trace {
    ($($x:tt)*) => { ::log::trace!($($x)*) };
}
#[cfg(feature = "defmt")]
macro_rules! trace {
    ($($x:tt)*) => { ::defmt::trace!($($x)*) };
}
#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! trace {
    ($($x:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($x:tt)*) => { ::log::debug!($($x)*) };
}
#[cfg(feature = "defmt")]
macro_rules! debug {
    ($($x:tt)*) => { ::defmt::debug!($($x)*) };
}
#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! debug {
    ($($x:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($x:tt)*) => { ::log::warn!($($x)*) };
}
#[cfg(feature = "defmt")]
macro_rules! warn {
    ($($x:tt)*) => { ::defmt::warn!($($x)*) };
}
#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! warn {
    ($($x:tt)*) => {};
}

pub(crate) use {debug, trace, warn};
