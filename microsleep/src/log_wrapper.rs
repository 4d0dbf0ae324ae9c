//! Logging macros that forward to `log` or `defmt`, whichever feature is enabled.
//!
//! With neither feature the calls compile to nothing, keeping the interrupt path free of formatting.

#[macro_export]
macro_rules! dispatch_log {
    ( $level:ident, $( $arg:expr ),+ ) => {
        {
            #[cfg(feature = "log")]
            log::$level!( $( $arg ),+ );
            #[cfg(feature = "defmt")]
            defmt::$level!( $( $arg ),+ );
        }
    };
}

#[macro_export]
macro_rules! info {
    ( $( $arg:expr ),+ ) => { $crate::dispatch_log!(info, $( $arg ),+ ) };
}

#[macro_export]
macro_rules! debug {
    ( $( $arg:expr ),+ ) => { $crate::dispatch_log!(debug, $( $arg ),+ ) };
}

#[macro_export]
macro_rules! trace {
    ( $( $arg:expr ),+ ) => { $crate::dispatch_log!(trace, $( $arg ),+ ) };
}
