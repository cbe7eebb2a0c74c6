// Internal macros for logging. These compile to nothing unless the
// 'logging' feature is enabled.

macro_rules! debug {
    ($($tt:tt)*) => {
        #[cfg(feature = "logging")]
        {
            log::debug!($($tt)*);
        }
    }
}

macro_rules! trace {
    ($($tt:tt)*) => {
        #[cfg(feature = "logging")]
        {
            log::trace!($($tt)*);
        }
    }
}
