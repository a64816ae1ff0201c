#![allow(unused_macros)]

macro_rules! trace {
    ($($t:tt)*) => {
        emit!(trace, $($t)*)
    }
}

macro_rules! debug {
    ($($t:tt)*) => {
        emit!(debug, $($t)*)
    }
}

macro_rules! info {
    ($($t:tt)*) => {
        emit!(info, $($t)*)
    }
}

macro_rules! warn {
    ($($t:tt)*) => {
        emit!(warn, $($t)*)
    }
}

macro_rules! error {
    ($($t:tt)*) => {
        emit!(error, $($t)*)
    }
}

macro_rules! emit {
    ($level: ident, $($t:tt)*) => {{
        #[cfg(feature = "tracing")]
        tracing::$level!(target: "rscdm", $($t)*);
        #[cfg(not(feature = "tracing"))]
        if false {
            let _ = format!($($t)*);
        }
    }};
}
