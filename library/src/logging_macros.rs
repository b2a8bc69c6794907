// Wrappers around crate::log's logging functions that prepend "[mmdb]" to the log message.
//
// See https://stackoverflow.com/questions/67087597/is-it-possible-to-use-rusts-log-info-for-tests
// for the rationale behind the use of the #[cfg(test)] attribute.

#[cfg(test)]
#[macro_export]
macro_rules! mmdb_info {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        println!(concat!("[mmdb] ", $fmt), $($($arg)*)?)
    };
}

#[cfg(not(test))]
#[macro_export]
macro_rules! mmdb_info {
    // mmdb_info!("a {} event", "log")
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::info!(concat!("[mmdb] ", $fmt), $($($arg)*)?)
    };
}

#[cfg(test)]
#[macro_export]
macro_rules! mmdb_debug {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        println!(concat!("[mmdb] ", $fmt), $($($arg)*)?)
    };
}

#[cfg(not(test))]
#[macro_export]
macro_rules! mmdb_debug {
    // mmdb_debug!("a {} event", "log")
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::debug!(concat!("[mmdb] ", $fmt), $($($arg)*)?)
    };
}

#[cfg(test)]
#[macro_export]
macro_rules! mmdb_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        println!(concat!("[mmdb] ", $fmt), $($($arg)*)?)
    };
}

#[cfg(not(test))]
#[macro_export]
macro_rules! mmdb_warn {
    // mmdb_warn!("a {} event", "log")
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::warn!(concat!("[mmdb] ", $fmt), $($($arg)*)?)
    };
}

#[cfg(test)]
#[macro_export]
macro_rules! mmdb_error {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        println!(concat!("[mmdb] ", $fmt), $($($arg)*)?)
    };
}

#[cfg(not(test))]
#[macro_export]
macro_rules! mmdb_error {
    // mmdb_error!("a {} event", "log")
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::error!(concat!("[mmdb] ", $fmt), $($($arg)*)?)
    };
}
