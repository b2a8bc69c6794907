use std::sync::Once;

/// Installs `simple_logger` (which writes to stdout) at Info level.
/// Embedders that already run their own `log` implementation should skip
/// this; only the first call does anything.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let init_result = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Info)
            .init();
        match init_result {
            Ok(_) => mmdb_debug!("Logging initialized"),
            // Another logger was installed first, keep using it.
            Err(e) => mmdb_error!("Failed to initialize logging: {}", e),
        }
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_logging_twice_is_a_no_op() {
        super::init_logging();
        super::init_logging();
    }

    #[test]
    fn error_macro_accepts_format_args() {
        mmdb_error!("Failed to initialize logging: {}", "logger already set");
        mmdb_error!("no arguments");
    }
}
