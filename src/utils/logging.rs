//! Logging setup for executables embedding the engine

/// Initialize the logger for terminal use.
///
/// INFO by default; `RUST_LOG` overrides the level. The leading carriage
/// return keeps lines aligned while the demo reads raw stdin. Safe to call
/// more than once (later calls are ignored).
pub fn init_logger() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "\r[{} {:5} {}] {}",
                buf.timestamp(),
                record.level(),
                record.module_path().unwrap_or("bowlsynth"),
                record.args()
            )
        })
        .try_init();
}
