use std::io::Write;

/// Install the process-wide logger. Level defaults to `info`, overridable
/// through `RUST_LOG`. Safe to call more than once; later calls are no-ops so
/// tests can each ask for logging.
pub fn init_log() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "{style}[{} {}]{style:#} {}",
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .try_init();
}
