use crate::config::AppConfig;
use std::fs::OpenOptions;
use std::io;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once. With `--log-file` the node writes
/// JSON lines there; otherwise compact text goes to stderr so stdout stays
/// free for monitor events.
pub fn init_tracing(config: &AppConfig) {
    if config.no_logs {
        return;
    }
    let level = config.log_level.as_tracing();

    let _ = TRACING_INIT.get_or_init(|| {
        if let Some(path) = &config.log_file {
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("failed to open log file {}: {err}", path.display());
                    return;
                }
            };
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_max_level(level)
                .with_writer(file)
                .with_current_span(false)
                .with_span_list(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        } else {
            let subscriber = tracing_subscriber::fmt()
                .compact()
                .with_timer(UtcTime::rfc_3339())
                .with_max_level(level)
                .with_target(false)
                .with_writer(io::stderr)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    });
}
