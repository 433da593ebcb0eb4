/// Entry point for the `process-containers` tool.
///
/// Looks up an LXC container across the configured search paths and reports
/// on it, starts or stops it, or prints its log or configuration.
///
/// # Errors
///
/// Returns an error if the settings are invalid, the container cannot be
/// found, or the requested action fails.
///
/// # Examples
///
/// ```bash
/// PROCON_SEARCH_PATHS=/var/lib/lxc RUST_LOG=trace cargo run -- web info
/// ```
fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    process_containers::run()
}
