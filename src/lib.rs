//! Process Containers: lifecycle, telemetry and discovery of LXC system
//! containers.
//!
//! This library wraps runtime-side container objects in reference-counted
//! [`container::ContainerHandle`]s, reads their cgroup accounting counters,
//! and discovers them across search paths through the process-wide
//! [`admin::ContainerAdministrator`].

pub mod admin;
pub mod container;
pub mod error;
pub mod fsutil;
pub mod runtime;
pub mod settings;
pub mod telemetry;

use admin::ContainerAdministrator;
use container::RefCounted;
use settings::{Action, Invocation, Settings};

/// Runs the `process-containers` command line tool.
///
/// Resolves the container named on the command line through the shared
/// administrator and performs the requested action, printing JSON documents
/// or raw text to stdout.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid `PROCON_*` environment variables or command line arguments.
/// - The container not being defined under any search path.
/// - The requested start or stop failing.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    let invocation = Invocation::parse(std::env::args().skip(1))?;
    log::debug!("Settings: {:?}", settings);

    let admin = ContainerAdministrator::instance();
    admin.logging(&settings.log_path, &invocation.name, &settings.log_level);

    let container = admin
        .container(
            &invocation.name,
            &settings.search_paths,
            &settings.log_path,
            &settings.container_config,
        )
        .ok_or_else(|| {
            format!(
                "container `{}` not found in {:?}",
                invocation.name, settings.search_paths
            )
        })?;

    match invocation.action {
        Action::Info => {
            println!("{}", serde_json::to_string_pretty(&container.report())?);
        }
        Action::Start { command, args } => {
            if !container.start(&command, &args) {
                return Err(format!("failed to start container `{}`", container.id()).into());
            }
            println!("{}", container.pid());
        }
        Action::Stop => {
            if !container.stop(settings.stop_timeout_ms) {
                return Err(format!("failed to stop container `{}`", container.id()).into());
            }
        }
        Action::Log => print!("{}", container.log()),
        Action::Config => print!("{}", container.configuration()),
    }

    container.release();
    Ok(())
}
