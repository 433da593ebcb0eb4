//! Resource telemetry read from a container's cgroup accounting counters.
//!
//! Each counter is copied by the runtime into a bounded, fixed-size buffer. A
//! read only counts when it produced at least one byte and fewer bytes than the
//! buffer holds; anything else may be truncated and is discarded.
//!
//! Reads never fail as a whole. A counter that cannot be read or parsed leaves
//! its field unset, logs a warning, and the remaining fields are still filled.
//!
//! # Counters
//!
//! - `memory.usage_in_bytes` and `memory.kmem.tcp.usage_in_bytes` for [`MemoryInfo`]
//! - `cpuacct.usage` and `cpuacct.usage_percpu` for [`CpuInfo`]

mod error;
pub mod parser;

pub use error::StatParseError;

use serde::Serialize;

use crate::error::ResultOkLogExt;
use crate::runtime::RuntimeContainer;

pub const MEMORY_USAGE: &str = "memory.usage_in_bytes";
pub const MEMORY_KERNEL_TCP_USAGE: &str = "memory.kmem.tcp.usage_in_bytes";
pub const CPU_USAGE: &str = "cpuacct.usage";
pub const CPU_USAGE_PER_CORE: &str = "cpuacct.usage_percpu";

const MEMORY_BUFFER_SIZE: usize = 256;
const CPU_BUFFER_SIZE: usize = 512;

/// Memory usage of a container, in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// TCP buffer memory charged to the kernel on behalf of the container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<u64>,
}

/// CPU time consumed by a container, in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CpuInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Usage per core, indexed by core number.
    pub percpu: Vec<u64>,
}

/// Reads the memory counters of `container`.
pub fn read_memory(container: &dyn RuntimeContainer) -> MemoryInfo {
    let mut buf = [0u8; MEMORY_BUFFER_SIZE];

    let total = read_counter(container, MEMORY_USAGE, &mut buf)
        .and_then(|raw| parse_counter(MEMORY_USAGE, raw))
        .ok_warn();
    if total.is_none() {
        log::warn!("Could not read memory usage of container {}", container.name());
    }

    let kernel = read_counter(container, MEMORY_KERNEL_TCP_USAGE, &mut buf)
        .and_then(|raw| parse_counter(MEMORY_KERNEL_TCP_USAGE, raw))
        .ok_warn();
    if kernel.is_none() {
        log::warn!(
            "Could not read kernel memory usage of container {}",
            container.name()
        );
    }

    MemoryInfo { total, kernel }
}

/// Reads the CPU counters of `container`.
pub fn read_cpu(container: &dyn RuntimeContainer) -> CpuInfo {
    let mut buf = [0u8; CPU_BUFFER_SIZE];

    let total = read_counter(container, CPU_USAGE, &mut buf)
        .and_then(|raw| parse_counter(CPU_USAGE, raw))
        .ok_warn();
    if total.is_none() {
        log::warn!("Could not read total cpu usage of container {}", container.name());
    }

    let percpu = match read_counter(container, CPU_USAGE_PER_CORE, &mut buf).ok_warn() {
        Some(raw) => parser::parse_u64_list(raw),
        None => {
            log::warn!(
                "Could not read per core cpu usage of container {}",
                container.name()
            );
            Vec::new()
        }
    };

    CpuInfo { total, percpu }
}

/// Copies counter `key` into `buf` and returns the bytes read.
///
/// # Errors
///
/// - [`StatParseError::Runtime`] if the runtime could not read the counter.
/// - [`StatParseError::Empty`] if the counter produced no bytes.
/// - [`StatParseError::Truncated`] if the counter filled or overflowed `buf`.
pub fn read_counter<'a>(
    container: &dyn RuntimeContainer,
    key: &str,
    buf: &'a mut [u8],
) -> Result<&'a [u8], StatParseError> {
    let len = container
        .cgroup_item(key, buf)
        .map_err(|source| StatParseError::Runtime {
            key: key.to_owned(),
            source,
        })?;

    if len == 0 {
        return Err(StatParseError::Empty {
            key: key.to_owned(),
        });
    }
    if len >= buf.len() {
        return Err(StatParseError::Truncated {
            key: key.to_owned(),
            len,
            capacity: buf.len(),
        });
    }

    Ok(&buf[..len])
}

fn parse_counter(key: &str, raw: &[u8]) -> Result<u64, StatParseError> {
    parser::parse_u64_prefix(raw)
        .map(|(value, _)| value)
        .ok_or_else(|| StatParseError::InvalidValue {
            key: key.to_owned(),
            value: String::from_utf8_lossy(raw).trim().to_owned(),
        })
}
