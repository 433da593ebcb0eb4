use std::sync::Arc;

use crate::container::ContainerHandle;

/// Restartable, read-only sequence over the containers registered at the time
/// it was created.
///
/// Registrations made after creation are not seen. The snapshot keeps its
/// handles alive until it is dropped.
#[derive(Debug, Clone, Default)]
pub struct ContainerIterator {
    containers: Vec<Arc<ContainerHandle>>,
    position: usize,
}

impl ContainerIterator {
    pub(crate) fn new(containers: Vec<Arc<ContainerHandle>>) -> Self {
        Self {
            containers,
            position: 0,
        }
    }

    /// Restarts the sequence from its first container.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Number of containers in the snapshot, regardless of position.
    pub fn total(&self) -> usize {
        self.containers.len()
    }

    /// The container most recently returned by `next`.
    pub fn current(&self) -> Option<&Arc<ContainerHandle>> {
        self.position
            .checked_sub(1)
            .and_then(|index| self.containers.get(index))
    }
}

impl Iterator for ContainerIterator {
    type Item = Arc<ContainerHandle>;

    fn next(&mut self) -> Option<Self::Item> {
        let container = self.containers.get(self.position).cloned()?;
        self.position += 1;
        Some(container)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.containers.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ContainerIterator {}
