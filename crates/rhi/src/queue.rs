//! The three execution queues of a device.

use tracing::{debug, info};

use crate::backend::Device;
use crate::error::{RhiError, RhiResult};
use crate::types::QueueKind;

/// Graphics, compute and copy queues created together.
///
/// Construction is all-or-nothing: if any queue fails, the ones already
/// created are dropped and the error names the failing kind.
pub struct CommandQueueSet<Q> {
    graphics: Q,
    compute: Q,
    copy: Q,
}

impl<Q> CommandQueueSet<Q> {
    /// Creates one queue of each kind on `device`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::QueueCreationFailed`] for the first queue the
    /// device refuses.
    pub fn new<D>(device: &D) -> RhiResult<Self>
    where
        D: Device<Queue = Q>,
    {
        let graphics = create(device, QueueKind::Graphics)?;
        let compute = create(device, QueueKind::Compute)?;
        let copy = create(device, QueueKind::Copy)?;

        info!("Command queues created (graphics, compute, copy)");

        Ok(Self {
            graphics,
            compute,
            copy,
        })
    }

    #[inline]
    pub fn graphics(&self) -> &Q {
        &self.graphics
    }

    #[inline]
    pub fn compute(&self) -> &Q {
        &self.compute
    }

    #[inline]
    pub fn copy(&self) -> &Q {
        &self.copy
    }

    /// Returns the queue of the given kind.
    pub fn get(&self, kind: QueueKind) -> &Q {
        match kind {
            QueueKind::Graphics => &self.graphics,
            QueueKind::Compute => &self.compute,
            QueueKind::Copy => &self.copy,
        }
    }

    /// Iterates the queues in graphics, compute, copy order.
    pub fn iter(&self) -> impl Iterator<Item = (QueueKind, &Q)> {
        QueueKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

fn create<D: Device>(device: &D, kind: QueueKind) -> RhiResult<D::Queue> {
    let queue = device
        .create_queue(kind)
        .map_err(|e| match e {
            RhiError::DeviceLost => RhiError::DeviceLost,
            other => RhiError::QueueCreationFailed {
                kind,
                reason: other.to_string(),
            },
        })?;
    debug!("Created {} queue", kind);
    Ok(queue)
}
