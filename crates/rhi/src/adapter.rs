//! Adapter selection.
//!
//! Walks the adapters an [`Instance`] reports, in enumeration order, and
//! keeps the first hardware adapter that accepts a device at the requested
//! feature level. Software adapters are skipped without ever creating a
//! device on them.

use tracing::{debug, info, warn};

use crate::backend::{Adapter, Instance};
use crate::error::{RhiError, RhiResult};
use crate::types::{AdapterInfo, FeatureLevel};

/// The chosen adapter together with the device created on it.
pub struct AdapterSelection<A: Adapter> {
    pub adapter: A,
    pub info: AdapterInfo,
    pub device: A::Device,
}

/// Selects the first capable hardware adapter.
///
/// # Errors
///
/// Returns [`RhiError::NoCapableAdapter`] if no hardware adapter accepts a
/// device at `min_level`. Errors from enumeration itself propagate.
pub fn select_adapter<I: Instance>(
    instance: &I,
    min_level: FeatureLevel,
) -> RhiResult<AdapterSelection<I::Adapter>> {
    let adapters = instance.enumerate_adapters()?;

    if adapters.is_empty() {
        warn!("No adapters enumerated");
        return Err(RhiError::NoCapableAdapter(min_level));
    }

    info!("Found {} adapter(s)", adapters.len());

    for adapter in adapters {
        let info = adapter.info();

        if info.is_software {
            debug!("Adapter '{}' skipped: software adapter", info.name);
            continue;
        }

        match adapter.create_device(min_level) {
            Ok(device) => {
                info!(
                    "Selected adapter '{}' (feature level {}, vendor {:#06x}, device {:#06x})",
                    info.name, info.feature_level, info.vendor_id, info.device_id
                );
                return Ok(AdapterSelection {
                    adapter,
                    info,
                    device,
                });
            }
            Err(e) => {
                debug!("Adapter '{}' rejected: {}", info.name, e);
            }
        }
    }

    warn!("No hardware adapter supports feature level {}", min_level);
    Err(RhiError::NoCapableAdapter(min_level))
}
