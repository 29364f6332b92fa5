// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device profile consumed once when a store is built.

use serde::{Deserialize, Serialize};

/// What the host device looks like, as far as batch sizing cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// The host is a phone or tablet class device.
    pub is_mobile: bool,
    /// Reported device memory in GB, when the platform exposes it.
    pub device_memory_gb: Option<f64>,
}

impl DeviceProfile {
    /// A desktop with no memory figure.
    pub fn desktop() -> Self {
        Self::default()
    }

    /// A mobile device, optionally with its memory in GB.
    pub fn mobile(device_memory_gb: Option<f64>) -> Self {
        Self {
            is_mobile: true,
            device_memory_gb,
        }
    }

    /// Attach a memory figure.
    pub fn with_memory_gb(mut self, gb: f64) -> Self {
        self.device_memory_gb = Some(gb);
        self
    }

    /// True when the reported memory is at or below `threshold_gb`.
    ///
    /// A device that reports nothing is never low-memory.
    pub fn is_low_memory(&self, threshold_gb: f64) -> bool {
        matches!(self.device_memory_gb, Some(gb) if gb <= threshold_gb)
    }
}
