//! Classification of calculation results into array layouts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::XcFeatError;

/// Enumerated type for the six array layouts of calculation results that can be normalised.
///
/// The layout is determined once from the rank and shape of the density matrix together with the
/// periodicity of the system, and then drives every extraction step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalculationLayout {
    /// Spin-restricted, open boundary conditions. Density matrix `(nao, nao)`.
    RestrictedOpen,

    /// Spin-unrestricted, open boundary conditions. Density matrix `(2, nao, nao)`.
    UnrestrictedOpen,

    /// Spin-restricted, periodic, full Brillouin-zone sampling. Density matrix
    /// `(nk, nao, nao)` with `nk > 1`.
    RestrictedFullBz,

    /// Spin-unrestricted, periodic, full Brillouin-zone sampling. Density matrix
    /// `(2, nk, nao, nao)` with `nk > 1`.
    UnrestrictedFullBz,

    /// Spin-restricted, periodic, gamma point only. Density matrix `(1, nao, nao)`.
    RestrictedGamma,

    /// Spin-unrestricted, periodic, gamma point only. Density matrix `(2, 1, nao, nao)`.
    UnrestrictedGamma,
}

impl CalculationLayout {
    /// Classifies a calculation result.
    ///
    /// # Arguments
    ///
    /// * `dm_shape` - The shape of the density matrix returned by the engine.
    /// * `periodic` - A boolean indicating if the system is periodic.
    ///
    /// # Errors
    ///
    /// Returns [`XcFeatError::UnsupportedLayout`] for any rank/periodicity combination outside
    /// the six recognised layouts.
    pub fn classify(dm_shape: &[usize], periodic: bool) -> Result<Self, XcFeatError> {
        let square = dm_shape.len() >= 2
            && dm_shape[dm_shape.len() - 1] == dm_shape[dm_shape.len() - 2];
        let layout = match (dm_shape.len(), periodic) {
            (2, false) => Some(Self::RestrictedOpen),
            (3, false) if dm_shape[0] == 2 => Some(Self::UnrestrictedOpen),
            (3, true) if dm_shape[0] == 1 => Some(Self::RestrictedGamma),
            (3, true) if dm_shape[0] > 1 => Some(Self::RestrictedFullBz),
            (4, true) if dm_shape[0] == 2 && dm_shape[1] == 1 => Some(Self::UnrestrictedGamma),
            (4, true) if dm_shape[0] == 2 && dm_shape[1] > 1 => Some(Self::UnrestrictedFullBz),
            _ => None,
        };
        match layout {
            Some(layout) if square => Ok(layout),
            _ => Err(XcFeatError::UnsupportedLayout(format!(
                "density matrix of shape {dm_shape:?} for a {} system matches no known layout",
                if periodic { "periodic" } else { "non-periodic" }
            ))),
        }
    }

    /// Returns `true` if the layout is spin-restricted.
    pub fn is_restricted(&self) -> bool {
        matches!(
            self,
            Self::RestrictedOpen | Self::RestrictedFullBz | Self::RestrictedGamma
        )
    }

    /// Returns `true` if the layout is periodic.
    pub fn is_periodic(&self) -> bool {
        !matches!(self, Self::RestrictedOpen | Self::UnrestrictedOpen)
    }

    /// Returns `true` if the layout samples the full Brillouin zone.
    pub fn is_full_bz(&self) -> bool {
        matches!(self, Self::RestrictedFullBz | Self::UnrestrictedFullBz)
    }

    /// Returns `true` if the layout is periodic with the gamma point only.
    pub fn is_gamma(&self) -> bool {
        matches!(self, Self::RestrictedGamma | Self::UnrestrictedGamma)
    }

    /// Returns the axis enumerating derivative components in basis-function values from the
    /// engine.
    pub(crate) fn component_axis(&self) -> usize {
        if self.is_periodic() {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for CalculationLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc = match self {
            Self::RestrictedOpen => "restricted, open boundary",
            Self::UnrestrictedOpen => "unrestricted, open boundary",
            Self::RestrictedFullBz => "restricted, periodic (full Brillouin zone)",
            Self::UnrestrictedFullBz => "unrestricted, periodic (full Brillouin zone)",
            Self::RestrictedGamma => "restricted, periodic (gamma point)",
            Self::UnrestrictedGamma => "unrestricted, periodic (gamma point)",
        };
        write!(f, "{desc}")
    }
}
