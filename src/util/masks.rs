// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vision masks: which token spans attend to an image embedding.
//!
//! Image placeholders in a tokenized multimodal prompt are marked by a
//! sentinel token id.  Each sentinel opens a half-open region
//! `[start, end)` that runs up to the next sentinel, and the last one runs
//! to the end of the sequence.  Runs of adjacent sentinels (several tiles
//! of one image) are widened so that every sentinel in the run covers the
//! text following the run.
//!
//! # Example
//!
//! ```
//! use candle_mm_encode::{VisionMaskBuilder, VisionRegion};
//!
//! let mask = VisionMaskBuilder::new(5).build(&[5, 1, 2, 5, 3]);
//! assert_eq!(
//!     mask.regions(),
//!     &[VisionRegion::new(0, 3), VisionRegion::new(3, 5)]
//! );
//! ```

use std::fmt;

use candle_core::{DType, Device, Tensor};

use crate::error::{MMError, Result};
use crate::util::positioning::positions_of;

// ---------------------------------------------------------------------------
// VisionRegion
// ---------------------------------------------------------------------------

/// Half-open token range `[start, end)` attending to one vision embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisionRegion {
    /// Position of the vision token opening the region.
    pub start: usize,
    /// Exclusive end position.
    pub end: usize,
}

impl VisionRegion {
    /// Create a region from its bounds.
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of tokens covered.
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the region covers no tokens.
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `pos` lies inside the region.
    pub const fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos < self.end
    }
}

impl fmt::Display for VisionRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// VisionMask
// ---------------------------------------------------------------------------

/// Ordered list of [`VisionRegion`]s over one token sequence.
///
/// Regions are ordered by strictly increasing `start`.  When adjacent
/// vision tokens are merged, the widened region overlaps the regions of
/// the tokens it absorbed; those are kept as they are.  Use
/// [`deduplicated`](Self::deduplicated) for a non-overlapping view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisionMask {
    regions: Vec<VisionRegion>,
}

impl VisionMask {
    /// The regions, in order of increasing start.
    pub fn regions(&self) -> &[VisionRegion] {
        &self.regions
    }

    /// Number of regions.
    pub const fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the sequence had no vision token.
    pub const fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Iterate over the regions.
    pub fn iter(&self) -> std::slice::Iter<'_, VisionRegion> {
        self.regions.iter()
    }

    /// Regions as `(start, end)` pairs.
    pub fn as_pairs(&self) -> Vec<(usize, usize)> {
        self.regions.iter().map(|r| (r.start, r.end)).collect()
    }

    /// Drop regions that start inside an earlier (widened) region.
    ///
    /// For `[(0, 4), (1, 4)]` this yields `[(0, 4)]`.  Masks without
    /// adjacent vision tokens are returned unchanged.
    #[must_use]
    pub fn deduplicated(&self) -> Self {
        let mut regions: Vec<VisionRegion> = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            if regions.last().is_some_and(|prev| prev.contains(region.start)) {
                continue;
            }
            regions.push(*region);
        }
        Self { regions }
    }

    /// Export as an `i64` tensor of shape `[num_regions, 2]`.
    ///
    /// An empty mask exports as shape `[0, 2]`.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Sample`] if a bound does not fit in `i64`, and
    /// [`MMError::Tensor`] if tensor construction fails.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        let mut flat = Vec::with_capacity(self.regions.len() * 2);
        for region in &self.regions {
            flat.push(to_i64(region.start)?);
            flat.push(to_i64(region.end)?);
        }
        Ok(Tensor::from_vec(flat, (self.regions.len(), 2), device)?)
    }

    /// Rebuild a mask from a `[num_regions, 2]` integer tensor.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Sample`] if the tensor is not an integer `[k, 2]`
    /// tensor or holds a negative or inverted bound, and [`MMError::Tensor`]
    /// on conversion failure.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        if !tensor.dtype().is_int() {
            return Err(MMError::Sample(format!(
                "vision mask tensor must hold integers, got {:?}",
                tensor.dtype()
            )));
        }
        let dims = tensor.dims();
        if dims.len() != 2 || dims.get(1) != Some(&2) {
            return Err(MMError::Sample(format!(
                "vision mask tensor must have shape [k, 2], got {dims:?}"
            )));
        }
        let rows = tensor.to_dtype(DType::I64)?.to_vec2::<i64>()?;
        let regions = rows
            .iter()
            .map(|row| match row.as_slice() {
                [start, end] => {
                    let region = VisionRegion::new(to_usize(*start)?, to_usize(*end)?);
                    if region.is_empty() {
                        return Err(MMError::Sample(format!("empty vision region {region}")));
                    }
                    Ok(region)
                }
                _ => Err(MMError::Sample("vision mask row must have 2 entries".into())),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { regions })
    }
}

impl<'a> IntoIterator for &'a VisionMask {
    type Item = &'a VisionRegion;
    type IntoIter = std::slice::Iter<'a, VisionRegion>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| MMError::Sample(format!("position {value} overflows i64")))
}

fn to_usize(value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| MMError::Sample(format!("invalid vision mask bound {value}")))
}

// ---------------------------------------------------------------------------
// VisionMaskBuilder
// ---------------------------------------------------------------------------

/// Builds [`VisionMask`]s for a fixed vision sentinel token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisionMaskBuilder {
    vision_token_id: u32,
}

impl VisionMaskBuilder {
    /// Create a builder for the given vision token id.
    pub const fn new(vision_token_id: u32) -> Self {
        Self { vision_token_id }
    }

    /// The sentinel this builder looks for.
    pub const fn vision_token_id(&self) -> u32 {
        self.vision_token_id
    }

    /// Compute the vision regions of `tokens`.
    ///
    /// Total over all inputs: a sequence without the sentinel yields an
    /// empty mask.
    pub fn build(&self, tokens: &[u32]) -> VisionMask {
        let positions = positions_of(tokens, self.vision_token_id);
        let Some(&last) = positions.last() else {
            return VisionMask::default();
        };

        let mut regions: Vec<VisionRegion> = positions
            .iter()
            .zip(positions.iter().skip(1))
            .map(|(&start, &end)| VisionRegion::new(start, end))
            .collect();
        regions.push(VisionRegion::new(last, tokens.len()));

        // A one-token region is a vision token directly followed by another:
        // it inherits the end of the region after it.
        let mut last_end = tokens.len();
        for region in regions.iter_mut().rev() {
            if region.len() == 1 {
                region.end = last_end;
            }
            last_end = region.end;
        }

        VisionMask { regions }
    }
}

/// Convenience wrapper for [`VisionMaskBuilder::build`].
pub fn build_vision_mask(tokens: &[u32], vision_token_id: u32) -> VisionMask {
    VisionMaskBuilder::new(vision_token_id).build(tokens)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
