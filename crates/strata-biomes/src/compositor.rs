//! Layered mask compositing.
//!
//! Turns an ordered stack of raw influence rasters into per-layer coverage
//! masks under one of two blending laws:
//!
//! - [`blend_back_to_front`]: each layer takes its share of whatever the
//!   layers before it left uncovered.
//! - [`normalize_simultaneous`]: all layers are rescaled together so their
//!   per-cell sum never exceeds one, with no ordering bias.

use std::sync::Arc;

use strata_raster::Raster;

/// Which law [`composite`] blends with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendLaw {
    BackToFront,
    Simultaneous,
}

/// Settings for one [`composite`] call.
#[derive(Clone, Copy, Debug)]
pub struct CompositeOptions<'a> {
    pub law: BlendLaw,
    /// Force layer 0 to full coverage so it claims everything the other
    /// layers leave over.
    pub base_layer: bool,
    /// Coverage inherited from an enclosing biome, if any.
    pub parent: Option<&'a Raster>,
}

/// Composites raw per-layer rasters into coverage masks.
///
/// Missing rasters count as uniform `1.0` of the given `shape`. The result
/// holds one mask per input, in input order, each already multiplied by the
/// parent mask when there is one.
pub fn composite(
    shape: (usize, usize),
    layers: Vec<Option<Arc<Raster>>>,
    opacities: &[f32],
    options: CompositeOptions<'_>,
) -> Vec<Raster> {
    debug_assert_eq!(layers.len(), opacities.len());
    let (width, height) = shape;

    let mut masks: Vec<Raster> = layers
        .into_iter()
        .map(|raw| match raw {
            Some(raster) => Arc::unwrap_or_clone(raster),
            None => Raster::filled(width, height, 1.0),
        })
        .collect();

    let mut opacities = opacities.to_vec();
    if options.base_layer
        && let Some(base) = masks.first_mut()
    {
        base.fill(1.0);
        opacities[0] = 1.0;
    }

    match options.law {
        BlendLaw::BackToFront => blend_back_to_front(&mut masks, &opacities),
        BlendLaw::Simultaneous => {
            for (mask, &opacity) in masks.iter_mut().zip(&opacities) {
                if opacity < 1.0 {
                    mask.scale(opacity.max(0.0));
                }
            }
            normalize_simultaneous(&mut masks);
        }
    }

    if let Some(parent) = options.parent {
        for mask in &mut masks {
            mask.multiply(parent);
        }
    }
    masks
}

/// Back-to-front blending.
///
/// Visible weight of layer `i` is
/// `opacity_i * mask_i * max(0, 1 - sum(opacity_j * mask_j for j < i))`.
/// Layers only ever claim from the raw weights beneath them, so the per-cell
/// sum of visible weights never exceeds one.
pub fn blend_back_to_front(masks: &mut [Raster], opacities: &[f32]) {
    let Some(cells) = masks.first().map(Raster::len) else {
        return;
    };

    for cell in 0..cells {
        let mut claimed = 0.0_f32;
        for (mask, &opacity) in masks.iter_mut().zip(opacities) {
            let slot = &mut mask.as_mut_slice()[cell];
            let weight = (*slot * opacity).clamp(0.0, 1.0);
            *slot = weight * (1.0 - claimed).max(0.0);
            claimed += weight;
        }
    }
}

/// Simultaneous normalization.
///
/// Divides every mask by `max(1, sum)` per cell, so no value exceeds one and
/// the sum of all masks does not exceed one.
pub fn normalize_simultaneous(masks: &mut [Raster]) {
    let Some(cells) = masks.first().map(Raster::len) else {
        return;
    };

    for cell in 0..cells {
        let sum: f32 = masks.iter().map(|m| m.as_slice()[cell].max(0.0)).sum();
        let divisor = sum.max(1.0);
        for mask in masks.iter_mut() {
            let slot = &mut mask.as_mut_slice()[cell];
            *slot = slot.max(0.0) / divisor;
        }
    }
}
