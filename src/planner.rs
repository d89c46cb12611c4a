//! Resolution planner (spec §4.6, C6).

use crate::schema::CoverageMeta;

/// One `(x_res, y_res)` row at a given level/denominator, as read from
/// `X_levels` or `X_section_levels`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelResolutions {
    pub pyramid_level: u32,
    /// `[1, 2, 4, 8]`-denominator resolutions, in that order.
    pub x_res: [f64; 4],
    pub y_res: [f64; 4],
}

const DENOMS: [u32; 4] = [1, 2, 4, 8];

/// `(pyramid_level, scale_denom, real_scale, xx_res, yy_res)` — the chosen
/// candidate and the resolution the output grid will actually receive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionPlan {
    pub pyramid_level: u32,
    pub scale_denom: u32,
    pub real_scale: f64,
    pub xx_res: f64,
    pub yy_res: f64,
}

/// Real scale = `2^(level · log2(16)) · denom = 16^level · denom` (spec GLOSSARY).
fn real_scale(level: u32, denom: u32) -> f64 {
    16f64.powi(level as i32) * denom as f64
}

/// Plan a read at `(x_req, y_req)` over the rows available (spec §4.6).
///
/// Enumerates `(level, denom)` deepest-level-first, largest-denominator-first
/// (coarsest candidate first), returning the finest admissible one — the
/// smallest `real_scale` among candidates where both axes are no coarser than
/// requested. Falls back to the base-level scale-1 candidate (which is always
/// present in `levels`) when the request is finer than the base on some axis.
pub fn plan(levels: &[LevelResolutions], x_req: f64, y_req: f64) -> Option<ResolutionPlan> {
    if levels.is_empty() {
        return None;
    }
    let mut sorted: Vec<&LevelResolutions> = levels.iter().collect();
    sorted.sort_by(|a, b| b.pyramid_level.cmp(&a.pyramid_level));

    let mut best: Option<ResolutionPlan> = None;
    for lv in &sorted {
        for (i, &denom) in DENOMS.iter().enumerate().rev() {
            let x_res = lv.x_res[i];
            let y_res = lv.y_res[i];
            if x_res <= x_req && y_res <= y_req {
                let scale = real_scale(lv.pyramid_level, denom);
                let candidate = ResolutionPlan {
                    pyramid_level: lv.pyramid_level,
                    scale_denom: denom,
                    real_scale: scale,
                    xx_res: x_res,
                    yy_res: y_res,
                };
                best = Some(match best {
                    Some(b) if b.real_scale <= scale => b,
                    _ => candidate,
                });
            }
        }
    }

    if best.is_some() {
        return best;
    }

    // No admissible candidate: request is finer than the base level on at
    // least one axis. Fall back to base-level scale 1.
    let base = levels.iter().find(|l| l.pyramid_level == 0)?;
    Some(ResolutionPlan {
        pyramid_level: 0,
        scale_denom: 1,
        real_scale: real_scale(0, 1),
        xx_res: base.x_res[0],
        yy_res: base.y_res[0],
    })
}

/// Derive the eight `X_res_1_{1,2,4,8}` columns for a new level row from its
/// base (denom-1) resolution, the layout spec §3 "Level" describes.
pub fn derive_level_resolutions(pyramid_level: u32, base_x_res: f64, base_y_res: f64) -> LevelResolutions {
    LevelResolutions {
        pyramid_level,
        x_res: [base_x_res, base_x_res * 2.0, base_x_res * 4.0, base_x_res * 8.0],
        y_res: [base_y_res, base_y_res * 2.0, base_y_res * 4.0, base_y_res * 8.0],
    }
}

/// Resolution compatibility check for import (spec §4.8 "Compatibility rules").
pub fn resolution_compatible(meta: &CoverageMeta, source_x_res: f64, source_y_res: f64) -> bool {
    if meta.mixed_resolutions {
        return true;
    }
    if meta.strict_resolution {
        source_x_res == meta.h_res && source_y_res == meta.v_res
    } else {
        let within = |src: f64, base: f64| (src - base).abs() <= base.abs() * 0.01;
        within(source_x_res, meta.h_res) && within(source_y_res, meta.v_res)
    }
}
