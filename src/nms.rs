//! Greedy non-maximum suppression over axis-aligned box extents.

use itertools::Itertools;
use ordered_float::OrderedFloat;
use strum_macros::{Display, EnumString};

use crate::{
    config::EvalConfig,
    data::{bbox3d::AlignedExtent, ClassId},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NmsCandidate {
    pub extent: AlignedExtent,
    pub score: f32,
    pub class: ClassId,
}

/// Whether height takes part in the overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum NmsSpace {
    /// Height collapsed, x/y area.
    #[strum(serialize = "bev")]
    BirdsEye,
    /// x/y/z volume.
    #[strum(serialize = "3d")]
    Full3d,
}

impl NmsSpace {
    fn dims(self) -> usize {
        match self {
            NmsSpace::BirdsEye => 2,
            NmsSpace::Full3d => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum NmsScope {
    #[strum(serialize = "all")]
    CrossClass,
    #[strum(serialize = "class")]
    PerClass,
}

/// Overlap between the kept box and a remaining candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum OverlapMetric {
    #[strum(serialize = "iou")]
    Iou,
    /// Intersection over the candidate's own area or volume.
    #[strum(serialize = "io_box2_area")]
    IoBox2Area,
}

impl OverlapMetric {
    /// Zero whenever either side is degenerate.
    pub fn overlap(self, kept: &AlignedExtent, candidate: &AlignedExtent, space: NmsSpace) -> f32 {
        let dims = space.dims();
        let (kept_measure, candidate_measure) = (kept.measure(dims), candidate.measure(dims));
        if !(kept_measure > 0f32 && candidate_measure > 0f32) {
            return 0f32;
        }
        let inter = kept.intersection_measure(candidate, dims);
        match self {
            OverlapMetric::Iou => inter / (kept_measure + candidate_measure - inter),
            OverlapMetric::IoBox2Area => inter / candidate_measure,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NmsParams {
    /// Candidates strictly above this overlap are suppressed.
    pub threshold: f32,
    pub space: NmsSpace,
    pub scope: NmsScope,
    pub metric: OverlapMetric,
}

impl NmsParams {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            space: NmsSpace::BirdsEye,
            scope: NmsScope::CrossClass,
            metric: OverlapMetric::Iou,
        }
    }

    pub fn space(mut self, space: NmsSpace) -> Self {
        self.space = space;
        self
    }

    pub fn scope(mut self, scope: NmsScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn metric(mut self, metric: OverlapMetric) -> Self {
        self.metric = metric;
        self
    }
}

impl From<&EvalConfig> for NmsParams {
    fn from(config: &EvalConfig) -> Self {
        NmsParams::new(config.nms_iou)
            .space(if config.use_3d_nms {
                NmsSpace::Full3d
            } else {
                NmsSpace::BirdsEye
            })
            .scope(if config.cls_nms {
                NmsScope::PerClass
            } else {
                NmsScope::CrossClass
            })
            .metric(if config.use_old_type_nms {
                OverlapMetric::IoBox2Area
            } else {
                OverlapMetric::Iou
            })
    }
}

/// Returns the indices of the kept candidates in selection order.
pub fn nms(candidates: &[NmsCandidate], params: &NmsParams) -> Vec<usize> {
    // stable: equal scores keep input order
    let mut remaining: Vec<usize> = (0..candidates.len())
        .sorted_by_key(|idx| std::cmp::Reverse(OrderedFloat(candidates[*idx].score)))
        .collect();
    let mut keep = Vec::new();

    while !remaining.is_empty() {
        let best = remaining.remove(0);
        keep.push(best);
        let kept = &candidates[best];
        remaining.retain(|idx| {
            let candidate = &candidates[*idx];
            if params.scope == NmsScope::PerClass && candidate.class != kept.class {
                return true;
            }
            params
                .metric
                .overlap(&kept.extent, &candidate.extent, params.space)
                <= params.threshold
        });
    }
    keep
}
