//! Per-sample detections, ground truth and the final AP report.

use super::{bbox3d::OrientedBox, ClassId};

use serde::Serialize;

/// One kept proposal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub class: ClassId,
    pub bbox: OrientedBox,
    pub score: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundTruth {
    pub class: ClassId,
    pub bbox: OrientedBox,
}

pub type DetectionList = Vec<Detection>;

pub type GroundTruthList = Vec<GroundTruth>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub class: ClassId,
    pub name: String,
    pub average_precision: f32,
    /// Recall at the last rank, 0 when the class was never detected.
    pub recall: f32,
    pub num_groundtruth: usize,
    pub num_detections: usize,
}

/// AP report for one IoU threshold. Only classes with ground truth appear.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metrics {
    pub iou_threshold: f32,
    pub classes: Vec<ClassMetrics>,
    pub mean_average_precision: f32,
    pub average_recall: f32,
}

impl Metrics {
    pub fn class(&self, class: ClassId) -> Option<&ClassMetrics> {
        self.classes.iter().find(|x| x.class == class)
    }

    /// Report lines in a stable order: per-class AP, mAP, per-class recall, AR.
    pub fn entries(&self) -> Vec<(String, f32)> {
        let mut entries = Vec::with_capacity(self.classes.len() * 2 + 2);
        for each_class in &self.classes {
            entries.push((
                format!("{} Average Precision", each_class.name),
                each_class.average_precision,
            ));
        }
        entries.push(("mAP".to_string(), self.mean_average_precision));
        for each_class in &self.classes {
            entries.push((format!("{} Recall", each_class.name), each_class.recall));
        }
        entries.push(("AR".to_string(), self.average_recall));
        entries
    }
}
