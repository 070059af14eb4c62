//! Average-precision evaluation of 3D object detectors.
//!
//! Raw proposal tensors of a batch are decoded into oriented boxes
//! ([`decoder`]), de-duplicated ([`nms`]) and collected per sample
//! ([`parser`]); [`ApCalculator`] matches them against the ground truth
//! over a whole pass and reports per-class AP and mAP. [`Evaluator`] runs
//! that loop for several IoU thresholds at once.

pub mod data;
pub mod error;

pub mod ap_calculator;
pub mod config;
pub mod decoder;
pub mod evaluate;
pub mod nms;
pub mod overlap;
pub mod parser;

pub use ap_calculator::{ApCalculator, Phase};
pub use config::{ApMethod, DatasetConfig, EvalConfig};
pub use data::{
    bbox3d::OrientedBox,
    input::Batch,
    output::{Detection, DetectionList, GroundTruth, GroundTruthList, Metrics},
    ClassId,
};
pub use error::{Error, Result};
pub use evaluate::{EvalReport, Evaluator, ObjectnessThresholds};
pub use parser::{parse_groundtruths, parse_predictions};
