//! Dataset tables and evaluation options.

use std::{f32::consts::PI, fs::File, io::BufReader, path::Path};

use derivative::Derivative;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::{
    data::ClassId,
    error::{Error, Result},
};

/// Canonical headings and sizes the box decoder indexes into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub class_names: Vec<String>,
    pub num_heading_bin: usize,
    /// Mean (l, w, h) of every size cluster.
    pub mean_size_arr: Vec<[f32; 3]>,
}

static SUNRGBD: Lazy<DatasetConfig> = Lazy::new(|| DatasetConfig {
    name: "sunrgbd".to_string(),
    class_names: [
        "bed",
        "table",
        "sofa",
        "chair",
        "toilet",
        "desk",
        "dresser",
        "night_stand",
        "bookshelf",
        "bathtub",
    ]
    .iter()
    .map(|x| x.to_string())
    .collect(),
    num_heading_bin: 12,
    mean_size_arr: vec![
        [2.114256, 1.620300, 0.927272],
        [0.791118, 1.279516, 0.718182],
        [0.923508, 1.867419, 0.845495],
        [0.591958, 0.552978, 0.827272],
        [0.699104, 0.454178, 0.756250],
        [0.695190, 1.346299, 0.736364],
        [0.528526, 1.002642, 1.172878],
        [0.500618, 0.632163, 0.683424],
        [0.404671, 1.071108, 1.688889],
        [0.765840, 1.398258, 0.472728],
    ],
});

impl DatasetConfig {
    /// SUN RGB-D v1 labels: ten classes, one size cluster per class.
    pub fn sunrgbd() -> &'static Self {
        &SUNRGBD
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// `sunrgbd` selects the built-in table, anything else is read as a JSON file.
    pub fn resolve(name_or_path: &str) -> Result<Self> {
        match name_or_path {
            "sunrgbd" => Ok(Self::sunrgbd().clone()),
            path => Self::from_json_file(path),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.class_names.is_empty() {
            return Err(Error::InvalidDatasetConfig("no classes".to_string()));
        }
        if self.num_heading_bin == 0 {
            return Err(Error::InvalidDatasetConfig("no heading bins".to_string()));
        }
        if self.mean_size_arr.is_empty() {
            return Err(Error::InvalidDatasetConfig("no size clusters".to_string()));
        }
        if let Some(idx) = self
            .mean_size_arr
            .iter()
            .position(|size| size.iter().any(|x| !(x.is_finite() && *x > 0f32)))
        {
            return Err(Error::InvalidDatasetConfig(format!(
                "mean size of cluster {} is not finite and positive",
                idx
            )));
        }
        Ok(())
    }

    pub fn num_class(&self) -> usize {
        self.class_names.len()
    }

    pub fn num_size_cluster(&self) -> usize {
        self.mean_size_arr.len()
    }

    pub fn class_name(&self, class: ClassId) -> Option<&str> {
        self.class_names.get(class).map(String::as_str)
    }

    /// Heading bin and residual to an angle in (-pi, pi].
    pub fn class2angle(&self, heading_bin: i64, residual: f32) -> Result<f32> {
        let bin = checked_index(heading_bin, self.num_heading_bin).ok_or(
            Error::HeadingBinOutOfRange {
                index: heading_bin,
                num_heading_bin: self.num_heading_bin,
            },
        )?;
        let angle_per_bin = 2f32 * PI / self.num_heading_bin as f32;
        let angle = bin as f32 * angle_per_bin + residual;
        Ok(if angle > PI { angle - 2f32 * PI } else { angle })
    }

    pub fn class2size(&self, size_cluster: i64, residual: [f32; 3]) -> Result<[f32; 3]> {
        let cluster = checked_index(size_cluster, self.num_size_cluster()).ok_or(
            Error::SizeClusterOutOfRange {
                index: size_cluster,
                num_size_cluster: self.num_size_cluster(),
            },
        )?;
        let mean = self.mean_size_arr[cluster];
        Ok([
            mean[0] + residual[0],
            mean[1] + residual[1],
            mean[2] + residual[2],
        ])
    }

    pub fn checked_class(&self, class: i64) -> Result<ClassId> {
        checked_index(class, self.num_class()).ok_or(Error::ClassOutOfRange {
            index: class,
            num_class: self.num_class(),
        })
    }
}

fn checked_index(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|x| *x < len)
}

/// How the precision/recall curve is integrated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum ApMethod {
    /// Area under the monotone precision envelope at every recall step.
    #[strum(serialize = "full", ascii_case_insensitive)]
    #[serde(rename = "full")]
    FullCurve,
    /// Legacy 11-point interpolation at recall 0, 0.1, ..., 1.
    #[strum(serialize = "11point", ascii_case_insensitive)]
    #[serde(rename = "11point")]
    ElevenPoint,
}

impl Default for ApMethod {
    fn default() -> Self {
        ApMethod::FullCurve
    }
}

/// Options of the prediction parser.
#[derive(Clone, Debug, PartialEq, Derivative, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct EvalConfig {
    /// Drop degenerate boxes and boxes with too few points before NMS.
    #[derivative(Default(value = "true"))]
    pub remove_empty_box: bool,
    pub use_3d_nms: bool,
    #[derivative(Default(value = "0.25"))]
    pub nms_iou: f32,
    /// Intersection over the candidate's area instead of IoU.
    pub use_old_type_nms: bool,
    /// Suppress only within a class. Needs `use_3d_nms`.
    pub cls_nms: bool,
    /// Emit every kept box once per class, scored by class probability.
    pub per_class_proposal: bool,
    #[derivative(Default(value = "0.05"))]
    pub conf_thresh: f32,
}

impl EvalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cls_nms && !self.use_3d_nms {
            return Err(Error::InvalidConfig(
                "per-class NMS requires 3D NMS".to_string(),
            ));
        }
        if !(self.nms_iou.is_finite() && self.nms_iou >= 0f32) {
            return Err(Error::InvalidConfig(format!(
                "nms_iou must be finite and non-negative, got {}",
                self.nms_iou
            )));
        }
        if !self.conf_thresh.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "conf_thresh must be finite, got {}",
                self.conf_thresh
            )));
        }
        Ok(())
    }
}
