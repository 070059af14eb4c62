//! Oriented box overlap.

use geo::{polygon, prelude::Area, Polygon};
use geo_clipper::Clipper;

use crate::data::bbox3d::{CornerPoints, OrientedBox};

/// Fixed-point scale used by the polygon clipper.
const CLIPPER_SCALE: f64 = 1e6;

/// Returns `(3d IoU, bird's-eye IoU)`. Degenerate boxes overlap nothing.
pub fn box3d_iou(bbox1: &OrientedBox, bbox2: &OrientedBox) -> (f32, f32) {
    if bbox1.is_degenerate() || bbox2.is_degenerate() {
        return (0f32, 0f32);
    }
    let (corners1, corners2) = (bbox1.corners(), bbox2.corners());
    let (bbox1_base, bbox2_base) = (footprint(&corners1), footprint(&corners2));
    let (bbox1_base_area, bbox2_base_area) = (
        bbox1_base.unsigned_area() as f32,
        bbox2_base.unsigned_area() as f32,
    );
    let base_intersection_area =
        bbox1_base.intersection(&bbox2_base, CLIPPER_SCALE).unsigned_area() as f32;
    if base_intersection_area <= 0f32 {
        return (0f32, 0f32);
    }

    let ((z1_min, z1_max), (z2_min, z2_max)) = (corners1.z_range(), corners2.z_range());
    let h_intersection_len = (z1_max.min(z2_max) - z1_min.max(z2_min)).max(0f32);

    let (bbox1_vol, bbox2_vol, intersection_vol) = (
        bbox1_base_area * (z1_max - z1_min),
        bbox2_base_area * (z2_max - z2_min),
        base_intersection_area * h_intersection_len,
    );

    (
        ratio(intersection_vol, bbox1_vol + bbox2_vol - intersection_vol),
        ratio(
            base_intersection_area,
            bbox1_base_area + bbox2_base_area - base_intersection_area,
        ),
    )
}

fn ratio(intersection: f32, union: f32) -> f32 {
    if union > 0f32 {
        (intersection / union).min(1f32)
    } else {
        0f32
    }
}

fn footprint(corners: &CornerPoints) -> Polygon<f64> {
    let base = corners.bottom();
    polygon![
        (x: base[0].x as f64, y: base[0].y as f64),
        (x: base[1].x as f64, y: base[1].y as f64),
        (x: base[2].x as f64, y: base[2].y as f64),
        (x: base[3].x as f64, y: base[3].y as f64),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_boxes_overlap_fully() {
        let bbox = OrientedBox::new([1f32, 2f32, 0.5f32], [2f32, 1f32, 1f32], 0.3f32);
        let (iou_3d, iou_bev) = box3d_iou(&bbox, &bbox);
        assert!((iou_3d - 1f32).abs() < 1e-4);
        assert!((iou_bev - 1f32).abs() < 1e-4);
    }

    #[test]
    fn half_height_overlap() {
        let bbox1 = OrientedBox::new([0f32, 0f32, 0f32], [2f32, 2f32, 2f32], 0f32);
        let bbox2 = OrientedBox::new([0f32, 0f32, 1f32], [2f32, 2f32, 2f32], 0f32);
        let (iou_3d, iou_bev) = box3d_iou(&bbox1, &bbox2);
        // intersection 4, union 8 + 8 - 4
        assert!((iou_3d - 1f32 / 3f32).abs() < 1e-5);
        assert!((iou_bev - 1f32).abs() < 1e-5);
    }

    #[test]
    fn quarter_turn_of_a_square_is_the_same_box() {
        let bbox1 = OrientedBox::new([0f32, 0f32, 0f32], [1f32, 1f32, 1f32], 0f32);
        let bbox2 = OrientedBox::new(
            [0f32, 0f32, 0f32],
            [1f32, 1f32, 1f32],
            std::f32::consts::FRAC_PI_2,
        );
        assert!((box3d_iou(&bbox1, &bbox2).0 - 1f32).abs() < 1e-4);
    }

    #[test]
    fn degenerate_box_has_no_overlap() {
        let flat = OrientedBox::new([0f32, 0f32, 0f32], [1f32, 1f32, 0f32], 0f32);
        let bbox = OrientedBox::new([0f32, 0f32, 0f32], [1f32, 1f32, 1f32], 0f32);
        assert_eq!(box3d_iou(&flat, &bbox), (0f32, 0f32));
        assert_eq!(box3d_iou(&flat, &flat), (0f32, 0f32));
    }

    #[test]
    fn disjoint_boxes() {
        let bbox1 = OrientedBox::new([0f32, 0f32, 0f32], [1f32, 1f32, 1f32], 0f32);
        let bbox2 = OrientedBox::new([5f32, 0f32, 0f32], [1f32, 1f32, 1f32], 0.7f32);
        assert_eq!(box3d_iou(&bbox1, &bbox2), (0f32, 0f32));
    }
}
