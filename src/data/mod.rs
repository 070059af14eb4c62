/// Semantic class index into the dataset config's class table.
pub type ClassId = usize;

/*
                     z (up)
                     |
                     |    (7)_________(6)
                     |     /|        /|
                     |    / |       / |
                     |(4)/__|______/(5)
                     |   |  |      |  |
                     |   | (3)_____|__|(2)
                     |   |  /  O   |  /
                     |   | /       | /
                     |   |/________|/
                     |  (0)        (1)
                     |_____________________ x
                    /
                   /  y (forward)

    bbox 3d is given in the upright depth frame, O = (x, y, z) is the box
    center. Before rotation, l runs along x, w along y and h along z.

    Corners 0~3 are the bottom face, 4~7 the top face with the same winding.
    The footprint is rotated by -heading about z, the convention the
    heading labels are generated with.
*/

pub mod bbox3d {
    use nalgebra as na;

    use derive_more::Display;

    /// Immutable oriented box: center, (l, w, h) and heading about z.
    #[derive(Clone, Copy, Debug, PartialEq, Display)]
    #[display(
        fmt = "x: {}, y: {}, z: {}, l: {}, w: {}, h: {}, heading: {}",
        "center.x",
        "center.y",
        "center.z",
        "size.x",
        "size.y",
        "size.z",
        "heading"
    )]
    pub struct OrientedBox {
        center: na::Point3<f32>,
        size: na::Vector3<f32>,
        heading: f32,
    }

    impl OrientedBox {
        pub fn new(center: [f32; 3], size: [f32; 3], heading: f32) -> Self {
            Self {
                center: na::Point3::from(center),
                size: na::Vector3::from(size),
                heading,
            }
        }

        pub fn center(&self) -> na::Point3<f32> {
            self.center
        }

        pub fn size(&self) -> na::Vector3<f32> {
            self.size
        }

        pub fn heading(&self) -> f32 {
            self.heading
        }

        pub fn volume(&self) -> f32 {
            self.size.x * self.size.y * self.size.z
        }

        /// True for zero, negative or NaN volume.
        pub fn is_degenerate(&self) -> bool {
            !(self.volume() > 0f32)
        }

        /// Box frame -> depth frame.
        fn isometry(&self) -> na::Isometry3<f32> {
            na::Isometry3::new(self.center.coords, na::Vector3::z() * -self.heading)
        }

        pub fn corners(&self) -> CornerPoints {
            let iso = self.isometry();
            let (l, w, h) = (self.size.x / 2f32, self.size.y / 2f32, self.size.z / 2f32);
            CornerPoints([
                iso * na::Point3::new(l, w, -h),
                iso * na::Point3::new(l, -w, -h),
                iso * na::Point3::new(-l, -w, -h),
                iso * na::Point3::new(-l, w, -h),
                iso * na::Point3::new(l, w, h),
                iso * na::Point3::new(l, -w, h),
                iso * na::Point3::new(-l, -w, h),
                iso * na::Point3::new(-l, w, h),
            ])
        }

        /// Axis-aligned bounds of the eight corners.
        pub fn aligned_extent(&self) -> AlignedExtent {
            let CornerPoints(corners) = self.corners();
            let mut extent = AlignedExtent {
                min: [f32::INFINITY; 3],
                max: [f32::NEG_INFINITY; 3],
            };
            for corner in corners.iter() {
                for axis in 0..3 {
                    extent.min[axis] = extent.min[axis].min(corner[axis]);
                    extent.max[axis] = extent.max[axis].max(corner[axis]);
                }
            }
            extent
        }

        /// Inclusive containment test in the box frame.
        pub fn contains_point(&self, point: [f32; 3]) -> bool {
            let local = self.isometry().inverse_transform_point(&na::Point3::from(point));
            let half = self.size / 2f32;
            local.x.abs() <= half.x && local.y.abs() <= half.y && local.z.abs() <= half.z
        }
    }

    #[derive(Clone, Copy, Debug)]
    pub struct CornerPoints(pub [na::Point3<f32>; 8]);

    impl CornerPoints {
        pub fn bottom(&self) -> &[na::Point3<f32>] {
            &self.0[..4]
        }

        pub fn z_range(&self) -> (f32, f32) {
            (self.0[0].z, self.0[4].z)
        }
    }

    /// Axis-aligned bounding extent, `min[i] <= max[i]` for a valid box.
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct AlignedExtent {
        pub min: [f32; 3],
        pub max: [f32; 3],
    }

    impl AlignedExtent {
        /// Product of the side lengths over the first `dims` axes.
        pub fn measure(&self, dims: usize) -> f32 {
            (0..dims).map(|axis| self.max[axis] - self.min[axis]).product()
        }

        pub fn intersection_measure(&self, other: &Self, dims: usize) -> f32 {
            (0..dims)
                .map(|axis| {
                    (self.max[axis].min(other.max[axis]) - self.min[axis].max(other.min[axis]))
                        .max(0f32)
                })
                .product()
        }
    }
}

pub mod input;

pub mod output;
