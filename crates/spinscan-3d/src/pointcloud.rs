/// A point cloud with an optional sensor-grid layout.
///
/// A cloud is *organized* when it keeps the `width x height` layout of the depth
/// sensor that produced it (`height > 1`). Organized clouds mark invalid samples
/// with NaN coordinates instead of removing them. An *unorganized* cloud has
/// `height == 1` and only holds valid points.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud, row-major for organized clouds.
    points: Vec<[f64; 3]>,
    // The number of columns of the sensor grid.
    width: usize,
    // The number of rows of the sensor grid.
    height: usize,
}

/// Error types for the point cloud module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PointCloudError {
    /// The grid layout does not match the number of points.
    #[error("Layout {width}x{height} does not match {num_points} points")]
    InvalidLayout {
        /// Requested grid width.
        width: usize,
        /// Requested grid height.
        height: usize,
        /// Number of points provided.
        num_points: usize,
    },
}

impl PointCloud {
    /// Create a new unorganized point cloud from points.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        let width = points.len();
        Self {
            points,
            width,
            height: 1,
        }
    }

    /// Create a new organized point cloud with the given sensor grid layout.
    ///
    /// Points are expected in row-major order, invalid samples as NaN.
    pub fn new_organized(
        points: Vec<[f64; 3]>,
        width: usize,
        height: usize,
    ) -> Result<Self, PointCloudError> {
        if width.checked_mul(height) != Some(points.len()) {
            return Err(PointCloudError::InvalidLayout {
                width,
                height,
                num_points: points.len(),
            });
        }
        Ok(Self {
            points,
            width,
            height,
        })
    }

    /// Get the number of points in the point cloud, including invalid ones.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Consume the point cloud and return its points.
    pub fn into_points(self) -> Vec<[f64; 3]> {
        self.points
    }

    /// The number of columns of the grid layout.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// The number of rows of the grid layout.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Whether the cloud keeps a 2D sensor grid layout.
    #[inline]
    pub fn is_organized(&self) -> bool {
        self.height > 1
    }

    /// Iterate over the valid (finite) points only.
    pub fn valid_points(&self) -> impl Iterator<Item = &[f64; 3]> + '_ {
        self.points.iter().filter(|p| is_valid_point(p))
    }

    /// Number of valid (finite) points.
    pub fn num_valid(&self) -> usize {
        self.valid_points().count()
    }

    /// Get the minimum and maximum bounds of the valid points.
    ///
    /// Returns `None` if the cloud holds no valid point.
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        let mut it = self.valid_points();
        let first = *it.next()?;
        Some(it.fold((first, first), |(mut lo, mut hi), p| {
            for i in 0..3 {
                lo[i] = lo[i].min(p[i]);
                hi[i] = hi[i].max(p[i]);
            }
            (lo, hi)
        }))
    }

    /// Get the centroid of the valid points, or `None` if there are none.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        let (sum, count) = self
            .valid_points()
            .fold(([0.0; 3], 0usize), |(acc, n), p| {
                ([acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]], n + 1)
            });
        (count > 0).then(|| {
            let inv = 1.0 / count as f64;
            [sum[0] * inv, sum[1] * inv, sum[2] * inv]
        })
    }

    /// Append the points of another cloud, producing an unorganized cloud.
    ///
    /// Invalid points of either cloud are dropped.
    pub fn concatenate(&self, other: &PointCloud) -> PointCloud {
        let points = self
            .valid_points()
            .chain(other.valid_points())
            .copied()
            .collect();
        PointCloud::new(points)
    }
}

/// Whether a point is valid, i.e. all of its coordinates are finite.
#[inline]
pub fn is_valid_point(p: &[f64; 3]) -> bool {
    p[0].is_finite() && p[1].is_finite() && p[2].is_finite()
}

/// The placeholder used for invalid points in organized clouds.
pub const INVALID_POINT: [f64; 3] = [f64::NAN, f64::NAN, f64::NAN];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointcloud() {
        let pointcloud = PointCloud::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);

        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points().len(), 2);
        assert_eq!(pointcloud.width(), 2);
        assert_eq!(pointcloud.height(), 1);
        assert!(!pointcloud.is_organized());

        if let Some(p1) = pointcloud.points().last() {
            assert_eq!(p1[0], 1.0);
            assert_eq!(p1[1], 0.0);
            assert_eq!(p1[2], 0.0);
        }
    }

    #[test]
    fn test_organized_layout() -> Result<(), PointCloudError> {
        let cloud = PointCloud::new_organized(
            vec![[0.0, 0.0, 1.0], INVALID_POINT, [1.0, 1.0, 1.0], [2.0, 0.5, 1.0]],
            2,
            2,
        )?;
        assert!(cloud.is_organized());
        assert_eq!(cloud.len(), 4);
        assert_eq!(cloud.num_valid(), 3);

        let res = PointCloud::new_organized(vec![[0.0; 3]; 3], 2, 2);
        assert_eq!(
            res,
            Err(PointCloudError::InvalidLayout {
                width: 2,
                height: 2,
                num_points: 3
            })
        );

        // a grid too large to count is rejected, not wrapped
        let res = PointCloud::new_organized(Vec::new(), usize::MAX, 2);
        assert_eq!(
            res,
            Err(PointCloudError::InvalidLayout {
                width: usize::MAX,
                height: 2,
                num_points: 0
            })
        );
        Ok(())
    }

    #[test]
    fn test_bounds_and_centroid() -> Result<(), PointCloudError> {
        let cloud = PointCloud::new_organized(
            vec![[0.0, -1.0, 2.0], INVALID_POINT, [2.0, 1.0, 4.0], INVALID_POINT],
            2,
            2,
        )?;
        let (lo, hi) = cloud.bounds().ok_or(PointCloudError::InvalidLayout {
            width: 0,
            height: 0,
            num_points: 0,
        })?;
        assert_eq!(lo, [0.0, -1.0, 2.0]);
        assert_eq!(hi, [2.0, 1.0, 4.0]);
        assert_eq!(cloud.centroid(), Some([1.0, 0.0, 3.0]));

        let empty = PointCloud::new(vec![]);
        assert!(empty.bounds().is_none());
        assert!(empty.centroid().is_none());
        Ok(())
    }

    #[test]
    fn test_concatenate_drops_invalid() -> Result<(), PointCloudError> {
        let a = PointCloud::new_organized(vec![[0.0; 3], INVALID_POINT], 1, 2)?;
        let b = PointCloud::new(vec![[1.0; 3], [2.0; 3]]);
        let merged = a.concatenate(&b);
        assert!(!merged.is_organized());
        assert_eq!(merged.points(), &[[0.0; 3], [1.0; 3], [2.0; 3]]);
        Ok(())
    }
}
