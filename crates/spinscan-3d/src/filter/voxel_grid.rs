use std::collections::BTreeMap;

use super::FilterError;
use crate::pointcloud::PointCloud;

/// Accumulated coordinate sum and point count of one voxel.
type VoxelData = ([f64; 3], usize);

/// A 3D voxel grid for downsampling point clouds.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    /// The edge length of the cubic voxels.
    leaf_size: f64,
    /// Minimum number of points required per voxel.
    min_points_per_voxel: usize,
}

impl VoxelGrid {
    /// Creates a new `VoxelGrid` with the specified leaf size.
    ///
    /// # Errors
    ///
    /// [`FilterError::InvalidLeafSize`] if `leaf_size` is not positive and finite.
    pub fn new(leaf_size: f64) -> Result<Self, FilterError> {
        if !(leaf_size.is_finite() && leaf_size > 0.0) {
            return Err(FilterError::InvalidLeafSize(leaf_size));
        }
        Ok(Self {
            leaf_size,
            min_points_per_voxel: 1,
        })
    }

    /// Gets the voxel grid leaf size.
    pub fn leaf_size(&self) -> f64 {
        self.leaf_size
    }

    /// Sets the minimum number of points a voxel needs to produce an output point.
    pub fn set_min_points_per_voxel(&mut self, min_points: usize) {
        self.min_points_per_voxel = min_points.max(1);
    }

    /// Gets the minimum number of points required per voxel.
    pub fn min_points_per_voxel(&self) -> usize {
        self.min_points_per_voxel
    }

    /// Computes the voxel index for a given point.
    pub fn voxel_index(&self, point: &[f64; 3]) -> (i64, i64, i64) {
        (
            (point[0] / self.leaf_size).floor() as i64,
            (point[1] / self.leaf_size).floor() as i64,
            (point[2] / self.leaf_size).floor() as i64,
        )
    }

    /// Downsamples the input point cloud by replacing the points of each voxel by their centroid.
    ///
    /// Invalid points are ignored. The output is unorganized and ordered by voxel index.
    ///
    /// # Errors
    ///
    /// [`FilterError::EmptyCloud`] if the input cloud has no valid point.
    pub fn downsample(&self, point_cloud: &PointCloud) -> Result<PointCloud, FilterError> {
        if point_cloud.num_valid() == 0 {
            return Err(FilterError::EmptyCloud);
        }

        let mut grid: BTreeMap<(i64, i64, i64), VoxelData> = BTreeMap::new();

        // group points into voxels
        for point in point_cloud.valid_points() {
            let entry = grid.entry(self.voxel_index(point)).or_insert(([0.0; 3], 0));
            entry.0[0] += point[0];
            entry.0[1] += point[1];
            entry.0[2] += point[2];
            entry.1 += 1;
        }

        // compute centroids for each voxel
        let points = grid
            .into_values()
            .filter(|(_, count)| *count >= self.min_points_per_voxel)
            .map(|(sum, count)| {
                let inv_count = 1.0 / count as f64;
                [sum[0] * inv_count, sum[1] * inv_count, sum[2] * inv_count]
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Voxel grid (leaf {}) reduced {} points to {}",
            self.leaf_size,
            point_cloud.len(),
            points.len()
        );

        Ok(PointCloud::new(points))
    }
}

/// Downsample a cloud with cubic voxels of edge `leaf_size`.
///
/// Shorthand for [`VoxelGrid::new`] followed by [`VoxelGrid::downsample`].
pub fn downsample(cloud: &PointCloud, leaf_size: f64) -> Result<PointCloud, FilterError> {
    VoxelGrid::new(leaf_size)?.downsample(cloud)
}
