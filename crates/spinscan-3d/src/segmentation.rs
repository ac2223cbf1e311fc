use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::plane::Plane;
use crate::pointcloud::PointCloud;

/// Error types for the segmentation module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SegmentationError {
    /// A segmentation parameter is out of its valid range.
    #[error("Invalid segmentation parameter: {0}")]
    InvalidParameter(String),

    /// No plane with at least one inlier could be found.
    #[error("Could not estimate a planar model for the given cloud")]
    NoPlaneFound,

    /// The input cloud has no points.
    #[error("Input point cloud is empty")]
    EmptyCloud,
}

/// Parameters of the RANSAC plane segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneSegmentationParams {
    /// Maximum perpendicular distance for a point to count as an inlier.
    pub distance_threshold: f64,
    /// Number of random 3-point samples to evaluate.
    pub max_iterations: usize,
    /// `extract_all` stops once the residual holds at most this fraction of the input.
    pub min_remaining_fraction: f64,
    /// Optional fixed seed for reproducible sampling.
    pub random_seed: Option<u64>,
}

impl Default for PlaneSegmentationParams {
    fn default() -> Self {
        Self {
            distance_threshold: 0.005,
            max_iterations: 100,
            min_remaining_fraction: 0.3,
            random_seed: None,
        }
    }
}

impl PlaneSegmentationParams {
    fn validate(&self) -> Result<(), SegmentationError> {
        if !(self.distance_threshold.is_finite() && self.distance_threshold > 0.0) {
            return Err(SegmentationError::InvalidParameter(format!(
                "distance_threshold must be positive, got {}",
                self.distance_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(SegmentationError::InvalidParameter(
                "max_iterations must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.min_remaining_fraction) {
            return Err(SegmentationError::InvalidParameter(format!(
                "min_remaining_fraction must be in [0, 1), got {}",
                self.min_remaining_fraction
            )));
        }
        Ok(())
    }
}

/// The result of a single plane extraction.
#[derive(Debug, Clone)]
pub struct PlaneExtraction {
    /// The refined plane, with unit normal.
    pub plane: Plane,
    /// The points within the distance threshold of the plane.
    pub inliers: PointCloud,
    /// The remaining valid points.
    pub outliers: PointCloud,
    /// Indices of the inliers in the input cloud.
    pub inlier_indices: Vec<usize>,
}

/// Find the plane supported by the most points of a cloud.
///
/// Evaluates `max_iterations` random 3-point samples and keeps the first plane
/// with the strictly largest inlier count. The winning plane is then refit by
/// least squares over its inliers and the inliers are selected again.
///
/// Invalid points are ignored and both output clouds are unorganized.
///
/// # Errors
///
/// * [`SegmentationError::InvalidParameter`] for out-of-range parameters.
/// * [`SegmentationError::EmptyCloud`] if the cloud has no points.
/// * [`SegmentationError::NoPlaneFound`] if no non-degenerate sample exists.
pub fn extract_one(
    cloud: &PointCloud,
    params: &PlaneSegmentationParams,
) -> Result<PlaneExtraction, SegmentationError> {
    params.validate()?;

    if cloud.is_empty() {
        return Err(SegmentationError::EmptyCloud);
    }

    let points = cloud.points();
    let valid = (0..points.len())
        .filter(|&i| crate::pointcloud::is_valid_point(&points[i]))
        .collect::<Vec<_>>();

    if valid.len() < 3 {
        return Err(SegmentationError::NoPlaneFound);
    }

    let mut rng: StdRng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let threshold = params.distance_threshold;
    let count_inliers =
        |plane: &Plane| valid.iter().filter(|&&i| plane.distance(&points[i]) <= threshold).count();

    let mut best: Option<(Plane, usize)> = None;

    for _ in 0..params.max_iterations {
        // sample 3 distinct indices
        let sample = rand::seq::index::sample(&mut rng, valid.len(), 3);
        let (p0, p1, p2) = (
            &points[valid[sample.index(0)]],
            &points[valid[sample.index(1)]],
            &points[valid[sample.index(2)]],
        );

        let Some(candidate) = Plane::from_points(p0, p1, p2) else {
            continue;
        };

        let num_inliers = count_inliers(&candidate);
        if best.as_ref().is_none_or(|(_, n)| num_inliers > *n) {
            best = Some((candidate, num_inliers));
        }
    }

    let (plane, num_inliers) = best.ok_or(SegmentationError::NoPlaneFound)?;
    if num_inliers == 0 {
        return Err(SegmentationError::NoPlaneFound);
    }

    // optimize the coefficients over the inlier set
    let inlier_points = valid
        .iter()
        .map(|&i| &points[i])
        .filter(|p| plane.distance(p) <= threshold);
    let plane = match fit_plane(inlier_points) {
        Some(refined) if count_inliers(&refined) >= num_inliers => refined,
        _ => plane,
    };

    let mut inlier_indices = Vec::with_capacity(num_inliers);
    let mut inliers = Vec::with_capacity(num_inliers);
    let mut outliers = Vec::with_capacity(valid.len() - num_inliers);
    for &i in &valid {
        if plane.distance(&points[i]) <= threshold {
            inlier_indices.push(i);
            inliers.push(points[i]);
        } else {
            outliers.push(points[i]);
        }
    }

    log::debug!(
        "Extracted plane {:.4?} with {} inliers out of {} points",
        plane.coefficients(),
        inliers.len(),
        valid.len()
    );

    Ok(PlaneExtraction {
        plane,
        inliers: PointCloud::new(inliers),
        outliers: PointCloud::new(outliers),
        inlier_indices,
    })
}

/// Extract planes one after another, largest first.
///
/// Each plane is searched in the residual left by the previous extraction.
/// Extraction continues while the residual holds more than
/// `min_remaining_fraction` of the valid input points and stops at the first
/// failed extraction.
///
/// # Errors
///
/// [`SegmentationError::NoPlaneFound`] if not a single plane was found, plus
/// the parameter and empty-cloud errors of [`extract_one`].
pub fn extract_all(
    cloud: &PointCloud,
    params: &PlaneSegmentationParams,
) -> Result<Vec<Plane>, SegmentationError> {
    params.validate()?;

    if cloud.is_empty() {
        return Err(SegmentationError::EmptyCloud);
    }

    let num_points = cloud.num_valid();
    let min_remaining = params.min_remaining_fraction * num_points as f64;

    let mut planes = Vec::new();
    let mut residual = crate::filter::remove_invalid(cloud);

    while residual.len() as f64 > min_remaining {
        // vary the seed between rounds so fixed-seed runs stay reproducible
        let round_params = PlaneSegmentationParams {
            random_seed: params
                .random_seed
                .map(|seed| seed.wrapping_add(planes.len() as u64)),
            ..params.clone()
        };

        match extract_one(&residual, &round_params) {
            Ok(extraction) => {
                planes.push(extraction.plane);
                residual = extraction.outliers;
            }
            Err(SegmentationError::NoPlaneFound | SegmentationError::EmptyCloud) => break,
            Err(e) => return Err(e),
        }
    }

    if planes.is_empty() {
        return Err(SegmentationError::NoPlaneFound);
    }

    log::info!(
        "Extracted {} planes, {} of {} points left",
        planes.len(),
        residual.len(),
        num_points
    );

    Ok(planes)
}

/// Remove the dominant plane of a cloud, e.g. the scanning bed.
///
/// Returns the points that are not inliers of the largest plane.
pub fn remove_dominant_plane(
    cloud: &PointCloud,
    params: &PlaneSegmentationParams,
) -> Result<PointCloud, SegmentationError> {
    let extraction = extract_one(cloud, params)?;
    log::info!(
        "Removed dominant plane: {} inliers, {} points kept",
        extraction.inliers.len(),
        extraction.outliers.len()
    );
    Ok(extraction.outliers)
}

/// Least-squares plane through a set of points.
fn fit_plane<'a>(points: impl Iterator<Item = &'a [f64; 3]> + Clone) -> Option<Plane> {
    let (centroid, normal) = crate::linalg::least_variance_direction(points)?;
    Plane::from_normal_and_point(&normal, &centroid).ok()
}
