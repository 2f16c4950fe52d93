//! Global camera and point positioning from relative translation directions.
//!
//! Given fixed per-image orientations (from rotation averaging), pairwise
//! relative translation directions, and per-track observation bearings, this
//! problem estimates a globally consistent position for every constrained
//! image and track. Camera positions are parameterized directly as centers,
//! which keeps both constraint families linear in the unknowns; every
//! direction-only term carries a strictly positive auxiliary scale absorbing
//! the unknown magnitude. The solution is defined only up to a global
//! similarity transform; the ambiguity is controlled implicitly by the
//! bounding-box-constrained initialization and, when position priors exist,
//! by an alignment transform into the bounding-box frame that is undone on
//! conversion.

use crate::backend::{
    solve_with_backend, BackendKind, BackendSolveOptions, LinearSolverKind,
};
use crate::ir::{Bound, FactorKind, FixedMask, ParamId, ProblemIR, ResidualBlock, RobustLoss};
use crate::problems::OptimizationBaseOptions;
use anyhow::{anyhow, ensure, Result};
use log::{debug, info, warn};
use nalgebra::{DVector, Translation3, UnitQuaternion};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use sfm_core::{
    Aabb, Camera, CameraId, Image, ImageId, Pt3, Sim3, Track, TrackId, Vec3, ViewGraph,
};
use std::collections::HashMap;

/// Lower bound applied to every auxiliary scale variable.
const MIN_SCALE: f64 = 1e-5;

/// Constraint families included in the optimization.
///
/// `OnlyPoints` is the recommended default: it avoids compounding the two
/// independent translation-scale ambiguities of the camera-to-camera terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    /// Only camera-to-point constraints.
    OnlyPoints,
    /// Only camera-to-camera constraints.
    OnlyCameras,
    /// Both families, with the point terms reweighted so neither family
    /// dominates regardless of edge/track counts.
    PointsAndCamerasBalanced,
    /// Both families, every residual contributing equally.
    PointsAndCameras,
}

/// Configuration for [`GlobalPositioner`].
///
/// An immutable value object: repeated solves with different configurations
/// are side-effect-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalPositionerOptions {
    pub base: OptimizationBaseOptions,

    /// Draw starting positions/points from the bounding boxes instead of
    /// using the scene's current values.
    pub generate_random_positions: bool,
    pub generate_random_points: bool,
    /// Start auxiliary scales at 1 instead of deriving them from the
    /// initial geometry.
    pub generate_scales: bool,

    /// Freeze the corresponding variable class when disabled.
    pub optimize_positions: bool,
    pub optimize_points: bool,
    pub optimize_scales: bool,

    pub use_gpu: bool,
    /// GPU device index; -1 selects the default device.
    pub gpu_index: i32,
    /// Minimum number of registered images before the GPU solve strategy is
    /// requested.
    pub min_num_images_gpu_solver: usize,

    /// Tracks observed by fewer distinct registered images are excluded.
    pub min_num_view_per_track: usize,

    /// Seed of the per-solve random generator.
    pub seed: u64,

    pub cameras_bbox: Aabb,
    pub points_bbox: Aabb,

    pub constraint_type: ConstraintType,
    /// Only relevant for [`ConstraintType::PointsAndCamerasBalanced`].
    pub constraint_reweight_scale: f64,
}

impl Default for GlobalPositionerOptions {
    fn default() -> Self {
        Self {
            base: OptimizationBaseOptions {
                loss_threshold: 1e-1,
                ..OptimizationBaseOptions::default()
            },
            generate_random_positions: true,
            generate_random_points: true,
            generate_scales: true,
            optimize_positions: true,
            optimize_points: true,
            optimize_scales: true,
            use_gpu: true,
            gpu_index: -1,
            min_num_images_gpu_solver: 50,
            min_num_view_per_track: 3,
            seed: 1,
            cameras_bbox: Aabb::cube(100.0),
            points_bbox: Aabb::cube(100.0),
            constraint_type: ConstraintType::OnlyPoints,
            constraint_reweight_scale: 1.0,
        }
    }
}

impl GlobalPositionerOptions {
    /// Robust loss shared by all constraint terms before reweighting.
    fn loss(&self) -> RobustLoss {
        RobustLoss::Huber {
            scale: self.base.loss_threshold,
        }
    }

    fn backend_options(&self, num_registered_images: usize) -> BackendSolveOptions {
        let mut opts = self.base.backend_options();
        opts.linear_solver =
            Some(if self.use_gpu && num_registered_images >= self.min_num_images_gpu_solver {
                LinearSolverKind::DenseGpu {
                    device: self.gpu_index,
                }
            } else {
                LinearSolverKind::SparseCholesky
            });
        opts
    }
}

/// Assembled positioning problem: the IR, its initial values, and the
/// bookkeeping needed to map solved variables back onto the scene.
///
/// Building is deterministic for a fixed seed and fixed inputs, and never
/// mutates the scene.
#[derive(Debug)]
pub struct GlobalPositioningProblem {
    pub ir: ProblemIR,
    pub initial: HashMap<String, DVector<f64>>,
    pub position_params: HashMap<ImageId, ParamId>,
    pub point_params: HashMap<TrackId, ParamId>,
    pub num_camera_to_camera: usize,
    pub num_point_to_camera: usize,
    /// Alignment applied to prior-derived initial values; undone on
    /// conversion so results are expressed in the prior frame.
    pub bbox_from_prior: Option<Sim3>,
}

/// Summary of a successful positioning run.
#[derive(Debug, Clone)]
pub struct GlobalPositioningSummary {
    pub final_cost: f64,
    pub num_camera_to_camera: usize,
    pub num_point_to_camera: usize,
}

/// Estimates a globally consistent position for every constrained image and
/// track, in place.
pub struct GlobalPositioner {
    options: GlobalPositionerOptions,
}

impl GlobalPositioner {
    pub fn new(options: GlobalPositionerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GlobalPositionerOptions {
        &self.options
    }

    /// Runs one optimization pass and writes solved positions back into the
    /// scene.
    ///
    /// Orientations and cameras are read-only. On success, image
    /// translations and track points of the optimized variable classes are
    /// updated in place; on error the scene is left untouched. Exhausting
    /// the iteration budget is not an error: the best available result is
    /// converted and returned.
    pub fn solve(
        &self,
        view_graph: &ViewGraph,
        cameras: &HashMap<CameraId, Camera>,
        images: &mut HashMap<ImageId, Image>,
        tracks: &mut HashMap<TrackId, Track>,
    ) -> Result<GlobalPositioningSummary> {
        ensure!(!images.is_empty(), "no images to position");

        let problem =
            build_global_positioning_problem(&self.options, view_graph, cameras, images, tracks)?;
        ensure!(
            !problem.ir.residuals.is_empty(),
            "no positioning constraints could be built (valid pairs: {}, tracks: {})",
            view_graph.num_valid_pairs(),
            tracks.len()
        );

        let num_registered = images.values().filter(|image| image.is_registered).count();
        info!(
            "positioning {} images from {} camera-to-camera and {} point-to-camera constraints",
            problem.position_params.len(),
            problem.num_camera_to_camera,
            problem.num_point_to_camera
        );

        let backend_opts = self.options.backend_options(num_registered);
        let solution = solve_with_backend(
            BackendKind::TinySolver,
            &problem.ir,
            &problem.initial,
            &backend_opts,
        )?;
        debug!("positioning finished with cost {:.6e}", solution.final_cost);

        convert_results(&problem, &solution.params, images, tracks);

        Ok(GlobalPositioningSummary {
            final_cost: solution.final_cost,
            num_camera_to_camera: problem.num_camera_to_camera,
            num_point_to_camera: problem.num_point_to_camera,
        })
    }
}

/// Builds the positioning problem without solving it.
///
/// Exposed separately so callers can inspect the assembled constraints and
/// starting point; [`GlobalPositioner::solve`] is the usual entry point.
pub fn build_global_positioning_problem(
    options: &GlobalPositionerOptions,
    view_graph: &ViewGraph,
    cameras: &HashMap<CameraId, Camera>,
    images: &HashMap<ImageId, Image>,
    tracks: &HashMap<TrackId, Track>,
) -> Result<GlobalPositioningProblem> {
    ensure!(
        options.optimize_positions || options.optimize_points || options.optimize_scales,
        "all optimization toggles are disabled; nothing to solve"
    );

    let mut builder = ProblemBuilder::new(options);

    // One local generator per build keeps repeated solves reproducible.
    let mut rng = StdRng::seed_from_u64(options.seed);
    builder.initialize_positions(&mut rng, images);
    builder.initialize_points(&mut rng, tracks);

    if options.constraint_type != ConstraintType::OnlyPoints {
        builder.add_camera_to_camera_constraints(view_graph, images);
    }
    if options.constraint_type != ConstraintType::OnlyCameras {
        builder.add_point_to_camera_constraints(cameras, images, tracks)?;
    }

    builder.assign_ordering_groups();
    builder.ir.validate()?;
    Ok(builder.finish())
}

struct ProblemBuilder<'a> {
    options: &'a GlobalPositionerOptions,
    ir: ProblemIR,
    initial: HashMap<String, DVector<f64>>,
    init_centers: HashMap<ImageId, Vec3>,
    init_points: HashMap<TrackId, Vec3>,
    position_params: HashMap<ImageId, ParamId>,
    point_params: HashMap<TrackId, ParamId>,
    scale_params: Vec<ParamId>,
    num_camera_to_camera: usize,
    num_point_to_camera: usize,
    bbox_from_prior: Option<Sim3>,
}

impl<'a> ProblemBuilder<'a> {
    fn new(options: &'a GlobalPositionerOptions) -> Self {
        Self {
            options,
            ir: ProblemIR::new(),
            initial: HashMap::new(),
            init_centers: HashMap::new(),
            init_points: HashMap::new(),
            position_params: HashMap::new(),
            point_params: HashMap::new(),
            scale_params: Vec::new(),
            num_camera_to_camera: 0,
            num_point_to_camera: 0,
            bbox_from_prior: None,
        }
    }

    /// Chooses a starting center for every registered image.
    ///
    /// Images are visited in id order and all draws happen here, so the
    /// starting point depends only on the seed and the input scene.
    fn initialize_positions(&mut self, rng: &mut StdRng, images: &HashMap<ImageId, Image>) {
        let mut image_ids: Vec<ImageId> = images
            .iter()
            .filter(|(_, image)| image.is_registered)
            .map(|(&id, _)| id)
            .collect();
        image_ids.sort_unstable();

        let priors: Vec<Pt3> = image_ids
            .iter()
            .filter_map(|id| images[id].position_prior.as_ref())
            .map(|prior| prior.position)
            .collect();
        if !priors.is_empty() {
            let alignment = fit_bbox_from_priors(&priors, &self.options.cameras_bbox);
            debug!(
                "aligning {} position priors into the cameras bounding box (scale {:.3e})",
                priors.len(),
                alignment.scaling()
            );
            self.bbox_from_prior = Some(alignment);
        }

        for image_id in image_ids {
            let image = &images[&image_id];
            let center = match (&self.bbox_from_prior, &image.position_prior) {
                (Some(alignment), Some(prior)) => {
                    alignment.transform_point(&prior.position).coords
                }
                _ if self.options.generate_random_positions => {
                    self.options.cameras_bbox.sample(rng)
                }
                _ => {
                    let center = image.center();
                    match &self.bbox_from_prior {
                        Some(alignment) => alignment.transform_point(&center).coords,
                        None => center.coords,
                    }
                }
            };
            self.init_centers.insert(image_id, center);
        }
    }

    /// Chooses a starting position for every track point, in id order.
    fn initialize_points(&mut self, rng: &mut StdRng, tracks: &HashMap<TrackId, Track>) {
        let mut track_ids: Vec<TrackId> = tracks.keys().copied().collect();
        track_ids.sort_unstable();

        for track_id in track_ids {
            let xyz = if self.options.generate_random_points {
                self.options.points_bbox.sample(rng)
            } else {
                let xyz = tracks[&track_id].xyz;
                match &self.bbox_from_prior {
                    Some(alignment) => alignment.transform_point(&xyz).coords,
                    None => xyz.coords,
                }
            };
            self.init_points.insert(track_id, xyz);
        }
    }

    /// Adds one direction constraint per usable view-graph edge.
    fn add_camera_to_camera_constraints(
        &mut self,
        view_graph: &ViewGraph,
        images: &HashMap<ImageId, Image>,
    ) {
        let loss = self.options.loss();
        for pair in &view_graph.image_pairs {
            if !pair.is_valid {
                continue;
            }
            let (Some(image1), Some(image2)) = (
                images.get(&pair.image_id1),
                images.get(&pair.image_id2),
            ) else {
                continue;
            };
            if !image1.is_registered || !image2.is_registered {
                continue;
            }

            // World direction from center 1 to center 2: -(R2^T t21).
            let direction = -(image2
                .cam_from_world
                .rotation
                .inverse()
                .transform_vector(&pair.cam2_from_cam1.translation.vector));
            let norm = direction.norm();
            if norm < 1e-12 {
                debug!(
                    "skipping image pair ({}, {}): degenerate translation direction",
                    pair.image_id1, pair.image_id2
                );
                continue;
            }
            let direction = direction / norm;

            let from = self.position_param(pair.image_id1);
            let to = self.position_param(pair.image_id2);
            let baseline =
                (self.init_centers[&pair.image_id2] - self.init_centers[&pair.image_id1]).norm();
            let scale = self.scale_param(baseline);

            self.ir.add_residual_block(ResidualBlock {
                params: vec![from, to, scale],
                loss,
                factor: FactorKind::PairwiseDirection {
                    direction: [direction.x, direction.y, direction.z],
                    weight: 1.0,
                },
                residual_dim: 3,
            });
            self.num_camera_to_camera += 1;
        }
    }

    /// Adds one direction constraint per usable track observation.
    fn add_point_to_camera_constraints(
        &mut self,
        cameras: &HashMap<CameraId, Camera>,
        images: &HashMap<ImageId, Image>,
        tracks: &HashMap<TrackId, Track>,
    ) -> Result<()> {
        let min_views = self.options.min_num_view_per_track.max(2);

        let mut track_ids: Vec<TrackId> = tracks.keys().copied().collect();
        track_ids.sort_unstable();

        // Tracks below the view minimum contribute nothing at all.
        let mut valid_tracks = Vec::new();
        let mut num_observations = 0usize;
        for &track_id in &track_ids {
            let track = &tracks[&track_id];
            if track.num_registered_views(images) < min_views {
                continue;
            }
            valid_tracks.push(track_id);
            num_observations += track
                .observations
                .iter()
                .filter(|obs| {
                    images
                        .get(&obs.image_id)
                        .is_some_and(|image| image.is_registered)
                })
                .count();
        }
        if valid_tracks.is_empty() {
            return Ok(());
        }

        let family_weight = match self.options.constraint_type {
            ConstraintType::PointsAndCamerasBalanced => {
                if self.num_camera_to_camera == 0 {
                    warn!(
                        "balanced weighting requested without camera-to-camera constraints; \
                         using weight 1"
                    );
                    1.0
                } else {
                    self.options.constraint_reweight_scale * self.num_camera_to_camera as f64
                        / num_observations as f64
                }
            }
            _ => 1.0,
        };
        debug!(
            "adding {} point-to-camera constraints over {} tracks (family weight {:.3e})",
            num_observations,
            valid_tracks.len(),
            family_weight
        );

        for track_id in valid_tracks {
            self.add_track_constraints(track_id, family_weight, cameras, images, tracks)?;
        }
        Ok(())
    }

    fn add_track_constraints(
        &mut self,
        track_id: TrackId,
        family_weight: f64,
        cameras: &HashMap<CameraId, Camera>,
        images: &HashMap<ImageId, Image>,
        tracks: &HashMap<TrackId, Track>,
    ) -> Result<()> {
        let track = &tracks[&track_id];
        let point = self.point_param(track_id);

        for obs in &track.observations {
            let Some(image) = images.get(&obs.image_id) else {
                continue;
            };
            if !image.is_registered {
                continue;
            }
            let camera = cameras.get(&image.camera_id).ok_or_else(|| {
                anyhow!(
                    "registered image {} references unknown camera {}",
                    image.image_id,
                    image.camera_id
                )
            })?;

            let direction = image
                .cam_from_world
                .rotation
                .inverse()
                .transform_vector(&obs.direction);
            let norm = direction.norm();
            if norm < 1e-12 {
                debug!(
                    "skipping observation of track {} in image {}: degenerate bearing",
                    track_id, obs.image_id
                );
                continue;
            }
            let direction = direction / norm;

            // Bearings from cameras without a prior focal length get half
            // weight.
            let weight = if camera.has_prior_focal_length {
                family_weight
            } else {
                0.5 * family_weight
            };
            let loss = self.options.loss().scaled(weight);

            let from = self.position_param(obs.image_id);
            let baseline =
                (self.init_points[&track_id] - self.init_centers[&obs.image_id]).norm();
            let scale = self.scale_param(baseline);

            self.ir.add_residual_block(ResidualBlock {
                params: vec![from, point, scale],
                loss,
                factor: FactorKind::PairwiseDirection {
                    direction: [direction.x, direction.y, direction.z],
                    weight,
                },
                residual_dim: 3,
            });
            self.num_point_to_camera += 1;
        }
        Ok(())
    }

    fn position_param(&mut self, image_id: ImageId) -> ParamId {
        if let Some(&id) = self.position_params.get(&image_id) {
            return id;
        }
        let name = format!("position/{image_id}");
        let fixed = if self.options.optimize_positions {
            FixedMask::all_free()
        } else {
            FixedMask::all_fixed(3)
        };
        let id = self.ir.add_param_block(&name, 3, fixed, None);
        let center = self.init_centers[&image_id];
        self.initial
            .insert(name, DVector::from_row_slice(center.as_slice()));
        self.position_params.insert(image_id, id);
        id
    }

    fn point_param(&mut self, track_id: TrackId) -> ParamId {
        if let Some(&id) = self.point_params.get(&track_id) {
            return id;
        }
        let name = format!("point/{track_id}");
        let fixed = if self.options.optimize_points {
            FixedMask::all_free()
        } else {
            FixedMask::all_fixed(3)
        };
        let id = self.ir.add_param_block(&name, 3, fixed, None);
        let xyz = self.init_points[&track_id];
        self.initial
            .insert(name, DVector::from_row_slice(xyz.as_slice()));
        self.point_params.insert(track_id, id);
        id
    }

    /// Creates the next auxiliary scale variable.
    ///
    /// Scales live in a dense per-solve arena and are never written back to
    /// the scene.
    fn scale_param(&mut self, initial_distance: f64) -> ParamId {
        let name = format!("scale/{}", self.scale_params.len());
        let fixed = if self.options.optimize_scales {
            FixedMask::all_free()
        } else {
            FixedMask::all_fixed(1)
        };
        let id = self.ir.add_param_block(
            &name,
            1,
            fixed,
            Some(vec![Bound {
                idx: 0,
                lower: MIN_SCALE,
                upper: f64::INFINITY,
            }]),
        );
        let value = if self.options.generate_scales || initial_distance <= MIN_SCALE {
            1.0
        } else {
            (1.0 / initial_distance).max(MIN_SCALE)
        };
        self.initial.insert(name, DVector::from_element(1, value));
        self.scale_params.push(id);
        id
    }

    /// Groups variables for the solver's elimination order: points and
    /// scales first, camera positions second.
    fn assign_ordering_groups(&mut self) {
        let have_point_side = !self.point_params.is_empty() || !self.scale_params.is_empty();
        let camera_group = usize::from(have_point_side);

        let point_ids: Vec<ParamId> = self.point_params.values().copied().collect();
        for id in point_ids {
            self.ir.set_ordering_group(id, 0);
        }
        for id in self.scale_params.clone() {
            self.ir.set_ordering_group(id, 0);
        }
        let position_ids: Vec<ParamId> = self.position_params.values().copied().collect();
        for id in position_ids {
            self.ir.set_ordering_group(id, camera_group);
        }
    }

    fn finish(self) -> GlobalPositioningProblem {
        GlobalPositioningProblem {
            ir: self.ir,
            initial: self.initial,
            position_params: self.position_params,
            point_params: self.point_params,
            num_camera_to_camera: self.num_camera_to_camera,
            num_point_to_camera: self.num_point_to_camera,
            bbox_from_prior: self.bbox_from_prior,
        }
    }
}

/// Similarity mapping prior positions into the cameras bounding box:
/// identity rotation, centroid to box center, extent ratio as scale.
fn fit_bbox_from_priors(priors: &[Pt3], bbox: &Aabb) -> Sim3 {
    let prior_bbox = Aabb::from_points(priors.iter().map(|p| p.coords))
        .unwrap_or_else(|| Aabb::new(Vec3::zeros(), Vec3::zeros()));
    let prior_half = prior_bbox.half_extent().norm();
    let scaling = if prior_half > f64::EPSILON {
        bbox.half_extent().norm() / prior_half
    } else {
        1.0
    };
    let translation = bbox.center() - scaling * prior_bbox.center();
    Sim3::from_parts(
        Translation3::from(translation),
        UnitQuaternion::identity(),
        scaling,
    )
}

/// Writes solved variables back into the scene.
///
/// Positions were optimized as camera centers; this restores the extrinsic
/// convention (`t = -(R c)`) and undoes the prior alignment. Blocks frozen
/// by the optimize toggles are skipped so a disabled class stays untouched.
fn convert_results(
    problem: &GlobalPositioningProblem,
    params: &HashMap<String, DVector<f64>>,
    images: &mut HashMap<ImageId, Image>,
    tracks: &mut HashMap<TrackId, Track>,
) {
    let undo = problem.bbox_from_prior.map(|alignment| alignment.inverse());

    for (image_id, param_id) in &problem.position_params {
        let block = &problem.ir.params[param_id.0];
        if block.fixed.is_all_fixed(block.dim) {
            continue;
        }
        let Some(values) = params.get(&block.name) else {
            continue;
        };
        let mut center = Pt3::new(values[0], values[1], values[2]);
        if let Some(alignment) = &undo {
            center = alignment.transform_point(&center);
        }
        if let Some(image) = images.get_mut(image_id) {
            let rotation = image.cam_from_world.rotation;
            image.cam_from_world.translation = Translation3::from(-(rotation * center.coords));
        }
    }

    for (track_id, param_id) in &problem.point_params {
        let block = &problem.ir.params[param_id.0];
        if block.fixed.is_all_fixed(block.dim) {
            continue;
        }
        let Some(values) = params.get(&block.name) else {
            continue;
        };
        let mut xyz = Pt3::new(values[0], values[1], values[2]);
        if let Some(alignment) = &undo {
            xyz = alignment.transform_point(&xyz);
        }
        if let Some(track) = tracks.get_mut(track_id) {
            track.xyz = xyz;
        }
    }
}
