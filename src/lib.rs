#![forbid(unsafe_code)]

//! Layer-stack planning for multi-filament backlit lithophanes.
//!
//! Given semi-transparent filaments and an image's color histogram, the
//! planner picks and orders filaments, sizes each transition zone with a
//! Beer-Lambert blend simulation, and fits the stack into an optional height
//! budget.

pub mod annealing;
pub mod cache;
pub mod cluster;
pub mod color;
pub mod error;
pub mod filament;
pub mod genetic;
pub mod layers;
pub mod optimizer;
pub mod rng;
pub mod scoring;
pub mod search;
pub mod worker;
pub mod zones;

pub use cluster::{ClusterConfig, HistogramEntry, WeightedLabTarget};
pub use error::PlanError;
pub use filament::Filament;
pub use layers::{AutoPaintResult, OptimizerMetadata, PaintLayer, Swatch};
pub use optimizer::{Algorithm, Optimizer, OptimizerOptions, OptimizerResult, ResolvedAlgorithm};
pub use worker::{PlanHandle, PlanResponse, PlanWorker};
pub use zones::{TransitionZone, ZoneSettings, ZoneTermination};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for one planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanConfig {
    /// Height of every layer after the first (mm).
    pub layer_height: f64,
    /// Height of the first layer (mm).
    pub first_layer_height: f64,
    /// Minimum foundation thickness (mm).
    pub base_thickness: f64,
    /// Height budget. `None` or a non-positive value means unlimited.
    pub max_height: Option<f64>,
    /// Multiplier on every filament's TD; below 1 approximates front-lit viewing.
    pub td_scale: f64,
    /// Search for the best order/subset instead of sorting by luminance.
    pub enhanced_color_match: bool,
    pub cluster: ClusterConfig,
    pub optimizer: OptimizerOptions,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            layer_height: 0.12,
            first_layer_height: 0.2,
            base_thickness: 0.2,
            max_height: None,
            td_scale: 1.0,
            enhanced_color_match: false,
            cluster: ClusterConfig::default(),
            optimizer: OptimizerOptions::default(),
        }
    }
}

impl PlanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer_height(mut self, mm: f64) -> Self {
        self.layer_height = mm;
        self
    }

    pub fn first_layer_height(mut self, mm: f64) -> Self {
        self.first_layer_height = mm;
        self
    }

    pub fn base_thickness(mut self, mm: f64) -> Self {
        self.base_thickness = mm;
        self
    }

    pub fn max_height(mut self, mm: f64) -> Self {
        self.max_height = Some(mm);
        self
    }

    pub fn td_scale(mut self, scale: f64) -> Self {
        self.td_scale = scale;
        self
    }

    pub fn enhanced_color_match(mut self, enabled: bool) -> Self {
        self.enhanced_color_match = enabled;
        self
    }

    pub fn cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn optimizer(mut self, options: OptimizerOptions) -> Self {
        self.optimizer = options;
        self
    }

    pub fn zone_settings(&self) -> ZoneSettings {
        ZoneSettings {
            layer_height: self.layer_height,
            first_layer_height: self.first_layer_height,
            base_thickness: self.base_thickness,
        }
    }

    /// Reject settings that are configuration mistakes rather than degenerate inputs.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !(self.td_scale > 0.0 && self.td_scale.is_finite()) {
            return Err(PlanError::InvalidOption {
                name: "tdScale",
                value: self.td_scale,
            });
        }
        for (name, value) in [
            ("layerHeight", self.layer_height),
            ("firstLayerHeight", self.first_layer_height),
            ("baseThickness", self.base_thickness),
        ] {
            if !value.is_finite() {
                return Err(PlanError::InvalidOption { name, value });
            }
        }
        self.optimizer.validate()
    }
}

/// Everything one planning run needs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanRequest {
    pub filaments: Vec<Filament>,
    pub histogram: Vec<HistogramEntry>,
    pub config: PlanConfig,
}

impl PlanRequest {
    pub fn new(filaments: Vec<Filament>, histogram: Vec<HistogramEntry>, config: PlanConfig) -> Self {
        Self {
            filaments,
            histogram,
            config,
        }
    }
}

fn plan_with(request: &PlanRequest, optimizer: Option<&Optimizer>) -> Result<AutoPaintResult, PlanError> {
    let config = &request.config;
    config.validate()?;
    let filaments: Vec<Filament> = request
        .filaments
        .iter()
        .map(|f| f.scaled_td(config.td_scale))
        .collect();
    filament::validate_filaments(&filaments)?;

    // 1. Cluster the image into weighted Lab targets
    let targets = cluster::cluster_colors(&request.histogram, &config.cluster);
    if filaments.is_empty() || targets.is_empty() {
        debug!(
            filaments = filaments.len(),
            targets = targets.len(),
            "nothing to plan"
        );
        return Ok(AutoPaintResult::empty());
    }

    let settings = config.zone_settings();

    // 2. Choose the sequence, as indices into the request's filaments
    let (color_order, metadata) = if config.enhanced_color_match {
        let result = match optimizer {
            Some(optimizer) => optimizer.optimize(&filaments, &targets, &settings, &config.optimizer)?,
            None => optimizer::optimize(&filaments, &targets, &settings, &config.optimizer)?,
        };
        let metadata = OptimizerMetadata::from(&result);
        (result.input_order, Some(metadata))
    } else {
        (filament::luminance_order(&filaments), None)
    };
    let order: Vec<Filament> = color_order.iter().map(|&i| filaments[i].clone()).collect();

    // 3. Simulate and fit the stack
    let ideal = zones::calculate_transition_zones(&order, &settings);
    let compressed = zones::compress_zones(&ideal, config.max_height);

    // 4. Derived per-layer view
    let (layers, truncated) = layers::build_layers(&compressed.zones, &settings);
    let virtual_swatches = layers::virtual_swatches(&layers);

    debug!(
        zones = compressed.zones.len(),
        ideal_height = compressed.ideal_height,
        total_height = compressed.total_height,
        ratio = compressed.ratio,
        "plan complete"
    );

    Ok(AutoPaintResult {
        color_slice_heights: compressed.zones.iter().map(|z| z.actual_thickness).collect(),
        filament_swatches: compressed.zones.iter().map(|z| z.color).collect(),
        auto_height: layers::snap_to_layers(compressed.ideal_height, &settings),
        total_height: compressed.total_height,
        ideal_height: compressed.ideal_height,
        compression_ratio: compressed.ratio,
        zones: compressed.zones,
        layers,
        filament_order: order,
        color_order,
        virtual_swatches,
        optimizer: metadata,
        truncated,
    })
}

/// Plan a layer stack. Optimizer results are never cached.
pub fn plan(request: &PlanRequest) -> Result<AutoPaintResult, PlanError> {
    plan_with(request, None)
}

/// Long-lived planner whose optimizer keeps a result cache across requests.
#[derive(Debug, Default)]
pub struct Planner {
    optimizer: Optimizer,
}

impl Planner {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            optimizer: Optimizer::new(cache_capacity),
        }
    }

    pub fn plan(&self, request: &PlanRequest) -> Result<AutoPaintResult, PlanError> {
        plan_with(request, Some(&self.optimizer))
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }
}
