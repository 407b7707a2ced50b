use rgb::RGB8;
use serde::{Deserialize, Serialize};

use crate::color::{Lab, hex_color, rgb_to_lab};

/// One bucket of the image color histogram.
///
/// `importance` scales the pixel count. It is computed upstream by whatever
/// region-weighting stage the caller runs. The default is 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramEntry {
    #[serde(rename = "hexColor", with = "hex_color")]
    pub color: RGB8,
    pub pixel_count: u64,
    #[serde(default = "default_importance")]
    pub importance: f64,
}

fn default_importance() -> f64 {
    1.0
}

impl HistogramEntry {
    pub fn new(color: RGB8, pixel_count: u64) -> Self {
        Self {
            color,
            pixel_count,
            importance: 1.0,
        }
    }

    pub fn from_hex(hex: &str, pixel_count: u64) -> Self {
        Self::new(crate::color::hex_to_rgb(hex), pixel_count)
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Effective pixel weight. Negative or non-finite importance counts as zero.
    fn weight(&self) -> f64 {
        let importance = if self.importance.is_finite() {
            self.importance.max(0.0)
        } else {
            0.0
        };
        self.pixel_count as f64 * importance
    }
}

/// A cluster centroid with its share of the image.
///
/// Weights from one [`cluster_colors`] call sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedLabTarget {
    pub l: f64,
    pub a: f64,
    pub b: f64,
    pub weight: f64,
}

impl WeightedLabTarget {
    pub fn lab(&self) -> Lab {
        Lab::new(self.l, self.a, self.b)
    }
}

/// Clustering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterConfig {
    /// ΔE below which a color merges into an existing cluster.
    pub merge_threshold: f64,
    /// Maximum number of clusters; further colors are merged into the nearest one.
    pub max_clusters: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 5.0,
            max_clusters: 32,
        }
    }
}

impl ClusterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_threshold(mut self, delta_e: f64) -> Self {
        self.merge_threshold = delta_e;
        self
    }

    pub fn max_clusters(mut self, n: usize) -> Self {
        self.max_clusters = n;
        self
    }
}

/// Running weighted centroid of one cluster.
#[derive(Debug, Clone)]
struct Cluster {
    centroid: Lab,
    weight: f64,
}

impl Cluster {
    fn absorb(&mut self, lab: Lab, weight: f64) {
        let total = self.weight + weight;
        if total <= 0.0 {
            return;
        }
        self.centroid = Lab::new(
            (self.centroid.l * self.weight + lab.l * weight) / total,
            (self.centroid.a * self.weight + lab.a * weight) / total,
            (self.centroid.b * self.weight + lab.b * weight) / total,
        );
        self.weight = total;
    }
}

/// Reduce a color histogram to at most `max_clusters` weighted Lab targets.
///
/// Entries are visited heaviest first. Each joins its nearest cluster when that
/// cluster is within `merge_threshold`, otherwise opens a new one; once the cap
/// is reached everything merges into the nearest cluster. Returns an empty list
/// when the histogram carries no weight.
pub fn cluster_colors(histogram: &[HistogramEntry], config: &ClusterConfig) -> Vec<WeightedLabTarget> {
    let mut items: Vec<(Lab, f64, RGB8)> = histogram
        .iter()
        .filter_map(|e| {
            let w = e.weight();
            (w > 0.0).then(|| (rgb_to_lab(e.color), w, e.color))
        })
        .collect();

    if items.is_empty() {
        return Vec::new();
    }

    // Heaviest first; color breaks ties so the result never depends on input order.
    items.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| (a.2.r, a.2.g, a.2.b).cmp(&(b.2.r, b.2.g, b.2.b)))
    });

    let max_clusters = config.max_clusters.max(1);
    let mut clusters: Vec<Cluster> = Vec::with_capacity(max_clusters);

    for (lab, weight, _) in items {
        let nearest = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.centroid.delta_e(lab)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((i, d)) if d < config.merge_threshold || clusters.len() >= max_clusters => {
                clusters[i].absorb(lab, weight);
            }
            _ => clusters.push(Cluster {
                centroid: lab,
                weight,
            }),
        }
    }

    let total: f64 = clusters.iter().map(|c| c.weight).sum();

    clusters
        .into_iter()
        .map(|c| WeightedLabTarget {
            l: c.centroid.l,
            a: c.centroid.a,
            b: c.centroid.b,
            weight: c.weight / total,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight_sum(targets: &[WeightedLabTarget]) -> f64 {
        targets.iter().map(|t| t.weight).sum()
    }

    #[test]
    fn empty_histogram() {
        assert!(cluster_colors(&[], &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn zero_count_histogram_is_empty() {
        let hist = [
            HistogramEntry::from_hex("#000000", 0),
            HistogramEntry::from_hex("#ffffff", 0),
        ];
        assert!(cluster_colors(&hist, &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn distinct_colors_stay_separate() {
        let hist = [
            HistogramEntry::from_hex("#000000", 50),
            HistogramEntry::from_hex("#ffffff", 50),
        ];
        let targets = cluster_colors(&hist, &ClusterConfig::default());
        assert_eq!(targets.len(), 2);
        assert!((targets[0].weight - 0.5).abs() < 1e-12);
        assert!((weight_sum(&targets) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn near_colors_merge_with_weighted_centroid() {
        let hist = [
            HistogramEntry::from_hex("#808080", 300),
            HistogramEntry::from_hex("#828282", 100),
        ];
        let targets = cluster_colors(&hist, &ClusterConfig::default());
        assert_eq!(targets.len(), 1);
        assert!((targets[0].weight - 1.0).abs() < 1e-12);

        let a = rgb_to_lab(RGB8::new(0x80, 0x80, 0x80));
        let b = rgb_to_lab(RGB8::new(0x82, 0x82, 0x82));
        let expected_l = (a.l * 300.0 + b.l * 100.0) / 400.0;
        assert!((targets[0].l - expected_l).abs() < 1e-9);
    }

    #[test]
    fn cap_forces_merge_into_nearest() {
        let hist: Vec<HistogramEntry> = (0..20u8)
            .map(|i| HistogramEntry::new(RGB8::new(i * 12, 255 - i * 12, i * 5), 10 + i as u64))
            .collect();
        let config = ClusterConfig::new().max_clusters(4);
        let targets = cluster_colors(&hist, &config);
        assert_eq!(targets.len(), 4);
        assert!((weight_sum(&targets) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn weights_sum_to_one_for_many_colors() {
        let hist: Vec<HistogramEntry> = (0..200u32)
            .map(|i| {
                let v = (i * 37 % 256) as u8;
                HistogramEntry::new(RGB8::new(v, (i % 256) as u8, 255 - v), (i as u64 % 17) + 1)
            })
            .collect();
        let targets = cluster_colors(&hist, &ClusterConfig::default());
        assert!(!targets.is_empty());
        assert!(targets.len() <= 32);
        assert!((weight_sum(&targets) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn importance_shifts_weight() {
        let hist = [
            HistogramEntry::from_hex("#000000", 50),
            HistogramEntry::from_hex("#ffffff", 50).with_importance(3.0),
        ];
        let targets = cluster_colors(&hist, &ClusterConfig::default());
        assert_eq!(targets.len(), 2);
        // heaviest cluster comes first
        assert!(targets[0].l > 90.0);
        assert!((targets[0].weight - 0.75).abs() < 1e-12);
    }

    #[test]
    fn input_order_does_not_matter() {
        let a = [
            HistogramEntry::from_hex("#ff0000", 10),
            HistogramEntry::from_hex("#00ff00", 10),
            HistogramEntry::from_hex("#0000ff", 30),
        ];
        let mut b = a.clone();
        b.reverse();
        let config = ClusterConfig::default();
        assert_eq!(cluster_colors(&a, &config), cluster_colors(&b, &config));
    }
}
