use litho_stack::{
    Algorithm, Filament, HistogramEntry, OptimizerOptions, PlanConfig, PlanError, PlanRequest, PlanWorker, Planner,
    ResolvedAlgorithm, ZoneTermination,
};

fn dark_white() -> Vec<Filament> {
    vec![
        Filament::from_hex("white", "#ffffff", 2.0),
        Filament::from_hex("dark", "#000000", 1.0),
    ]
}

fn black_and_white() -> Vec<HistogramEntry> {
    vec![
        HistogramEntry::from_hex("#000000", 500),
        HistogramEntry::from_hex("#ffffff", 500),
    ]
}

#[test]
fn two_filaments_unlimited_height() {
    let request = PlanRequest::new(dark_white(), black_and_white(), PlanConfig::default());
    let result = litho_stack::plan(&request).unwrap();

    let ids: Vec<&str> = result.filament_order.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, ["dark", "white"]);
    assert_eq!(result.color_order, vec![1, 0]);

    assert_eq!(result.zones.len(), 2);
    let foundation = &result.zones[0];
    assert_eq!(foundation.termination, ZoneTermination::Foundation);
    assert!((foundation.actual_thickness - 1.3).abs() < 1e-9);

    let white = &result.zones[1];
    assert!(white.actual_thickness <= 1.4 + 1e-9);
    assert_eq!(result.compression_ratio, 1.0);
    assert_eq!(result.total_height, result.ideal_height);
    assert!(result.auto_height >= result.ideal_height - 1e-9);

    assert!(!result.layers.is_empty());
    assert!(!result.truncated);
    assert!(result.optimizer.is_none());
    assert_eq!(result.color_slice_heights.len(), 2);
    assert_eq!(result.filament_swatches[0], rgb::RGB8::new(0, 0, 0));
}

#[test]
fn height_budget_compresses_uniformly() {
    let unlimited = litho_stack::plan(&PlanRequest::new(
        dark_white(),
        black_and_white(),
        PlanConfig::default(),
    ))
    .unwrap();

    let config = PlanConfig::new().max_height(1.5);
    let result = litho_stack::plan(&PlanRequest::new(dark_white(), black_and_white(), config)).unwrap();

    assert!(result.compression_ratio < 1.0);
    assert!((result.compression_ratio - 1.5 / result.ideal_height).abs() < 1e-12);
    assert_eq!(result.total_height, 1.5);
    assert_eq!(result.zones.last().map(|z| z.end_height), Some(1.5));
    assert_eq!(result.ideal_height, unlimited.ideal_height);

    for zone in &result.zones {
        let expected = zone.ideal_thickness * result.compression_ratio;
        assert!((zone.actual_thickness - expected).abs() < 1e-12);
    }
    assert!(result.layers.iter().all(|l| l.top_height <= 1.5 + 1e-9));
}

#[test]
fn budget_above_ideal_is_ignored() {
    let config = PlanConfig::new().max_height(50.0);
    let result = litho_stack::plan(&PlanRequest::new(dark_white(), black_and_white(), config)).unwrap();
    assert_eq!(result.compression_ratio, 1.0);
    assert_eq!(result.total_height, result.ideal_height);
}

#[test]
fn nothing_to_plan() {
    let no_filaments = PlanRequest::new(Vec::new(), black_and_white(), PlanConfig::default());
    let no_colors = PlanRequest::new(dark_white(), Vec::new(), PlanConfig::default());
    let zero_pixels = PlanRequest::new(
        dark_white(),
        vec![HistogramEntry::from_hex("#123456", 0)],
        PlanConfig::default(),
    );

    for request in [no_filaments, no_colors, zero_pixels] {
        let result = litho_stack::plan(&request).unwrap();
        assert_eq!(result.total_height, 0.0);
        assert!(result.zones.is_empty());
        assert!(result.layers.is_empty());
    }
}

#[test]
fn zones_stack_without_gaps() {
    let filaments = vec![
        Filament::from_hex("k", "#111111", 0.6),
        Filament::from_hex("b", "#1e50c8", 1.2),
        Filament::from_hex("y", "#f0e040", 3.5),
        Filament::from_hex("w", "#fafafa", 2.2),
    ];
    let histogram = vec![
        HistogramEntry::from_hex("#202020", 40),
        HistogramEntry::from_hex("#3060b0", 25),
        HistogramEntry::from_hex("#e8e070", 20),
        HistogramEntry::from_hex("#ffffff", 15),
    ];
    for config in [PlanConfig::default(), PlanConfig::new().max_height(2.0)] {
        let result = litho_stack::plan(&PlanRequest::new(filaments.clone(), histogram.clone(), config)).unwrap();
        assert_eq!(result.zones[0].start_height, 0.0);
        for pair in result.zones.windows(2) {
            assert!((pair[1].start_height - pair[0].end_height).abs() < 1e-9);
        }
        assert_eq!(result.zones.last().map(|z| z.end_height), Some(result.total_height));
    }
}

#[test]
fn luminance_order_is_darkest_first() {
    let filaments = vec![
        Filament::from_hex("y", "#f0e040", 3.5),
        Filament::from_hex("k", "#111111", 0.6),
        Filament::from_hex("b", "#1e50c8", 1.2),
    ];
    let histogram = vec![HistogramEntry::from_hex("#808080", 10)];
    let result = litho_stack::plan(&PlanRequest::new(filaments, histogram, PlanConfig::default())).unwrap();
    let ids: Vec<&str> = result.filament_order.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, ["k", "b", "y"]);
    assert_eq!(result.color_order, vec![1, 2, 0]);
}

#[test]
fn td_scale_thins_foundation() {
    let config = PlanConfig::new().td_scale(0.5);
    let result = litho_stack::plan(&PlanRequest::new(dark_white(), black_and_white(), config)).unwrap();
    // 1.3 × (1.0 × 0.5)
    assert!((result.zones[0].actual_thickness - 0.65).abs() < 1e-9);
}

#[test]
fn invalid_td_scale_is_rejected() {
    let config = PlanConfig::new().td_scale(0.0);
    let err = litho_stack::plan(&PlanRequest::new(dark_white(), black_and_white(), config));
    assert!(matches!(err, Err(PlanError::InvalidOption { name: "tdScale", .. })));
}

#[test]
fn enhanced_match_reports_optimizer() {
    let config = PlanConfig::new()
        .enhanced_color_match(true)
        .optimizer(OptimizerOptions::new().seed(42));
    let result = litho_stack::plan(&PlanRequest::new(dark_white(), black_and_white(), config)).unwrap();

    let meta = result.optimizer.as_ref().unwrap();
    assert_eq!(meta.algorithm, ResolvedAlgorithm::Exhaustive);
    assert!(meta.converged);
    assert!(!meta.cache_hit);
    assert!(meta.score.is_finite());
    assert!(!result.zones.is_empty());
}

#[test]
fn planner_caches_seeded_requests() {
    let planner = Planner::default();
    let config = PlanConfig::new()
        .enhanced_color_match(true)
        .optimizer(OptimizerOptions::new().algorithm(Algorithm::SimulatedAnnealing).seed(9).max_iterations(200));
    let request = PlanRequest::new(dark_white(), black_and_white(), config);

    let first = planner.plan(&request).unwrap();
    let second = planner.plan(&request).unwrap();
    assert_eq!(first.optimizer.as_ref().map(|m| m.cache_hit), Some(false));
    assert_eq!(second.optimizer.as_ref().map(|m| m.cache_hit), Some(true));
    assert_eq!(first.filament_order, second.filament_order);
    assert_eq!(planner.optimizer().cached_results(), 1);
}

#[test]
fn request_from_json() {
    let json = r##"{
        "filaments": [
            {"id": "white", "color": "#FFFFFF", "transmissionDistance": 2.0, "brand": "Acme"},
            {"id": "dark", "color": "#000", "transmissionDistance": 1.0}
        ],
        "histogram": [
            {"hexColor": "#000000", "pixelCount": 500},
            {"hexColor": "#ffffff", "pixelCount": 500, "importance": 1.0}
        ],
        "config": {
            "maxHeight": 1.5,
            "enhancedColorMatch": true,
            "optimizer": {"algorithm": "greedy", "seed": 3}
        }
    }"##;
    let request: PlanRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.filaments[1].color, rgb::RGB8::new(0, 0, 0));
    assert_eq!(request.filaments[0].brand.as_deref(), Some("Acme"));
    assert_eq!(request.config.layer_height, 0.12);
    assert_eq!(request.config.optimizer.algorithm, Algorithm::Greedy);

    let result = litho_stack::plan(&request).unwrap();
    assert_eq!(result.total_height, 1.5);
    assert_eq!(
        result.optimizer.as_ref().map(|m| m.algorithm),
        Some(ResolvedAlgorithm::Greedy)
    );

    let out = serde_json::to_value(&result).unwrap();
    assert!(out["filamentSwatches"][0].as_str().unwrap().starts_with('#'));
    assert!(out.get("compressionRatio").is_some());
}

#[test]
fn unknown_algorithm_in_json_is_an_error() {
    let json = r#"{"config": {"optimizer": {"algorithm": "brute-force"}}}"#;
    assert!(serde_json::from_str::<PlanRequest>(json).is_err());
}

#[test]
fn worker_returns_only_latest() {
    let mut worker = PlanWorker::new();
    let stale = worker
        .submit(PlanRequest::new(dark_white(), black_and_white(), PlanConfig::default()))
        .unwrap();
    let latest = worker
        .submit(PlanRequest::new(
            dark_white(),
            black_and_white(),
            PlanConfig::new().max_height(1.0),
        ))
        .unwrap();

    assert!(matches!(worker.wait(stale), Err(PlanError::Superseded { .. })));
    let result = worker.wait(latest).unwrap();
    assert_eq!(result.total_height, 1.0);
}

#[test]
fn near_clear_filament_finishes_with_truncated_layers() {
    let filaments = vec![
        Filament::from_hex("dark", "#000000", 1.0),
        Filament::from_hex("clear", "#ffffff", 1e9),
    ];
    let result = litho_stack::plan(&PlanRequest::new(filaments, black_and_white(), PlanConfig::default())).unwrap();
    assert_eq!(result.zones[1].termination, ZoneTermination::Capped);
    assert!(result.truncated);
    assert_eq!(result.layers.len(), litho_stack::zones::MAX_LAYERS);
}

#[test]
fn tiny_layer_height_still_plans() {
    let config = PlanConfig::new().layer_height(1e-6);
    let result = litho_stack::plan(&PlanRequest::new(dark_white(), black_and_white(), config)).unwrap();
    assert!((result.zones[1].ideal_thickness - 1.4).abs() < 1e-9);
    assert!(result.layers.len() <= litho_stack::zones::MAX_LAYERS);
}

#[test]
fn non_finite_inputs_are_rejected() {
    let filaments = vec![
        Filament::from_hex("dark", "#000000", 1.0),
        Filament::from_hex("clear", "#ffffff", f64::INFINITY),
    ];
    let err = litho_stack::plan(&PlanRequest::new(filaments, black_and_white(), PlanConfig::default()));
    assert!(matches!(
        err,
        Err(PlanError::InvalidOption { name: "transmissionDistance", .. })
    ));

    let config = PlanConfig::new().layer_height(f64::NAN);
    let err = litho_stack::plan(&PlanRequest::new(dark_white(), black_and_white(), config));
    assert!(matches!(err, Err(PlanError::InvalidOption { name: "layerHeight", .. })));
}

#[test]
fn color_order_survives_duplicate_ids() {
    let filaments = vec![
        Filament::from_hex("pla", "#f5f5f5", 2.0),
        Filament::from_hex("pla", "#101010", 0.8),
    ];
    let result = litho_stack::plan(&PlanRequest::new(filaments.clone(), black_and_white(), PlanConfig::default())).unwrap();
    assert_eq!(result.color_order, vec![1, 0]);

    let config = PlanConfig::new()
        .enhanced_color_match(true)
        .optimizer(OptimizerOptions::new().seed(5));
    let result = litho_stack::plan(&PlanRequest::new(filaments.clone(), black_and_white(), config)).unwrap();
    assert_eq!(result.color_order.len(), result.zones.len());
    for (zone, &i) in result.zones.iter().zip(&result.color_order) {
        assert_eq!(zone.color, filaments[i].color);
    }
}
