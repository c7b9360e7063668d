use std::path::PathBuf;

use cyclemerge_core::concat::plan_stack;
use cyclemerge_core::error::CycleMergeError;
use cyclemerge_core::pipeline::config::{
    AlignmentFailurePolicy, Compression, RegistrationConfig,
};
use cyclemerge_core::pipeline::PipelineStage;
use cyclemerge_core::selection::DuplicatePolicy;

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[test]
fn test_compression_display() {
    assert_eq!(format!("{}", Compression::None), "none");
    assert_eq!(format!("{}", Compression::Zlib), "zlib");
    assert_eq!(format!("{}", Compression::Lzw), "lzw");
}

#[test]
fn test_compression_tiff_codes() {
    assert_eq!(Compression::None.tiff_code(), 1);
    assert_eq!(Compression::Lzw.tiff_code(), 5);
    assert_eq!(Compression::Zlib.tiff_code(), 8);
    assert_eq!(Compression::default(), Compression::Zlib);
}

#[test]
fn test_failure_policy_display_and_default() {
    assert_eq!(AlignmentFailurePolicy::default(), AlignmentFailurePolicy::Abort);
    assert_eq!(format!("{}", AlignmentFailurePolicy::Skip), "skip");
}

#[test]
fn test_pipeline_stage_display() {
    assert_eq!(format!("{}", PipelineStage::Discovery), "Discovering cycles");
    assert_eq!(format!("{}", PipelineStage::Alignment), "Aligning cycles");
    assert_eq!(format!("{}", PipelineStage::Writing), "Writing registered channels");
}

// ---------------------------------------------------------------------------
// TOML
// ---------------------------------------------------------------------------

#[test]
fn test_default_config_toml_round_trip() {
    let config = RegistrationConfig::default();
    let text = toml::to_string_pretty(&config).unwrap();
    let parsed: RegistrationConfig = toml::from_str(&text).unwrap();

    assert_eq!(parsed.input.pattern, config.input.pattern);
    assert_eq!(parsed.output.tile_size, config.output.tile_size);
    assert_eq!(parsed.alignment.ransac_seed, config.alignment.ransac_seed);
    assert_eq!(parsed.alignment.min_inliers, config.alignment.min_inliers);
    assert_eq!(parsed.pyramid.max_levels, config.pyramid.max_levels);
    parsed.validate().unwrap();
}

#[test]
fn test_minimal_toml_fills_defaults() {
    let text = r#"
        [input]
        dir = "cycles"
        reference_index = 1
        markers = "markers.csv"

        [output]
        path = "out/registered.ome.tif"
        compression = "Lzw"

        [selection]
        channels = "0:0,1;1:0"
        duplicates = "Reject"

        [alignment]
        level = 2
        on_failure = "Skip"
    "#;
    let config: RegistrationConfig = toml::from_str(text).unwrap();

    assert_eq!(config.input.dir, PathBuf::from("cycles"));
    assert_eq!(config.input.pattern, "*.{ome.tif,ome.tiff}");
    assert_eq!(config.input.reference_index, 1);
    assert_eq!(config.input.markers, Some(PathBuf::from("markers.csv")));
    assert_eq!(config.output.compression, Compression::Lzw);
    assert_eq!(config.output.tile_size, 512);
    assert_eq!(config.selection.channels.as_deref(), Some("0:0,1;1:0"));
    assert_eq!(config.selection.duplicates, DuplicatePolicy::Reject);
    assert_eq!(config.alignment.level, 2);
    assert_eq!(config.alignment.thumbnail_size, 2000);
    assert_eq!(config.alignment.on_failure, AlignmentFailurePolicy::Skip);
    assert_eq!(config.pyramid.min_level_size, 512);
    config.validate().unwrap();
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn assert_invalid(config: &RegistrationConfig, needle: &str) {
    match config.validate() {
        Err(CycleMergeError::InvalidConfig(msg)) => {
            assert!(msg.contains(needle), "'{}' does not mention {}", msg, needle)
        }
        other => panic!("expected InvalidConfig, got {:?}", other),
    }
}

#[test]
fn test_validation_names_the_parameter() {
    let mut config = RegistrationConfig::default();
    config.output.tile_size = 100;
    assert_invalid(&config, "output.tile_size");

    let mut config = RegistrationConfig::default();
    config.alignment.level = 9;
    assert_invalid(&config, "alignment.level");

    let mut config = RegistrationConfig::default();
    config.alignment.match_ratio = 1.5;
    assert_invalid(&config, "alignment.match_ratio");

    let mut config = RegistrationConfig::default();
    config.alignment.block_size = 16;
    assert_invalid(&config, "alignment.block_size");

    let mut config = RegistrationConfig::default();
    config.input.pixel_size = Some(-1.0);
    assert_invalid(&config, "input.pixel_size");

    let mut config = RegistrationConfig::default();
    config.pyramid.max_levels = 0;
    assert_invalid(&config, "pyramid.max_levels");
}

#[test]
fn test_configuration_errors_are_classified() {
    assert!(CycleMergeError::IndexRange { index: 5, count: 3 }.is_configuration());
    assert!(CycleMergeError::InvalidConfig("x".into()).is_configuration());
    assert!(!CycleMergeError::MissingCalibration(PathBuf::from("a")).is_configuration());
}

// ---------------------------------------------------------------------------
// Channel map serialization
// ---------------------------------------------------------------------------

#[test]
fn test_channel_map_serializes_to_json() {
    let map = plan_stack(&[vec![0, 1], vec![0]], &[]);
    let json = serde_json::to_value(&map).unwrap();
    let channels = json["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 3);
    assert_eq!(channels[2]["cycle"], 1);
    assert_eq!(channels[2]["source_channel"], 0);
    assert_eq!(channels[2]["name"], "Channel_2");
}
