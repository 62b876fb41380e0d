//! Engine lifecycle integration tests
//!
//! Tests engine creation, configuration and cleanup on the manual backend.

use crate::helpers::*;
use ripieno::prelude::*;
use ripieno::Error;

fn manual_engine() -> RipienoEngine {
    RipienoEngine::builder()
        .backend(TargetBackend::Manual)
        .sample_rate(TEST_SAMPLE_RATE)
        .block_size(TEST_BLOCK_SIZE)
        .build()
        .expect("Failed to create manual engine")
}

#[test]
fn test_engine_manual_backend() {
    let engine = manual_engine();

    assert_eq!(engine.backend_name(), "manual");
    assert_eq!(engine.sample_rate(), TEST_SAMPLE_RATE);
    assert_eq!(engine.block_size(), TEST_BLOCK_SIZE);
    assert!(engine.is_ok());
    assert_eq!(engine.source().state(), PlayState::Ready);
    assert_eq!(engine.source().target_sample_rate(), TEST_SAMPLE_RATE);
}

#[test]
fn test_engine_rejects_invalid_block_size() {
    let result = RipienoEngine::builder()
        .backend(TargetBackend::Manual)
        .block_size(0)
        .build();
    assert!(matches!(result, Err(Error::Core(_))));
}

#[test]
fn test_engine_rejects_invalid_playback_config() {
    let config = PlaybackConfig {
        headroom_multiplier: 1,
        ..PlaybackConfig::default()
    };
    let result = RipienoEngine::builder()
        .backend(TargetBackend::Manual)
        .playback_config(config)
        .build();
    assert!(matches!(result, Err(Error::Playback(_))));
}

#[test]
fn test_engine_play_without_models() {
    let engine = manual_engine();
    assert!(matches!(
        engine.play(0),
        Err(Error::Playback(ripieno::playback::Error::NoSource))
    ));
}

#[test]
fn test_engine_plays_model() {
    let mut engine = manual_engine();
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, generate_sine(440.0, TEST_SAMPLE_RATE, 44100))
        .into_shared();
    engine.add_model(&model).unwrap();

    assert_eq!(engine.play(0).unwrap(), 0);
    assert!(engine.is_playing());
    assert!(wait_for_buffered(engine.source(), TEST_BLOCK_SIZE * 4));

    for _ in 0..4 {
        assert_eq!(engine.process_block(), Some(TEST_BLOCK_SIZE));
    }
    let (left, right) = engine.source().source_levels();
    assert!(left > 0.5 && right > 0.5, "levels were {left}, {right}");

    engine.stop();
    assert!(!engine.is_playing());
    assert_eq!(engine.source().state(), PlayState::Ready);
}

#[test]
fn test_engine_shared_parameters() {
    let parameters = std::sync::Arc::new(PlayParameterRepository::new());
    let engine = RipienoEngine::builder()
        .backend(TargetBackend::Manual)
        .parameters(std::sync::Arc::clone(&parameters))
        .build()
        .unwrap();

    assert!(std::sync::Arc::ptr_eq(engine.source().play_parameters(), &parameters));
}

#[test]
fn test_engine_drop_detaches_source() {
    let engine = manual_engine();
    let source = std::sync::Arc::clone(engine.source());
    drop(engine);
    assert_eq!(source.state(), PlayState::Idle);
}
