//! Mixing integration tests
//!
//! Exact round trips at matching rates and per-model play parameters.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use approx::assert_abs_diff_eq;
use ripieno::prelude::*;
use std::collections::HashSet;

/// One 44100 Hz mono model, 1024-frame blocks at 44100 Hz: ten pulls
/// return exactly the first 10240 samples.
#[test]
fn test_exact_round_trip_at_unity_ratio() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, TEST_BLOCK_SIZE);
    let samples = generate_sine(441.0, TEST_SAMPLE_RATE, 44100);
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, samples.clone()).into_shared();
    rig.source.add_model(&model).unwrap();

    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 10 * TEST_BLOCK_SIZE));

    let mut left = Vec::new();
    let mut right = Vec::new();
    for _ in 0..10 {
        assert_eq!(rig.target.process(TEST_BLOCK_SIZE), TEST_BLOCK_SIZE);
        left.extend_from_slice(rig.target.channel(0));
        right.extend_from_slice(rig.target.channel(1));
    }

    assert_eq!(left, &samples[..10 * TEST_BLOCK_SIZE]);
    // Mono material fills both output channels.
    assert_eq!(right, left);
    assert_eq!(rig.source.underrun_count(), 0);
    rig.source.stop();
}

#[test]
fn test_round_trip_stereo_keeps_channels() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let left_in = generate_integer_staircase(8192);
    let right_in: Vec<f32> = left_in.iter().map(|s| -s).collect();
    let model =
        MemoryModel::new(TEST_SAMPLE_RATE, vec![left_in.clone(), right_in.clone()]).into_shared();
    rig.source.add_model(&model).unwrap();

    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 2048));
    for block in 0..4 {
        rig.target.process(512);
        let range = block * 512..(block + 1) * 512;
        assert_eq!(rig.target.channel(0), &left_in[range.clone()]);
        assert_eq!(rig.target.channel(1), &right_in[range]);
    }
    rig.source.stop();
}

/// Two models, A at gain 1.0 and B muted: the mix is exactly A.
#[test]
fn test_muted_model_is_silent_in_mix() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, TEST_BLOCK_SIZE);
    let a_samples = generate_sine(440.0, TEST_SAMPLE_RATE, 22050);
    let a = MemoryModel::mono(TEST_SAMPLE_RATE, a_samples.clone()).into_shared();
    let b = MemoryModel::mono(TEST_SAMPLE_RATE, generate_sine(97.0, TEST_SAMPLE_RATE, 22050))
        .into_shared();
    rig.source.add_model(&a).unwrap();
    rig.source.add_model(&b).unwrap();

    let params = rig.source.play_parameters();
    params.get_or_create(ModelId::of(&a)).set_gain(1.0);
    params.get_or_create(ModelId::of(&b)).set_muted(true);

    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 4 * TEST_BLOCK_SIZE));
    let mut mixed = Vec::new();
    for _ in 0..4 {
        rig.target.process(TEST_BLOCK_SIZE);
        mixed.extend_from_slice(rig.target.channel(0));
    }

    assert_eq!(mixed, &a_samples[..4 * TEST_BLOCK_SIZE]);
    rig.source.stop();
}

#[test]
fn test_gain_and_pan() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.8; 8192]).into_shared();
    rig.source.add_model(&model).unwrap();
    let params = rig.source.play_parameters().get_or_create(ModelId::of(&model));
    params.set_gain(0.5);
    params.set_pan(0.5);

    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 512));
    rig.target.process(512);

    // Panned right: the left channel is attenuated, the right untouched.
    for (&left, &right) in rig.target.channel(0).iter().zip(rig.target.channel(1)) {
        assert_abs_diff_eq!(left, 0.2, epsilon = FLOAT_EPSILON);
        assert_abs_diff_eq!(right, 0.4, epsilon = FLOAT_EPSILON);
    }
    rig.source.stop();
}

#[test]
fn test_solo_selects_model() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let a = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.25; 8192]).into_shared();
    let b = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.5; 8192]).into_shared();
    rig.source.add_model(&a).unwrap();
    rig.source.add_model(&b).unwrap();
    rig.source
        .play_parameters()
        .get_or_create(ModelId::of(&b))
        .set_solo(true);

    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 512));
    rig.target.process(512);
    assert!(rig.target.channel(0).iter().all(|&s| s == 0.5));
    rig.source.stop();
}

#[test]
fn test_solo_filter_restricts_mix() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let a = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.25; 8192]).into_shared();
    let b = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.5; 8192]).into_shared();
    rig.source.add_model(&a).unwrap();
    rig.source.add_model(&b).unwrap();
    rig.source
        .set_solo_model_set(HashSet::from([ModelId::of(&a)]));

    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 512));
    rig.target.process(512);
    assert!(rig.target.channel(0).iter().all(|&s| s == 0.25));
    rig.source.stop();
}

#[test]
fn test_dropped_model_stops_contributing() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let a = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.25; 8192]).into_shared();
    let b = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.5; 8192]).into_shared();
    rig.source.add_model(&a).unwrap();
    rig.source.add_model(&b).unwrap();
    drop(b);

    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 512));
    rig.target.process(512);
    assert!(rig.target.channel(0).iter().all(|&s| s == 0.25));
    rig.source.stop();
}
