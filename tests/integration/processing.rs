//! Processing integration tests
//!
//! Resampling to the target rate, time stretch, and the auditioning slot.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use ripieno::prelude::*;
use ripieno::CallbackSource;
use std::time::Duration;

#[test]
fn test_resamples_to_target_rate() {
    let mut rig = ManualRig::new(48000, 512);
    let events = rig.source.events();
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, generate_sine(441.0, TEST_SAMPLE_RATE, 44100))
        .into_shared();
    rig.source.add_model(&model).unwrap();

    let mismatches: Vec<_> = events
        .try_iter()
        .filter(|e| matches!(e, PlaybackEvent::SampleRateMismatch { .. }))
        .collect();
    assert_eq!(
        mismatches,
        vec![PlaybackEvent::SampleRateMismatch {
            requested: TEST_SAMPLE_RATE,
            available: 48000,
            will_resample: true,
        }]
    );

    rig.source.play(0).unwrap();
    let delivered = rig.pull_to_end(512);

    // One second of material is one second at the target rate.
    assert!(
        delivered.len().abs_diff(48000) <= LENGTH_TOLERANCE_FRAMES,
        "delivered {} frames",
        delivered.len()
    );
    // 441 Hz is still 441 Hz.
    let crossings = zero_crossings(&delivered[4800..43200]);
    assert!((crossings as i64 - 706).abs() <= 4, "{crossings} zero crossings");
    assert_has_audio(&delivered[4800..43200], 0.6);
    assert_eq!(rig.source.current_playing_frame(), 44100);
}

#[test]
fn test_mismatch_reported_once_per_rate_pair() {
    let rig = ManualRig::new(48000, 512);
    let events = rig.source.events();
    let a = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.0; 1000]).into_shared();
    let b = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.0; 1000]).into_shared();
    rig.source.add_model(&a).unwrap();
    rig.source.add_model(&b).unwrap();

    let mismatches = events
        .try_iter()
        .filter(|e| matches!(e, PlaybackEvent::SampleRateMismatch { .. }))
        .count();
    assert_eq!(mismatches, 1);
}

#[test]
fn test_time_stretch_keeps_pitch() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, generate_sine(441.0, TEST_SAMPLE_RATE, 22050))
        .into_shared();
    rig.source.add_model(&model).unwrap();
    rig.source.set_time_stretch(2.0);
    assert_eq!(rig.source.time_stretch(), 2.0);

    rig.source.play(0).unwrap();
    let delivered = rig.pull_to_end(512);

    // Half a second of material plays for a full second.
    assert!(
        delivered.len().abs_diff(44100) <= 441,
        "delivered {} frames",
        delivered.len()
    );
    let crossings = zero_crossings(&delivered[4410..39690]);
    let expected = 882.0 * 0.8;
    assert!(
        (crossings as f64 - expected).abs() < expected * 0.1,
        "{crossings} zero crossings, expected about {expected}"
    );
}

#[test]
fn test_time_stretch_with_resampling() {
    let mut rig = ManualRig::new(48000, 512);
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, generate_sine(300.0, TEST_SAMPLE_RATE, 22050))
        .into_shared();
    rig.source.add_model(&model).unwrap();
    rig.source.set_time_stretch(1.5);

    rig.source.play(0).unwrap();
    let delivered = rig.pull_to_end(512);

    let expected = 22050.0 * 1.5 * 48000.0 / 44100.0;
    assert!(
        (delivered.len() as f64 - expected).abs() < expected * 0.02,
        "delivered {} frames, expected about {expected}",
        delivered.len()
    );
    assert_has_audio(&delivered[4800..30000], 0.5);
}

#[test]
fn test_stretch_change_while_playing() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, generate_sine(441.0, TEST_SAMPLE_RATE, 88200))
        .into_shared();
    rig.source.add_model(&model).unwrap();
    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 4096));
    for _ in 0..8 {
        rig.pull(512);
    }

    rig.source.set_time_stretch(0.5);
    let before = rig.source.current_buffered_frame();
    assert!(wait_until(|| {
        let (received, _) = rig.pull(512);
        received == 512 && rig.source.current_buffered_frame() > before + 4096
    }));
    assert!(rig.source.is_playing());
    rig.source.stop();
}

#[test]
fn test_auditioning_effect_applies_to_output() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let samples = generate_integer_staircase(4096);
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, samples.clone()).into_shared();
    rig.source.add_model(&model).unwrap();
    rig.source
        .set_auditioning_effect(Some(Box::new(GainEffect { gain: 0.5, channels: 1 })));
    assert!(rig.source.has_auditioning_effect());

    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 512));
    rig.target.process(512);

    let expected: Vec<f32> = samples[..512].iter().map(|s| s * 0.5).collect();
    assert_eq!(rig.target.channel(0), &expected[..]);
    // The effect only takes the channels it asks for.
    assert_eq!(rig.target.channel(1), &samples[..512]);

    rig.source.set_auditioning_effect(None);
    assert!(!rig.source.has_auditioning_effect());
    assert!(wait_for_buffered(&rig.source, 512));
    rig.target.process(512);
    assert_eq!(rig.target.channel(0), &samples[512..1024]);
    rig.source.stop();
}

struct SlowEffect;

impl AuditioningEffect for SlowEffect {
    fn channel_count(&self) -> usize {
        2
    }

    fn max_block_size(&self) -> usize {
        4096
    }

    fn process(&mut self, buffers: &mut [Vec<f32>], frames: usize) {
        std::thread::sleep(Duration::from_millis(50));
        for buffer in buffers.iter_mut() {
            buffer[..frames].fill(0.0);
        }
    }
}

#[test]
fn test_slow_auditioning_effect_is_bypassed() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let events = rig.source.events();
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.5; 44100]).into_shared();
    rig.source.add_model(&model).unwrap();
    rig.source.set_auditioning_effect(Some(Box::new(SlowEffect)));

    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 1024));
    rig.target.process(512);
    assert!(rig.source.is_auditioning_bypassed());

    // Bypassed: the mix passes through untouched.
    rig.target.process(512);
    assert!(rig.target.channel(0).iter().all(|&s| (s - 0.5).abs() < FLOAT_EPSILON));

    assert!(wait_until(|| events
        .try_iter()
        .any(|e| matches!(e, PlaybackEvent::AuditioningEffectBypassed { .. }))));
    rig.source.stop();
}

#[test]
fn test_overload_sheds_effect_then_channels() {
    let rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let events = rig.source.events();
    let model = MemoryModel::new(TEST_SAMPLE_RATE, vec![vec![0.5; 441000]; 2]).into_shared();
    rig.source.add_model(&model).unwrap();
    rig.source
        .set_auditioning_effect(Some(Box::new(GainEffect { gain: 1.0, channels: 2 })));
    rig.source.set_time_stretch(0.5);
    rig.source.play(0).unwrap();

    rig.source.audio_processing_overload();
    assert!(wait_until(|| rig.source.is_auditioning_bypassed()));
    assert!(wait_until(|| events
        .try_iter()
        .any(|e| e == PlaybackEvent::AudioOverloadPluginDisabled)));

    rig.source.audio_processing_overload();
    assert!(wait_until(|| events
        .try_iter()
        .any(|e| e == PlaybackEvent::AudioTimeStretchMultiChannelDisabled)));
    rig.source.stop();
}

#[test]
fn test_target_rate_change_while_playing() {
    let config = PlaybackConfig::with_ring_buffer_frames(4096);
    let mut rig = ManualRig::with_config(config, TEST_SAMPLE_RATE, 512);
    let events = rig.source.events();
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, generate_sine(441.0, TEST_SAMPLE_RATE, 176400))
        .into_shared();
    rig.source.add_model(&model).unwrap();

    rig.source.play(0).unwrap();
    let before = rig.pull_buffered(10, 512);
    let crossings = zero_crossings(&before);
    assert!((crossings as i64 - 102).abs() <= 3, "{crossings} zero crossings");

    rig.source.set_target_sample_rate(48000);
    assert_eq!(rig.source.target_sample_rate(), 48000);
    assert!(events.try_iter().any(|e| e
        == PlaybackEvent::SampleRateMismatch {
            requested: TEST_SAMPLE_RATE,
            available: 48000,
            will_resample: true,
        }));

    // Play past anything buffered at the old rate.
    rig.pull_buffered(20, 512);
    let after = rig.pull_buffered(10, 512);
    let crossings = zero_crossings(&after);
    assert!((crossings as i64 - 94).abs() <= 3, "{crossings} zero crossings");
    assert!(rig.source.is_playing());
    rig.source.stop();
}

#[test]
fn test_resample_quality_change_keeps_position() {
    let config = PlaybackConfig::with_ring_buffer_frames(4096);
    let mut rig = ManualRig::with_config(config, 48000, 512);
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, generate_sine(441.0, TEST_SAMPLE_RATE, 176400))
        .into_shared();
    rig.source.add_model(&model).unwrap();
    assert_eq!(rig.source.resample_quality(), ResampleQuality::Good);

    rig.source.play(0).unwrap();
    rig.pull_buffered(4, 512);
    let before = rig.source.current_buffered_frame();

    rig.source.set_resample_quality(ResampleQuality::Best);
    assert_eq!(rig.source.resample_quality(), ResampleQuality::Best);
    let delivered = rig.pull_buffered(30, 512);

    // The run carries on from where it was rather than restarting.
    let expected = before as f64 + delivered.len() as f64 * TEST_SAMPLE_RATE as f64 / 48000.0;
    let after = rig.source.current_buffered_frame() as f64;
    assert!((after - expected).abs() <= 4.0, "buffered to {after}, expected {expected}");

    let crossings = zero_crossings(&delivered[10240..]);
    assert!((crossings as i64 - 94).abs() <= 3, "{crossings} zero crossings");
    rig.source.stop();
}

#[test]
fn test_playing_frame_tracks_stretched_audio() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, TEST_BLOCK_SIZE);
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, generate_integer_staircase(44100)).into_shared();
    rig.source.add_model(&model).unwrap();
    rig.source.set_time_stretch(2.0);

    rig.source.play(0).unwrap();
    let delivered = rig.pull_buffered(20, TEST_BLOCK_SIZE);

    // 20 blocks out at half speed cover 10240 source frames.
    assert_eq!(rig.source.current_buffered_frame(), 10240);
    let playing = rig.source.current_playing_frame();
    assert!((9728..=10240).contains(&playing), "playing frame {playing}");

    // Each stretched sample names the source frame it came from; the last
    // block is centred near the reported position, not a stretcher window
    // ahead of it.
    let last = &delivered[delivered.len() - TEST_BLOCK_SIZE..];
    let heard = last.iter().map(|&s| s as f64).sum::<f64>() / last.len() as f64;
    assert!(
        (heard - playing as f64).abs() < 1000.0,
        "heard around frame {heard}, reported {playing}"
    );
    rig.source.stop();
}
