//! Real-time path integration tests
//!
//! Stalled fill threads, model churn during pulls and bounded pull times.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use ripieno::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A stalled fill thread still yields full-size silent buffers and at
/// most one underrun notification for the episode.
#[test]
fn test_stalled_fill_yields_silence() {
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let events = rig.source.events();
    let gated = GatedModel::new(MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.5; 44100]), 4096);
    let model: Arc<dyn Model> = gated.clone();
    rig.source.add_model(&model).unwrap();

    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 4096));

    // Drain what was buffered before the gate.
    for _ in 0..8 {
        let (received, audio) = rig.pull(512);
        assert_eq!(received, 512);
        assert_has_audio(&audio, 0.4);
    }

    // The fill thread is parked inside the model now.
    for _ in 0..20 {
        let started = Instant::now();
        let (received, audio) = rig.pull(512);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(received, 0);
        assert_eq!(audio.len(), 512);
        assert_silence(&audio, SILENCE_THRESHOLD);
    }
    assert_eq!(rig.source.underrun_count(), 1);
    assert!(rig.source.is_playing());

    gated.open();
    assert!(wait_for_buffered(&rig.source, 512));
    let (received, audio) = rig.pull(512);
    assert_eq!(received, 512);
    assert_has_audio(&audio, 0.4);

    rig.source.stop();
    let underruns = events
        .try_iter()
        .filter(|e| matches!(e, PlaybackEvent::Underrun { .. }))
        .count();
    assert!(underruns <= 1, "{underruns} underrun events for one stall");
}

/// Pulls stay bounded by the block size while models come and go.
#[test]
fn test_model_churn_during_pulls() {
    const BLOCK: usize = 256;
    let mut rig = ManualRig::new(TEST_SAMPLE_RATE, BLOCK);
    let anchor = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.1; 441000]).into_shared();
    rig.source.add_model(&anchor).unwrap();
    rig.source.play(0).unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let churn = {
        let source = Arc::clone(&rig.source);
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            let mut round = 0usize;
            while running.load(Ordering::Relaxed) {
                let channels = 1 + round % 3;
                let model = MemoryModel::new(TEST_SAMPLE_RATE, vec![vec![0.2; 20000]; channels])
                    .into_shared();
                source.add_model(&model).unwrap();
                std::thread::sleep(Duration::from_millis(1));
                assert!(source.remove_model(&model));
                round += 1;
            }
            round
        })
    };

    for _ in 0..400 {
        let started = Instant::now();
        let received = rig.target.process(BLOCK);
        assert!(received <= BLOCK);
        assert!(started.elapsed() < Duration::from_millis(100));
        for channel in 0..rig.target.channel_count() {
            assert_eq!(rig.target.channel(channel).len(), BLOCK);
        }
        std::thread::sleep(Duration::from_micros(200));
    }

    running.store(false, Ordering::Relaxed);
    let rounds = churn.join().unwrap();
    assert!(rounds > 0);
    assert!(rig.source.remove_model(&anchor));
    rig.source.stop();
    assert_eq!(rig.source.state(), PlayState::Ready);
}

/// Oversized pulls are clamped to the buffers handed in.
#[test]
fn test_pull_larger_than_buffers() {
    use ripieno::CallbackSource;

    let rig = ManualRig::new(TEST_SAMPLE_RATE, 512);
    let model = MemoryModel::mono(TEST_SAMPLE_RATE, vec![0.5; 8192]).into_shared();
    rig.source.add_model(&model).unwrap();
    rig.source.play(0).unwrap();
    assert!(wait_for_buffered(&rig.source, 512));

    let mut buffers = vec![vec![1.0; 256]; 2];
    let received = rig.source.get_source_samples(1024, &mut buffers);
    assert!(received <= 256);
    rig.source.stop();
}
