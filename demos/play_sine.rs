//! # Play Sine
//!
//! Play a 440Hz sine at half speed through the default audio device, with
//! a second model panned hard left.
//!
//! **Concepts:** Engine setup, models, play parameters, time stretch
//!
//! ```bash
//! cargo run --example play_sine
//! ```

use ripieno::prelude::*;
use std::time::Duration;

fn sine(frequency: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
    let frames = (sample_rate as f32 * seconds) as usize;
    (0..frames)
        .map(|i| (std::f32::consts::TAU * frequency * i as f32 / sample_rate as f32).sin() * 0.4)
        .collect()
}

fn main() -> ripieno::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let engine = RipienoEngine::builder().build()?;
    println!(
        "Output: {} at {} Hz",
        engine.backend_name(),
        engine.sample_rate()
    );

    let tone = MemoryModel::mono(44100, sine(440.0, 44100, 3.0)).into_shared();
    let fifth = MemoryModel::mono(44100, sine(660.0, 44100, 3.0)).into_shared();
    engine.add_model(&tone)?;
    engine.add_model(&fifth)?;
    engine
        .source()
        .play_parameters()
        .get_or_create(ModelId::of(&fifth))
        .set_pan(-1.0);

    engine.source().set_time_stretch(2.0);
    engine.play(0)?;

    let events = engine.events();
    while engine.is_playing() {
        if let Ok(event) = events.recv_timeout(Duration::from_millis(250)) {
            println!("{event:?}");
        }
        println!("frame {}", engine.current_frame());
    }

    Ok(())
}
