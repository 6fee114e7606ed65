//! Seeded synthetic passengers.
//!
//! Walkers appear at random times, drift around the frame and vanish. Output
//! also carries the detector noise the pipeline has to absorb: shadow boxes
//! without an identity, tiny spurious boxes and non-person objects.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::DetectionSource;
use crate::detect::{RawDetection, TrackId};
use crate::session::Frame;

const PERSON_CLASS: i32 = 0;
const BAG_CLASS: i32 = 24;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub frames: u64,
    pub fps: f64,
    pub people: usize,
    pub frame_width: f32,
    pub frame_height: f32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frames: 750,
            fps: 25.0,
            people: 12,
            frame_width: 1200.0,
            frame_height: 750.0,
            seed: 7,
        }
    }
}

#[derive(Clone, Debug)]
struct Walker {
    id: TrackId,
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    width: f32,
    height: f32,
    spawn: u64,
    despawn: u64,
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    walkers: Vec<Walker>,
    next_index: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.fps.is_finite() || config.fps <= 0.0 {
            return Err(anyhow!("fps must be positive, got {}", config.fps));
        }
        if !config.frame_width.is_finite()
            || !config.frame_height.is_finite()
            || config.frame_width < 500.0
            || config.frame_height < 500.0
        {
            return Err(anyhow!(
                "synthetic frame is too small: {}x{}",
                config.frame_width,
                config.frame_height
            ));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let spawn_window = (config.frames / 2).max(1);
        let walkers = (0..config.people)
            .map(|i| {
                let spawn = rng.gen_range(0..spawn_window);
                let lifetime = rng.gen_range(100..400u64);
                Walker {
                    id: i as TrackId + 1,
                    x: rng.gen_range(100.0..config.frame_width - 100.0),
                    y: rng.gen_range(config.frame_height * 0.5..config.frame_height - 10.0),
                    vx: rng.gen_range(-4.0..4.0),
                    vy: rng.gen_range(-3.0..3.0),
                    width: rng.gen_range(50.0..90.0),
                    height: rng.gen_range(140.0..220.0),
                    spawn,
                    despawn: spawn + lifetime,
                }
            })
            .collect();

        Ok(Self {
            config,
            rng,
            walkers,
            next_index: 0,
        })
    }

    fn step_walkers(&mut self, index: u64) {
        let (fw, fh) = (self.config.frame_width, self.config.frame_height);
        for walker in self
            .walkers
            .iter_mut()
            .filter(|w| w.spawn < index && index < w.despawn)
        {
            walker.vx = (walker.vx + self.rng.gen_range(-0.5..0.5)).clamp(-5.0, 5.0);
            walker.vy = (walker.vy + self.rng.gen_range(-0.5..0.5)).clamp(-4.0, 4.0);
            walker.x = (walker.x + walker.vx).clamp(walker.width, fw - walker.width);
            walker.y = (walker.y + walker.vy).clamp(walker.height, fh - 1.0);
        }
    }

    fn boxes(&mut self, index: u64) -> Vec<RawDetection> {
        let mut out = Vec::new();
        let visible: Vec<Walker> = self
            .walkers
            .iter()
            .filter(|w| w.spawn <= index && index < w.despawn)
            .cloned()
            .collect();

        for walker in visible {
            let det = RawDetection {
                x1: walker.x - walker.width / 2.0,
                y1: walker.y - walker.height,
                x2: walker.x + walker.width / 2.0,
                y2: walker.y,
                track_id: Some(walker.id),
                confidence: self.rng.gen_range(0.55..0.98),
                class_id: PERSON_CLASS,
            };
            out.push(det);

            if self.rng.gen_bool(0.08) {
                out.push(RawDetection {
                    x1: det.x1 + 3.0,
                    y1: det.y1 + 2.0,
                    x2: det.x2 + 3.0,
                    y2: det.y2 + 2.0,
                    track_id: None,
                    confidence: det.confidence * 0.6,
                    ..det
                });
            }
            if self.rng.gen_bool(0.03) {
                out.push(RawDetection {
                    x1: det.x2,
                    y1: det.y2 - 30.0,
                    x2: det.x2 + 35.0,
                    y2: det.y2,
                    track_id: None,
                    confidence: 0.5,
                    class_id: BAG_CLASS,
                });
            }
        }

        if self.rng.gen_bool(0.05) {
            let x = self.rng.gen_range(0.0..self.config.frame_width - 10.0);
            let y = self.rng.gen_range(0.0..self.config.frame_height - 10.0);
            out.push(RawDetection {
                x1: x,
                y1: y,
                x2: x + 6.0,
                y2: y + 9.0,
                track_id: None,
                confidence: 0.3,
                class_id: PERSON_CLASS,
            });
        }
        out
    }
}

impl DetectionSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next_index >= self.config.frames {
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;

        self.step_walkers(index);
        Ok(Some(Frame {
            index,
            at: index as f64 / self.config.fps,
            detections: self.boxes(index),
        }))
    }
}
