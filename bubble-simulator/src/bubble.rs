use nalgebra::Vector2;
use rand::Rng;

/// A dark disc rising through the chamber, growing a little every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Bubble {
    /// Center as `(x, y)` in pixels.
    pub pos: Vector2<f64>,
    pub velocity: Vector2<f64>,
    pub radius: f64,
    pub growth: f64,
}

impl Bubble {
    /// Spawns a bubble near the bottom of a `size` chamber.
    pub fn spawn(rng: &mut impl Rng, size: usize) -> Self {
        let size = size as f64;
        Self {
            pos: Vector2::new(rng.gen_range(size * 0.3..size * 0.7), rng.gen_range(size * 0.6..size * 0.75)),
            velocity: Vector2::new(rng.gen_range(-0.3..0.3), rng.gen_range(-1.5..-0.5)),
            radius: rng.gen_range(2.0..4.0),
            growth: rng.gen_range(0.0..0.1),
        }
    }

    pub fn step(&mut self) {
        self.pos += self.velocity;
        self.radius += self.growth;
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (Vector2::new(x, y) - self.pos).norm_squared() <= self.radius * self.radius
    }
}

/// Pixel levels of a rendered frame.
#[derive(Debug, Clone, Copy)]
pub struct Levels {
    pub chamber: u16,
    pub surround: u16,
    pub bubble: u16,
    pub noise: u16,
}

impl Default for Levels {
    fn default() -> Self {
        Self { chamber: 48000, surround: 3000, bubble: 9000, noise: 600 }
    }
}

/// Renders one row-major `size x size` frame: a bright circular chamber,
/// dark bubbles inside it and uniform noise everywhere.
pub fn render(bubbles: &[Bubble], size: usize, levels: &Levels, rng: &mut impl Rng) -> Vec<u16> {
    let center = size as f64 / 2.0;
    let chamber_radius = size as f64 * 0.45;

    (0..size * size)
        .map(|i| {
            let (x, y) = ((i % size) as f64, (i / size) as f64);
            let in_chamber = (x - center).powi(2) + (y - center).powi(2) <= chamber_radius * chamber_radius;
            let base = if !in_chamber {
                levels.surround
            } else if bubbles.iter().any(|b| b.contains(x, y)) {
                levels.bubble
            } else {
                levels.chamber
            };
            base.saturating_add(rng.gen_range(0..=levels.noise))
        })
        .collect()
}

/// Spawns `count` bubbles and renders `frames` frames of them.
pub fn simulate(rng: &mut impl Rng, size: usize, count: usize, frames: usize, levels: &Levels) -> Vec<Vec<u16>> {
    let mut bubbles: Vec<Bubble> = (0..count).map(|_| Bubble::spawn(rng, size)).collect();
    let mut video = Vec::with_capacity(frames);
    for _ in 0..frames {
        video.push(render(&bubbles, size, levels, rng));
        bubbles.iter_mut().for_each(Bubble::step);
    }
    video
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn bubbles_are_darker_than_the_chamber() {
        let bubble = Bubble { pos: Vector2::new(16.0, 16.0), velocity: Vector2::zeros(), radius: 3.0, growth: 0.0 };
        let levels = Levels { noise: 0, ..Levels::default() };
        let frame = render(&[bubble], 32, &levels, &mut StdRng::seed_from_u64(1));

        assert_eq!(frame[16 * 32 + 16], levels.bubble);
        assert_eq!(frame[16 * 32 + 24], levels.chamber);
        assert_eq!(frame[0], levels.surround);
    }

    #[test]
    fn bubbles_rise_and_grow() {
        let mut bubble = Bubble {
            pos: Vector2::new(10.0, 20.0),
            velocity: Vector2::new(0.0, -1.0),
            radius: 2.0,
            growth: 0.5,
        };
        bubble.step();
        bubble.step();

        assert_eq!(bubble.pos, Vector2::new(10.0, 18.0));
        assert_eq!(bubble.radius, 3.0);
    }

    #[test]
    fn same_seed_same_video() {
        let run = |seed| simulate(&mut StdRng::seed_from_u64(seed), 24, 3, 4, &Levels::default());
        assert_eq!(run(7), run(7));
        assert_eq!(run(7).len(), 4);
        assert!(run(7).iter().all(|f| f.len() == 24 * 24));
    }
}
