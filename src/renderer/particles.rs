//! Particle system for visual effects
//!
//! Emitters run on the CPU and only decide *when* and *where* particles are
//! born. New particles are written into a fixed-size ring in a GPU storage
//! buffer; a compute pass ages and moves every slot each frame and the
//! forward pass draws them as camera-facing quads.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use wgpu::util::DeviceExt;

use super::gpu::layouts::BindGroupLayouts;

/// Workgroup size of the simulation shader
pub const PARTICLE_WORKGROUP_SIZE: u32 = 64;

/// A single particle slot as stored on the GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Particle {
    pub position: [f32; 3],
    /// Total lifetime in seconds; zero marks an empty slot
    pub lifetime: f32,
    pub velocity: [f32; 3],
    /// Seconds since spawn
    pub age: f32,
    pub color: [f32; 4],
    pub size: f32,
    pub rotation: f32,
    _padding: [f32; 2],
}

/// Particle emitter configuration
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Ring capacity
    pub max_particles: u32,
    /// Particles spawned per second
    pub spawn_rate: f32,
    /// Lifetime range (min, max)
    pub lifetime: (f32, f32),
    pub velocity_min: Vec3,
    pub velocity_max: Vec3,
    /// Size range (min, max)
    pub size: (f32, f32),
    pub start_color: Vec4,
    /// Color at end of life
    pub end_color: Vec4,
    pub gravity: Vec3,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            max_particles: 1024,
            spawn_rate: 100.0,
            lifetime: (1.0, 2.0),
            velocity_min: Vec3::new(-1.0, 1.0, -1.0),
            velocity_max: Vec3::new(1.0, 3.0, 1.0),
            size: (0.1, 0.3),
            start_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            end_color: Vec4::new(1.0, 1.0, 1.0, 0.0),
            gravity: Vec3::new(0.0, -9.8, 0.0),
        }
    }
}

impl EmitterConfig {
    #[must_use]
    pub const fn with_max_particles(mut self, max: u32) -> Self {
        self.max_particles = max;
        self
    }

    #[must_use]
    pub const fn with_spawn_rate(mut self, rate: f32) -> Self {
        self.spawn_rate = rate;
        self
    }

    #[must_use]
    pub const fn with_lifetime(mut self, min: f32, max: f32) -> Self {
        self.lifetime = (min, max);
        self
    }

    #[must_use]
    pub fn with_velocity(mut self, min: Vec3, max: Vec3) -> Self {
        self.velocity_min = min;
        self.velocity_max = max;
        self
    }

    #[must_use]
    pub const fn with_size(mut self, min: f32, max: f32) -> Self {
        self.size = (min, max);
        self
    }

    #[must_use]
    pub fn with_colors(mut self, start: Vec4, end: Vec4) -> Self {
        self.start_color = start;
        self.end_color = end;
        self
    }

    #[must_use]
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }
}

/// Simulation step parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ParticleSimUniform {
    /// gravity, w = delta time
    pub gravity: [f32; 4],
    pub start_color: [f32; 4],
    pub end_color: [f32; 4],
    /// slot count, unused...
    pub params: [u32; 4],
}

/// Slots written this frame, in ring order.
#[derive(Debug, Default)]
pub struct SpawnBatch {
    pub writes: Vec<(u32, Particle)>,
}

impl SpawnBatch {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Coalesce consecutive slots into `(first_slot, particles)` runs.
    pub fn runs(&self) -> Vec<(u32, Vec<Particle>)> {
        let mut runs: Vec<(u32, Vec<Particle>)> = Vec::new();
        for &(slot, particle) in &self.writes {
            let contiguous = runs
                .last()
                .is_some_and(|(first, run)| first + run.len() as u32 == slot);
            match runs.last_mut() {
                Some((_, run)) if contiguous => run.push(particle),
                _ => runs.push((slot, vec![particle])),
            }
        }
        runs
    }
}

/// CPU side of an emitter: spawn timing and ring bookkeeping.
#[derive(Debug)]
pub struct ParticleEmitter {
    pub config: EmitterConfig,
    pub position: Vec3,
    spawn_accumulator: f32,
    active: bool,
    cursor: u32,
    clock: f32,
    /// Emitter-clock time at which each slot's particle dies
    expires_at: Vec<f32>,
    rng: u32,
}

impl ParticleEmitter {
    #[must_use]
    pub fn new(config: EmitterConfig) -> Self {
        let capacity = config.max_particles.max(1) as usize;
        Self {
            config,
            position: Vec3::ZERO,
            spawn_accumulator: 0.0,
            active: true,
            cursor: 0,
            clock: 0.0,
            expires_at: vec![0.0; capacity],
            rng: 0x9E37_79B9,
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    /// Stop emitting; living particles finish their lifetime.
    pub fn stop(&mut self) {
        self.active = false;
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.expires_at.len() as u32
    }

    /// Particles whose lifetime has not elapsed.
    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.expires_at.iter().filter(|&&t| t > self.clock).count()
    }

    /// Advance the emitter clock and return the particles born this step.
    ///
    /// When the ring is full the oldest slot is overwritten.
    pub fn update(&mut self, delta_time: f32) -> SpawnBatch {
        self.clock += delta_time;
        let mut batch = SpawnBatch::default();
        if !self.active {
            return batch;
        }

        self.spawn_accumulator += self.config.spawn_rate * delta_time;
        let budget = self.capacity() as usize;
        while self.spawn_accumulator >= 1.0 && batch.writes.len() < budget {
            self.spawn_accumulator -= 1.0;
            let particle = self.spawn_particle();
            let slot = self.cursor;
            self.expires_at[slot as usize] = self.clock + particle.lifetime;
            self.cursor = (self.cursor + 1) % self.capacity();
            batch.writes.push((slot, particle));
        }
        // Drop the excess instead of bursting next frame.
        self.spawn_accumulator = self.spawn_accumulator.min(1.0);
        batch
    }

    pub fn sim_uniform(&self, delta_time: f32) -> ParticleSimUniform {
        ParticleSimUniform {
            gravity: self.config.gravity.extend(delta_time).into(),
            start_color: self.config.start_color.into(),
            end_color: self.config.end_color.into(),
            params: [self.capacity(), 0, 0, 0],
        }
    }

    fn spawn_particle(&mut self) -> Particle {
        let (min_life, max_life) = self.config.lifetime;
        let lifetime = lerp(min_life, max_life, self.next_f32()).max(f32::EPSILON);
        let (lo, hi) = (self.config.velocity_min, self.config.velocity_max);
        let velocity = Vec3::new(
            lerp(lo.x, hi.x, self.next_f32()),
            lerp(lo.y, hi.y, self.next_f32()),
            lerp(lo.z, hi.z, self.next_f32()),
        );
        let size = lerp(self.config.size.0, self.config.size.1, self.next_f32());

        Particle {
            position: self.position.into(),
            lifetime,
            velocity: velocity.into(),
            age: 0.0,
            color: self.config.start_color.into(),
            size,
            rotation: self.next_f32() * std::f32::consts::TAU,
            _padding: [0.0; 2],
        }
    }

    /// xorshift32, seeded per emitter so runs are reproducible
    fn next_f32(&mut self) -> f32 {
        let mut s = self.rng;
        s ^= s << 13;
        s ^= s >> 17;
        s ^= s << 5;
        self.rng = s;
        s as f32 / u32::MAX as f32
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// GPU ring and bind groups of one emitter
#[derive(Debug)]
pub struct GpuParticles {
    pub buffer: wgpu::Buffer,
    pub sim_buffer: wgpu::Buffer,
    pub sim_bind_group: wgpu::BindGroup,
    pub draw_bind_group: wgpu::BindGroup,
    pub capacity: u32,
}

impl GpuParticles {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts, capacity: u32) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("particle_ring"),
            contents: bytemuck::cast_slice(&vec![Particle::zeroed(); capacity as usize]),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let sim_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("particle_sim_uniform"),
            contents: bytemuck::bytes_of(&ParticleSimUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let sim_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("particle_sim_bind_group"),
            layout: &layouts.particle_sim,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sim_buffer.as_entire_binding(),
                },
            ],
        });
        let draw_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("particle_draw_bind_group"),
            layout: &layouts.particle_draw,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            buffer,
            sim_buffer,
            sim_bind_group,
            draw_bind_group,
            capacity,
        }
    }

    /// Upload this frame's spawns and simulation parameters.
    pub fn upload(&self, queue: &wgpu::Queue, batch: &SpawnBatch, uniform: &ParticleSimUniform) {
        let stride = std::mem::size_of::<Particle>() as u64;
        for (first, particles) in batch.runs() {
            let offset = first as u64 * stride;
            queue.write_buffer(&self.buffer, offset, bytemuck::cast_slice(&particles));
        }
        queue.write_buffer(&self.sim_buffer, 0, bytemuck::bytes_of(uniform));
    }

    pub fn workgroups(&self) -> u32 {
        self.capacity.div_ceil(PARTICLE_WORKGROUP_SIZE)
    }
}

/// An emitter together with its GPU ring
#[derive(Debug)]
pub struct ParticleSystem {
    pub emitter: ParticleEmitter,
    pub gpu: GpuParticles,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_rate_over_one_second() {
        let config = EmitterConfig {
            max_particles: 100,
            spawn_rate: 10.0,
            lifetime: (2.0, 2.0),
            ..Default::default()
        };
        let mut emitter = ParticleEmitter::new(config);

        let spawned: usize = (0..10).map(|_| emitter.update(0.1).writes.len()).sum();
        assert!((9..=10).contains(&spawned));
        assert_eq!(emitter.particle_count(), spawned);
    }

    #[test]
    fn test_particles_expire_after_stop() {
        let config = EmitterConfig {
            max_particles: 10,
            spawn_rate: 100.0,
            lifetime: (0.1, 0.1),
            ..Default::default()
        };
        let mut emitter = ParticleEmitter::new(config);

        emitter.update(0.05);
        assert!(emitter.particle_count() > 0);

        emitter.stop();
        assert!(emitter.update(0.2).is_empty());
        assert_eq!(emitter.particle_count(), 0);
    }

    #[test]
    fn test_ring_wraps_and_batches_coalesce() {
        let config = EmitterConfig {
            max_particles: 4,
            spawn_rate: 3.0,
            lifetime: (10.0, 10.0),
            ..Default::default()
        };
        let mut emitter = ParticleEmitter::new(config);

        let first: Vec<u32> = emitter.update(1.0).writes.iter().map(|w| w.0).collect();
        assert_eq!(first, vec![0, 1, 2]);
        let second = emitter.update(1.0);
        let slots: Vec<u32> = second.writes.iter().map(|w| w.0).collect();
        assert_eq!(slots, vec![3, 0, 1]);

        let runs = second.runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].0, 3);
        assert_eq!(runs[1].0, 0);
        assert_eq!(runs[1].1.len(), 2);
        assert_eq!(emitter.particle_count(), 4);
    }

    #[test]
    fn test_particle_layout_is_std430_friendly() {
        assert_eq!(std::mem::size_of::<Particle>(), 64);
    }
}
