//! Spring-damper physics integration and effect-envelope decay.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsState {
    pub rotation: [f32; 3],
    pub velocity: [f32; 3],
    pub squash: f32,
    pub bounce: f32,
    pub tilt: f32,
    pub zoom: f32,
    pub pan: [f32; 2],
}

impl Default for PhysicsState {
    fn default() -> Self {
        Self {
            rotation: [0.0; 3],
            velocity: [0.0; 3],
            squash: 1.0,
            bounce: 0.0,
            tilt: 0.0,
            zoom: 1.15,
            pan: [0.0; 2],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectsState {
    pub rgb_split: f32,
    pub flash: f32,
    pub glitch: f32,
    pub scanlines: f32,
    pub hue_shift: f32,
    pub aberration: f32,
    pub invert: bool,
    pub grayscale: bool,
    pub mirror: bool,
    pub strobe: bool,
    /// Extra channels used only by the one-shot `triggerBurst`/`triggerFreeze` impulses (§9
    /// open question) — not part of the decaying channel set above.
    pub brightness: f32,
    pub saturation: f32,
}

impl Default for EffectsState {
    fn default() -> Self {
        Self {
            rgb_split: 0.0,
            flash: 0.0,
            glitch: 0.0,
            scanlines: 0.0,
            hue_shift: 0.0,
            aberration: 0.0,
            invert: false,
            grayscale: false,
            mirror: false,
            strobe: false,
            brightness: 1.0,
            saturation: 1.0,
        }
    }
}

/// One-shot pre-integrator overrides from the touch/input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Burst,
    Freeze,
}

const ROT_K_XZ: f32 = 140.0;
const ROT_K_Y: f32 = 70.0;
const ROT_C_XZ: f32 = 8.0;
const ROT_C_Y: f32 = 6.4;
const SQUASH_RATE: f32 = 12.0;
const BOUNCE_RATE: f32 = 10.0;
const ZOOM_RATE: f32 = 5.0;
const ZOOM_REST: f32 = 1.15;
const FLASH_DECAY_K: f32 = 15.0;
const GLITCH_DECAY_K: f32 = 10.0;
const RGB_SPLIT_DECAY_K: f32 = 8.0;
const MAX_DT_SECONDS: f32 = 0.1;

/// Advances rotation/squash/bounce/zoom via Euler-with-dt spring integration and decays effect
/// envelopes exponentially. `tick` is a monotonic counter, not wall-clock time, so the
/// `target_y` oscillation stays reproducible across golden-master runs.
pub struct PhysicsIntegrator {
    physics: PhysicsState,
    effects: EffectsState,
    tick: u64,
    transition_speed: f32,
    transition_progress: f32,
    last_tick_ms: Option<u64>,
    last_dt: f32,
}

impl PhysicsIntegrator {
    pub fn new() -> Self {
        Self {
            physics: PhysicsState::default(),
            effects: EffectsState::default(),
            tick: 0,
            transition_speed: 0.0,
            transition_progress: 1.0,
            last_tick_ms: None,
            last_dt: 0.0,
        }
    }

    pub fn physics(&self) -> PhysicsState {
        self.physics
    }

    pub fn effects(&self) -> EffectsState {
        self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectsState {
        &mut self.effects
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsState {
        &mut self.physics
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition_progress < 1.0
    }

    pub fn start_transition(&mut self, speed: f32) {
        self.transition_speed = speed;
        self.transition_progress = 0.0;
    }

    /// Applied on every detected beat, before the integrator runs.
    pub fn apply_beat_impulse(&mut self, bass: f32) {
        self.physics.squash = 0.85;
        self.physics.bounce = -50.0 * bass;
        self.effects.flash = (self.effects.flash + 0.3 * bass).min(1.0);
    }

    pub fn apply_trigger(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Burst => {
                self.physics.squash = 1.5;
                self.effects.brightness = 2.0;
            }
            Trigger::Freeze => {
                self.effects.saturation = 0.0;
                self.effects.brightness = 1.5;
            }
        }
    }

    /// `dt_seconds <= 0` (AudioUnderrun, §7) skips integration entirely; state is unchanged.
    pub fn integrate(&mut self, dt_seconds: f32, bass: f32, mid: f32, high: f32) {
        let dt = dt_seconds.clamp(0.0, MAX_DT_SECONDS);
        if dt <= 0.0 {
            return;
        }
        self.last_dt = dt;
        self.tick += 1;
        let t = self.tick as f32;

        let targets = [bass * 35.0, mid * 25.0 * (t * 0.005).sin(), high * 15.0];
        let spring_k = [ROT_K_XZ, ROT_K_Y, ROT_K_XZ];
        let damping = [ROT_C_XZ, ROT_C_Y, ROT_C_XZ];
        for axis in 0..3 {
            let force = (targets[axis] - self.physics.rotation[axis]) * spring_k[axis]
                - self.physics.velocity[axis] * damping[axis];
            self.physics.velocity[axis] += force * dt;
            self.physics.rotation[axis] += self.physics.velocity[axis] * dt;
        }

        self.physics.squash += (1.0 - self.physics.squash) * (SQUASH_RATE * dt);
        self.physics.bounce += (0.0 - self.physics.bounce) * (BOUNCE_RATE * dt);
        self.physics.zoom += (ZOOM_REST - self.physics.zoom) * (ZOOM_RATE * dt);

        self.transition_progress =
            (self.transition_progress + self.transition_speed * dt).min(1.0);

        self.effects.flash *= (-FLASH_DECAY_K * dt).exp();
        self.effects.glitch *= (-GLITCH_DECAY_K * dt).exp();
        self.effects.rgb_split *= (-RGB_SPLIT_DECAY_K * dt).exp();
    }

    /// Computes `dt` from consecutive tick timestamps. Non-increasing timestamps (AudioUnderrun)
    /// yield `0.0` without advancing the stored clock, so a later well-ordered timestamp still
    /// measures from the last good tick.
    pub fn dt_for_tick(&mut self, now_ms: u64) -> f32 {
        match self.last_tick_ms {
            Some(prev) if now_ms > prev => {
                let dt = ((now_ms - prev) as f32 / 1000.0).min(MAX_DT_SECONDS);
                self.last_tick_ms = Some(now_ms);
                dt
            }
            Some(_) => 0.0,
            None => {
                self.last_tick_ms = Some(now_ms);
                0.0
            }
        }
    }

    /// Last timestamp passed to `dt_for_tick`, or `0` before the first tick.
    pub fn last_tick_ms_hint(&self) -> u64 {
        self.last_tick_ms.unwrap_or(0)
    }

    /// Frames per second implied by the last non-zero `dt` seen by `integrate`, `0.0` before the
    /// first tick.
    pub fn fps(&self) -> f32 {
        if self.last_dt > 0.0 {
            1.0 / self.last_dt
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for PhysicsIntegrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_converges_toward_target_with_sustained_bass() {
        let mut integrator = PhysicsIntegrator::new();
        for _ in 0..500 {
            integrator.integrate(1.0 / 60.0, 1.0, 0.0, 0.0);
        }
        assert!((integrator.physics().rotation[0] - 35.0).abs() < 1.0);
    }

    #[test]
    fn effects_decay_to_near_zero_without_impulses() {
        let mut integrator = PhysicsIntegrator::new();
        integrator.apply_beat_impulse(0.9);
        for _ in 0..120 {
            integrator.integrate(1.0 / 60.0, 0.0, 0.0, 0.0);
        }
        assert!(integrator.effects().flash < 1e-6);
    }

    #[test]
    fn squash_relaxes_to_resting_value() {
        let mut integrator = PhysicsIntegrator::new();
        integrator.apply_beat_impulse(1.0);
        assert_eq!(integrator.physics().squash, 0.85);
        for _ in 0..300 {
            integrator.integrate(1.0 / 60.0, 0.0, 0.0, 0.0);
        }
        assert!((integrator.physics().squash - 1.0).abs() < 0.01);
    }

    #[test]
    fn underrun_timestamp_yields_zero_dt_and_no_state_change() {
        let mut integrator = PhysicsIntegrator::new();
        assert_eq!(integrator.dt_for_tick(100), 0.0); // first tick always 0
        assert!(integrator.dt_for_tick(150) > 0.0);
        assert_eq!(integrator.dt_for_tick(140), 0.0); // went backwards
        let rotation_before = integrator.physics().rotation;
        integrator.integrate(0.0, 1.0, 1.0, 1.0);
        assert_eq!(integrator.physics().rotation, rotation_before);
    }

    #[test]
    fn burst_trigger_applies_squash_and_brightness() {
        let mut integrator = PhysicsIntegrator::new();
        integrator.apply_trigger(Trigger::Burst);
        assert_eq!(integrator.physics().squash, 1.5);
        assert_eq!(integrator.effects().brightness, 2.0);
    }

    #[test]
    fn freeze_trigger_zeroes_saturation() {
        let mut integrator = PhysicsIntegrator::new();
        integrator.apply_trigger(Trigger::Freeze);
        assert_eq!(integrator.effects().saturation, 0.0);
        assert_eq!(integrator.effects().brightness, 1.5);
    }
}
