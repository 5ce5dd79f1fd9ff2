use xrpose_lie::{delta_error, SE3};

use crate::{
    average::average_transforms, cluster::select_mode_cluster, config::CalibrationConfig,
    pairing::PairingCandidate, CalibError,
};

/// One `scene_T_lighthouse` estimate with the poses it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    /// Candidate `scene_T_lighthouse`.
    pub transform: SE3,
    /// Tracker pose in lighthouse space.
    pub device: SE3,
    /// Reference pose in scene space.
    pub reference: SE3,
}

impl CalibrationSample {
    /// Build a sample from a tracker pose and the reference pose it observes.
    pub fn from_observation(device: SE3, reference: SE3) -> Self {
        Self {
            transform: reference * device.inverse(),
            device,
            reference,
        }
    }
}

impl From<&PairingCandidate> for CalibrationSample {
    fn from(candidate: &PairingCandidate) -> Self {
        Self {
            transform: candidate.transform,
            device: candidate.device,
            reference: candidate.reference,
        }
    }
}

/// Lifecycle of a [`CalibrationSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// Samples are being collected.
    Collecting,
    /// The calibration transform is frozen.
    Finalized,
}

/// What [`CalibrationSession::push`] did with a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushOutcome {
    /// Added to the current window.
    Accepted,
    /// Dropped as inconsistent with the samples collected so far.
    Rejected,
    /// The previous window was discarded and a new one started with this sample.
    WindowRestarted,
    /// The session finalized with this transform.
    Finalized(SE3),
    /// The session is already finalized.
    Ignored,
}

/// Accumulates calibration samples over a time-bounded window and freezes the
/// robust average of their mode cluster exactly once.
///
/// A window finalizes as soon as it holds `min_samples` samples. Once it is older than
/// `max_collection_secs` it finalizes if it holds at least half of `min_samples`,
/// otherwise it is discarded and collection starts over.
///
/// Time is passed in explicitly, in seconds from any fixed origin.
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    config: CalibrationConfig,
    buffer: Vec<CalibrationSample>,
    window_start: Option<f64>,
    consecutive_rejections: usize,
    result: Option<SE3>,
}

impl CalibrationSession {
    /// Create a session collecting with the given config.
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            buffer: Vec::with_capacity(config.min_samples),
            config,
            window_start: None,
            consecutive_rejections: 0,
            result: None,
        }
    }

    /// The config the session runs with.
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> CalibrationState {
        if self.result.is_some() {
            CalibrationState::Finalized
        } else {
            CalibrationState::Collecting
        }
    }

    /// The frozen `scene_T_lighthouse`, once finalized.
    pub fn result(&self) -> Option<SE3> {
        self.result
    }

    /// Samples in the current window.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Add a sample observed at time `now`.
    pub fn push(&mut self, sample: CalibrationSample, now: f64) -> PushOutcome {
        if self.result.is_some() {
            return PushOutcome::Ignored;
        }

        if !sample.transform.is_finite() {
            log::warn!("dropping non-finite calibration sample");
            return PushOutcome::Rejected;
        }

        let mut restarted = false;
        match self.window_start {
            None => self.window_start = Some(now),
            Some(start) if now - start >= self.config.max_collection_secs => {
                if self.buffer.len() >= self.config.min_window_samples() {
                    return self.finalize();
                }
                log::debug!(
                    "collection window expired with {} of {} samples, restarting",
                    self.buffer.len(),
                    self.config.min_window_samples()
                );
                self.restart_window(now);
                restarted = true;
            }
            Some(_) => {}
        }

        if !self.buffer.is_empty() && !self.is_consistent(&sample) {
            self.consecutive_rejections += 1;
            if self.consecutive_rejections < self.config.min_samples {
                return PushOutcome::Rejected;
            }
            log::info!(
                "{} consecutive calibration samples rejected, restarting the window",
                self.consecutive_rejections
            );
            self.restart_window(now);
            restarted = true;
        }

        self.consecutive_rejections = 0;
        self.buffer.push(sample);

        if self.buffer.len() >= self.config.min_samples {
            return self.finalize();
        }

        if restarted {
            PushOutcome::WindowRestarted
        } else {
            PushOutcome::Accepted
        }
    }

    /// Apply the time trigger on a frame without new samples.
    ///
    /// Returns the calibration transform if the session finalized during this call.
    pub fn poll(&mut self, now: f64) -> Option<SE3> {
        if self.result.is_some() {
            return None;
        }
        let start = self.window_start?;
        if now - start < self.config.max_collection_secs {
            return None;
        }

        if self.buffer.len() >= self.config.min_window_samples() {
            match self.finalize() {
                PushOutcome::Finalized(transform) => Some(transform),
                _ => None,
            }
        } else {
            log::debug!(
                "collection window expired with {} samples, restarting",
                self.buffer.len()
            );
            self.buffer.clear();
            self.window_start = None;
            self.consecutive_rejections = 0;
            None
        }
    }

    /// Discard the result and all collected samples.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.window_start = None;
        self.consecutive_rejections = 0;
        self.result = None;
    }

    fn restart_window(&mut self, now: f64) {
        self.buffer.clear();
        self.window_start = Some(now);
        self.consecutive_rejections = 0;
    }

    /// Whether the current estimate maps the sample's device pose close enough to
    /// its observed reference pose.
    fn is_consistent(&self, sample: &CalibrationSample) -> bool {
        let Some(thresholds) = &self.config.rejection else {
            return true;
        };
        let transforms: Vec<SE3> = self.buffer.iter().map(|s| s.transform).collect();
        let Ok(estimate) = average_transforms(&transforms) else {
            return true;
        };
        let predicted = estimate * sample.device;
        let err = delta_error(&predicted, &sample.reference);
        let ok = err.within(thresholds.translation_m, thresholds.rotation_deg);
        if !ok {
            log::debug!(
                "rejecting calibration sample: {:.4} m, {:.2} deg",
                err.translation_m,
                err.rotation_deg
            );
        }
        ok
    }

    fn finalize(&mut self) -> PushOutcome {
        match self.compute() {
            Ok(transform) => {
                log::info!(
                    "calibration finalized from {} samples: t = {:?}",
                    self.buffer.len(),
                    transform.t
                );
                self.buffer.clear();
                self.result = Some(transform);
                PushOutcome::Finalized(transform)
            }
            Err(err) => {
                log::warn!("calibration failed: {err}, restarting the window");
                self.buffer.clear();
                self.window_start = None;
                PushOutcome::WindowRestarted
            }
        }
    }

    fn compute(&self) -> Result<SE3, CalibError> {
        let transforms: Vec<SE3> = self.buffer.iter().map(|s| s.transform).collect();
        let cluster = select_mode_cluster(&transforms, &self.config.cluster);
        if cluster.is_empty() {
            return average_transforms(&transforms);
        }
        average_transforms(&cluster)
    }
}
