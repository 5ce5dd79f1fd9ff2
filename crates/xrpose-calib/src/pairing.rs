//! Which anonymous tracker sits on which wrist?
//!
//! Two lighthouse trackers report opaque ids, while the hand tracking source reports
//! named left and right wrist poses. Two assignments are possible:
//!
//! * [`Hypothesis::A`]: device 0 is left, device 1 is right.
//! * [`Hypothesis::B`]: device 1 is left, device 0 is right.
//!
//! Each observed (device, wrist) pair predicts a `scene_T_lighthouse` transform. Under
//! the true hypothesis the predictions from both trackers agree, so the hypothesis
//! whose two predictions stay consistent over many frames wins.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use xrpose_lie::{delta_error, SE3};

use crate::config::{CalibrationConfig, KnownPairing};

/// Hand side of a reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Left hand.
    Left,
    /// Right hand.
    Right,
}

impl Side {
    /// Both sides, left first.
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Lowercase name used in joint ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An assignment of the two device slots to the two hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hypothesis {
    /// Device 0 is left, device 1 is right.
    A,
    /// Device 1 is left, device 0 is right.
    B,
}

impl Hypothesis {
    fn index(self) -> usize {
        match self {
            Hypothesis::A => 0,
            Hypothesis::B => 1,
        }
    }

    /// The competing hypothesis.
    pub fn other(self) -> Self {
        match self {
            Hypothesis::A => Hypothesis::B,
            Hypothesis::B => Hypothesis::A,
        }
    }

    /// Device slot paired with `side` under this hypothesis.
    pub fn slot(self, side: Side) -> usize {
        match (self, side) {
            (Hypothesis::A, Side::Left) | (Hypothesis::B, Side::Right) => 0,
            (Hypothesis::A, Side::Right) | (Hypothesis::B, Side::Left) => 1,
        }
    }
}

/// A hypothesised `scene_T_lighthouse` transform and the observation it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingCandidate {
    /// Hypothesis that produced the candidate.
    pub hypothesis: Hypothesis,
    /// Hand the tracker was paired with.
    pub side: Side,
    /// Tracker id.
    pub device_id: String,
    /// Candidate `scene_T_lighthouse`.
    pub transform: SE3,
    /// Tracker pose in lighthouse space.
    pub device: SE3,
    /// Wrist reference pose in scene space.
    pub reference: SE3,
}

/// The observations of one frame.
#[derive(Debug, Clone, Default)]
pub struct PairingFrame {
    /// Tracker poses in lighthouse space, keyed by tracker id.
    pub devices: Vec<(String, SE3)>,
    /// Left wrist reference pose in scene space.
    pub left: Option<SE3>,
    /// Right wrist reference pose in scene space.
    pub right: Option<SE3>,
}

impl PairingFrame {
    fn reference(&self, side: Side) -> Option<SE3> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

/// The chosen hypothesis and the tracker ids it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingDecision {
    /// Chosen hypothesis.
    pub hypothesis: Hypothesis,
    /// Tracker on the left wrist, if it was ever observed.
    pub left_device_id: Option<String>,
    /// Tracker on the right wrist, if it was ever observed.
    pub right_device_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct HypothesisStats {
    candidates: VecDeque<PairingCandidate>,
    trans_errs: VecDeque<f64>,
    rot_errs: VecDeque<f64>,
}

fn push_bounded<T>(values: &mut VecDeque<T>, value: T, cap: usize) {
    if values.len() == cap {
        values.pop_front();
    }
    values.push_back(value);
}

/// Incremental resolver for the left/right identity of two anonymous trackers.
#[derive(Debug, Clone)]
pub struct PairingResolver {
    min_samples: usize,
    max_history: usize,
    tolerance: f64,
    rotation_weight: f64,
    device_id_prefix: Option<String>,
    known: bool,
    slots: [Option<String>; 2],
    stats: [HypothesisStats; 2],
    decision: Option<PairingDecision>,
    warned_extra_device: bool,
}

impl PairingResolver {
    /// Create a resolver from the calibration config.
    ///
    /// With `known_pairing` set, the left tracker takes device slot 0 and the right
    /// tracker slot 1 and hypothesis A is chosen up front.
    pub fn new(config: &CalibrationConfig) -> Self {
        let mut resolver = Self {
            min_samples: config.min_samples,
            max_history: config.max_history.max(config.min_samples).max(1),
            tolerance: config.pairing_tolerance,
            rotation_weight: config.rotation_weight,
            device_id_prefix: config.device_id_prefix.clone(),
            known: false,
            slots: [None, None],
            stats: Default::default(),
            decision: None,
            warned_extra_device: false,
        };
        if let Some(known) = &config.known_pairing {
            resolver.set_known(known);
        }
        resolver
    }

    fn set_known(&mut self, known: &KnownPairing) {
        self.known = true;
        self.slots = [Some(known.left.clone()), Some(known.right.clone())];
        self.decision = Some(PairingDecision {
            hypothesis: Hypothesis::A,
            left_device_id: Some(known.left.clone()),
            right_device_id: Some(known.right.clone()),
        });
    }

    /// Whether `device_id` is a candidate wrist tracker.
    pub fn accepts(&self, device_id: &str) -> bool {
        match &self.device_id_prefix {
            Some(prefix) => device_id.starts_with(prefix.as_str()),
            None => true,
        }
    }

    /// Tracker ids assigned to device slots 0 and 1.
    pub fn slots(&self) -> [Option<&str>; 2] {
        [self.slots[0].as_deref(), self.slots[1].as_deref()]
    }

    fn assign_slots(&mut self, frame: &PairingFrame) {
        let mut fresh: Vec<&str> = frame
            .devices
            .iter()
            .map(|(id, _)| id.as_str())
            .filter(|id| self.accepts(id))
            .filter(|id| self.slots.iter().all(|slot| slot.as_deref() != Some(*id)))
            .collect();
        fresh.sort_unstable();
        fresh.dedup();

        for id in fresh {
            match self.slots.iter_mut().find(|slot| slot.is_none()) {
                Some(slot) => {
                    log::debug!("tracker {id} assigned to a wrist slot");
                    *slot = Some(id.to_string());
                }
                None => {
                    if !self.warned_extra_device {
                        log::warn!("ignoring tracker {id} for pairing: both wrist slots are taken");
                        self.warned_extra_device = true;
                    }
                }
            }
        }
    }

    /// Feed one frame of observations.
    ///
    /// # Returns
    ///
    /// The candidates produced by this frame for both hypotheses.
    pub fn observe(&mut self, frame: &PairingFrame) -> Vec<PairingCandidate> {
        if !self.known {
            self.assign_slots(frame);
        }

        let devices = [
            find_device(frame, self.slots[0].as_deref()),
            find_device(frame, self.slots[1].as_deref()),
        ];

        let mut produced = Vec::new();
        let mut predicted: [[Option<SE3>; 2]; 2] = [[None; 2]; 2];
        for hypothesis in [Hypothesis::A, Hypothesis::B] {
            for (side_index, side) in Side::BOTH.into_iter().enumerate() {
                let (Some((device_id, device)), Some(reference)) =
                    (devices[hypothesis.slot(side)], frame.reference(side))
                else {
                    continue;
                };
                let transform = reference * device.inverse();
                if !transform.is_finite() {
                    log::warn!("dropping non-finite pairing candidate from tracker {device_id}");
                    continue;
                }
                predicted[hypothesis.index()][side_index] = Some(transform);
                produced.push(PairingCandidate {
                    hypothesis,
                    side,
                    device_id: device_id.to_string(),
                    transform,
                    device,
                    reference,
                });
            }
        }

        for candidate in &produced {
            let stats = &mut self.stats[candidate.hypothesis.index()];
            push_bounded(&mut stats.candidates, candidate.clone(), self.max_history);
        }

        // self-consistency needs both trackers and both wrists in the same frame
        if predicted.iter().flatten().all(Option::is_some) {
            for hypothesis in [Hypothesis::A, Hypothesis::B] {
                let [Some(from_left), Some(from_right)] = predicted[hypothesis.index()] else {
                    continue;
                };
                let err = delta_error(&from_left, &from_right);
                let stats = &mut self.stats[hypothesis.index()];
                push_bounded(&mut stats.trans_errs, err.translation_m, self.max_history);
                push_bounded(&mut stats.rot_errs, err.rotation_deg, self.max_history);
            }
        }

        produced
    }

    /// Aggregate consistency error of a hypothesis over the retained history:
    /// `median(translation) + rotation_weight * median(rotation)`.
    pub fn pairing_error(&self, hypothesis: Hypothesis) -> f64 {
        let stats = &self.stats[hypothesis.index()];
        median(stats.trans_errs.iter().copied())
            + self.rotation_weight * median(stats.rot_errs.iter().copied())
    }

    /// Number of retained self-consistency samples for a hypothesis.
    pub fn consistency_samples(&self, hypothesis: Hypothesis) -> usize {
        self.stats[hypothesis.index()].trans_errs.len()
    }

    /// Retained candidates for a hypothesis, oldest first.
    pub fn candidates(&self, hypothesis: Hypothesis) -> &VecDeque<PairingCandidate> {
        &self.stats[hypothesis.index()].candidates
    }

    /// Move the retained candidates of a hypothesis out of the resolver.
    pub fn take_candidates(&mut self, hypothesis: Hypothesis) -> Vec<PairingCandidate> {
        std::mem::take(&mut self.stats[hypothesis.index()].candidates).into()
    }

    /// The decision, if one has been made.
    pub fn decision(&self) -> Option<&PairingDecision> {
        self.decision.as_ref()
    }

    /// Try to choose a hypothesis from the data seen so far.
    ///
    /// Returns the decision once made; later calls return the same decision.
    pub fn resolve(&mut self) -> Option<&PairingDecision> {
        if self.decision.is_none() {
            if let Some(hypothesis) = self.choose() {
                let (left, right) = match hypothesis {
                    Hypothesis::A => (self.slots[0].clone(), self.slots[1].clone()),
                    Hypothesis::B => (self.slots[1].clone(), self.slots[0].clone()),
                };
                log::info!(
                    "resolved wrist pairing {:?}: {} -> left, {} -> right",
                    hypothesis,
                    left.as_deref().unwrap_or("<none>"),
                    right.as_deref().unwrap_or("<none>"),
                );
                self.decision = Some(PairingDecision {
                    hypothesis,
                    left_device_id: left,
                    right_device_id: right,
                });
            }
        }
        self.decision.as_ref()
    }

    fn choose(&self) -> Option<Hypothesis> {
        let a = &self.stats[Hypothesis::A.index()];
        let b = &self.stats[Hypothesis::B.index()];

        if a.candidates.is_empty() && b.candidates.len() >= self.min_samples {
            return Some(Hypothesis::B);
        }
        if b.candidates.is_empty() && a.candidates.len() >= self.min_samples {
            return Some(Hypothesis::A);
        }
        if a.trans_errs.len() < self.min_samples || b.trans_errs.len() < self.min_samples {
            return None;
        }

        let err_a = self.pairing_error(Hypothesis::A);
        let err_b = self.pairing_error(Hypothesis::B);
        log::debug!("wrist pairing errors: A {err_a:.4}, B {err_b:.4}");

        if err_a <= err_b && err_a < self.tolerance {
            Some(Hypothesis::A)
        } else if err_b <= err_a && err_b < self.tolerance {
            Some(Hypothesis::B)
        } else {
            None
        }
    }

    /// Forget every observation, slot assignment and decision.
    pub fn reset(&mut self) {
        self.stats = Default::default();
        self.warned_extra_device = false;
        if !self.known {
            self.slots = [None, None];
            self.decision = None;
        }
    }
}

fn find_device<'f>(frame: &'f PairingFrame, id: Option<&str>) -> Option<(&'f str, SE3)> {
    let id = id?;
    frame
        .devices
        .iter()
        .find(|(device_id, _)| device_id == id)
        .map(|(device_id, pose)| (device_id.as_str(), *pose))
}

/// Median of the values, infinite when there are none.
fn median(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.into_iter().collect();
    if sorted.is_empty() {
        return f64::INFINITY;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
