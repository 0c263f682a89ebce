//! Rule-based object classification from aggregated track features.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{non_negative, non_zero, positive, unit_interval};
use crate::error::ConfigError;
use crate::tracker::{TrackFeatures, TrackState, TrackedObject};

/// Semantic class of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Pedestrian,
    Vehicle,
    Bird,
    #[default]
    Other,
}

impl ObjectClass {
    pub const ALL: [ObjectClass; 4] = [
        ObjectClass::Pedestrian,
        ObjectClass::Vehicle,
        ObjectClass::Bird,
        ObjectClass::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectClass::Pedestrian => "pedestrian",
            ObjectClass::Vehicle => "vehicle",
            ObjectClass::Bird => "bird",
            ObjectClass::Other => "other",
        }
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowest confidence each class may be reported with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassConfidenceFloor {
    pub pedestrian: f64,
    pub vehicle: f64,
    pub bird: f64,
    pub other: f64,
}

impl Default for ClassConfidenceFloor {
    fn default() -> Self {
        Self {
            pedestrian: 0.5,
            vehicle: 0.5,
            bird: 0.4,
            other: 0.05,
        }
    }
}

impl ClassConfidenceFloor {
    pub fn for_class(&self, class: ObjectClass) -> f64 {
        match class {
            ObjectClass::Pedestrian => self.pedestrian,
            ObjectClass::Vehicle => self.vehicle,
            ObjectClass::Bird => self.bird,
            ObjectClass::Other => self.other,
        }
    }
}

/// Classification thresholds. Sizes in metres, speeds in m/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub bird_max_height: f64,
    /// Applies to both length and width.
    pub bird_max_footprint: f64,
    pub bird_max_speed: f64,

    pub vehicle_min_length: f64,
    pub vehicle_min_width: f64,
    pub vehicle_min_avg_speed: f64,
    pub vehicle_min_peak_speed: f64,

    pub pedestrian_min_height: f64,
    pub pedestrian_max_height: f64,
    pub pedestrian_max_speed: f64,
    /// Applies to both length and width.
    pub pedestrian_max_footprint: f64,

    pub base_confidence: f64,
    /// Added per agreeing feature beyond the first.
    pub agreement_bonus: f64,
    /// Tracks with fewer observations are reported as `Other`.
    pub min_observations: u32,
    pub observation_bonus_count: u32,
    pub observation_bonus: f64,
    /// Confidence reported for `Other`.
    pub other_confidence: f64,
    pub min_confidence: ClassConfidenceFloor,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            bird_max_height: 0.5,
            bird_max_footprint: 1.0,
            bird_max_speed: 1.0,
            vehicle_min_length: 3.0,
            vehicle_min_width: 1.5,
            vehicle_min_avg_speed: 5.0,
            vehicle_min_peak_speed: 7.5,
            pedestrian_min_height: 1.0,
            pedestrian_max_height: 2.2,
            pedestrian_max_speed: 3.0,
            pedestrian_max_footprint: 1.2,
            base_confidence: 0.5,
            agreement_bonus: 0.1,
            min_observations: 3,
            observation_bonus_count: 20,
            observation_bonus: 0.05,
            other_confidence: 0.2,
            min_confidence: ClassConfidenceFloor::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("classifier.bird_max_height", self.bird_max_height)?;
        positive("classifier.bird_max_footprint", self.bird_max_footprint)?;
        positive("classifier.bird_max_speed", self.bird_max_speed)?;
        positive("classifier.vehicle_min_length", self.vehicle_min_length)?;
        positive("classifier.vehicle_min_width", self.vehicle_min_width)?;
        positive("classifier.vehicle_min_avg_speed", self.vehicle_min_avg_speed)?;
        positive("classifier.vehicle_min_peak_speed", self.vehicle_min_peak_speed)?;
        non_negative("classifier.pedestrian_min_height", self.pedestrian_min_height)?;
        if !(self.pedestrian_max_height > self.pedestrian_min_height) {
            return Err(ConfigError::OutOfRange {
                field: "classifier.pedestrian_max_height",
                value: self.pedestrian_max_height,
                min: self.pedestrian_min_height,
                max: f64::INFINITY,
            });
        }
        positive("classifier.pedestrian_max_speed", self.pedestrian_max_speed)?;
        positive(
            "classifier.pedestrian_max_footprint",
            self.pedestrian_max_footprint,
        )?;
        unit_interval("classifier.base_confidence", self.base_confidence)?;
        non_negative("classifier.agreement_bonus", self.agreement_bonus)?;
        non_zero("classifier.min_observations", self.min_observations as usize)?;
        non_negative("classifier.observation_bonus", self.observation_bonus)?;
        unit_interval("classifier.other_confidence", self.other_confidence)?;
        unit_interval(
            "classifier.min_confidence.pedestrian",
            self.min_confidence.pedestrian,
        )?;
        unit_interval("classifier.min_confidence.vehicle", self.min_confidence.vehicle)?;
        unit_interval("classifier.min_confidence.bird", self.min_confidence.bird)?;
        unit_interval("classifier.min_confidence.other", self.min_confidence.other)
    }
}

/// Maps track features to a class and a confidence in `[0, 1]`.
///
/// Rules are tried in the order vehicle, pedestrian, bird; the first that
/// matches wins and everything else is `Other`.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ClassifierConfig) {
        self.config = config;
    }

    pub fn classify(&self, features: &TrackFeatures) -> (ObjectClass, f64) {
        if features.observation_count < self.config.min_observations {
            return self.other();
        }
        for class in [ObjectClass::Vehicle, ObjectClass::Pedestrian, ObjectClass::Bird] {
            if let Some(agreeing) = self.evaluate(class, features) {
                return (class, self.confidence(class, agreeing, features));
            }
        }
        self.other()
    }

    /// Re-classify a confirmed track in place. Returns true when the label
    /// changed.
    pub fn apply(&self, track: &mut TrackedObject) -> bool {
        if track.state != TrackState::Confirmed {
            return false;
        }
        let (class, confidence) = self.classify(track.features());
        let changed = class != track.class_label;
        if changed {
            debug!(
                "track {} classified {} -> {} ({:.2})",
                track.track_id, track.class_label, class, confidence
            );
        }
        track.class_label = class;
        track.class_confidence = confidence;
        changed
    }

    fn other(&self) -> (ObjectClass, f64) {
        let floor = self.config.min_confidence.other;
        (
            ObjectClass::Other,
            self.config.other_confidence.clamp(floor, 1.0),
        )
    }

    /// Number of agreeing features when the rule for `class` matches.
    fn evaluate(&self, class: ObjectClass, f: &TrackFeatures) -> Option<usize> {
        let c = &self.config;
        match class {
            ObjectClass::Vehicle => {
                let votes = count([
                    f.avg_length > c.vehicle_min_length,
                    f.avg_width > c.vehicle_min_width,
                    f.avg_speed > c.vehicle_min_avg_speed,
                    f.peak_speed > c.vehicle_min_peak_speed,
                ]);
                (votes > 0).then_some(votes)
            }
            ObjectClass::Pedestrian => {
                let height = f.avg_height >= c.pedestrian_min_height
                    && f.avg_height <= c.pedestrian_max_height;
                let speed = f.avg_speed < c.pedestrian_max_speed;
                let compact = f.avg_length <= c.pedestrian_max_footprint
                    && f.avg_width <= c.pedestrian_max_footprint;
                (height && speed && compact)
                    .then(|| 3 + count([f.p85_speed < c.pedestrian_max_speed]))
            }
            ObjectClass::Bird => {
                let height = f.avg_height < c.bird_max_height;
                let small = f.avg_length < c.bird_max_footprint && f.avg_width < c.bird_max_footprint;
                let slow = f.avg_speed < c.bird_max_speed;
                (height && small && slow).then(|| 3 + count([f.peak_speed < c.bird_max_speed]))
            }
            ObjectClass::Other => None,
        }
    }

    fn confidence(&self, class: ObjectClass, agreeing: usize, f: &TrackFeatures) -> f64 {
        let c = &self.config;
        let mut confidence =
            c.base_confidence + c.agreement_bonus * agreeing.saturating_sub(1) as f64;
        if f.observation_count >= c.observation_bonus_count {
            confidence += c.observation_bonus;
        }
        confidence.clamp(c.min_confidence.for_class(class), 1.0)
    }
}

fn count<const N: usize>(flags: [bool; N]) -> usize {
    flags.iter().filter(|&&b| b).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn features(length: f64, width: f64, height: f64, avg: f64, peak: f64) -> TrackFeatures {
        TrackFeatures {
            observation_count: 10,
            speed_count: 9,
            avg_speed: avg,
            peak_speed: peak,
            p50_speed: avg,
            p85_speed: avg,
            p95_speed: peak,
            avg_length: length,
            avg_width: width,
            avg_height: height,
            max_height: height,
            ..TrackFeatures::default()
        }
    }

    #[test]
    fn test_pedestrian() {
        let classifier = Classifier::default();
        let (class, confidence) = classifier.classify(&features(0.6, 0.6, 1.1, 1.5, 1.5));
        assert_eq!(class, ObjectClass::Pedestrian);
        assert!(confidence > classifier.config().min_confidence.pedestrian);
        assert_relative_eq!(confidence, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_vehicle() {
        let classifier = Classifier::default();
        let (class, confidence) = classifier.classify(&features(4.0, 1.4, 1.5, 4.0, 10.0));
        assert_eq!(class, ObjectClass::Vehicle);
        assert_relative_eq!(confidence, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_fast_compact_object_is_vehicle() {
        // Precedence: speed alone is enough to win over pedestrian.
        let classifier = Classifier::default();
        let (class, _) = classifier.classify(&features(0.8, 0.6, 1.2, 6.0, 8.0));
        assert_eq!(class, ObjectClass::Vehicle);
    }

    #[test]
    fn test_bird() {
        let classifier = Classifier::default();
        let (class, confidence) = classifier.classify(&features(0.3, 0.2, 0.2, 0.4, 0.8));
        assert_eq!(class, ObjectClass::Bird);
        assert_relative_eq!(confidence, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_ambiguous_is_other() {
        let classifier = Classifier::default();
        // Too tall for a bird, too short for a pedestrian, too small for a vehicle.
        let (class, confidence) = classifier.classify(&features(0.8, 0.8, 0.7, 2.0, 2.5));
        assert_eq!(class, ObjectClass::Other);
        assert_relative_eq!(confidence, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_too_few_observations_is_other() {
        let classifier = Classifier::default();
        let mut f = features(4.5, 1.8, 1.5, 12.0, 14.0);
        f.observation_count = 2;
        assert_eq!(classifier.classify(&f).0, ObjectClass::Other);
    }

    #[test]
    fn test_confidence_floor_and_clamp() {
        let mut cfg = ClassifierConfig {
            base_confidence: 0.1,
            agreement_bonus: 0.0,
            ..ClassifierConfig::default()
        };
        let classifier = Classifier::new(cfg.clone());
        let (_, confidence) = classifier.classify(&features(4.0, 1.4, 1.5, 4.0, 4.0));
        assert_eq!(confidence, 0.5);

        cfg.base_confidence = 1.0;
        cfg.agreement_bonus = 0.5;
        let classifier = Classifier::new(cfg);
        let mut f = features(5.0, 2.0, 1.6, 12.0, 15.0);
        f.observation_count = 40;
        assert_eq!(classifier.classify(&f).1, 1.0);
    }

    #[test]
    fn test_observation_bonus() {
        let classifier = Classifier::default();
        let mut f = features(0.6, 0.6, 1.7, 1.2, 1.6);
        f.observation_count = 25;
        let (class, confidence) = classifier.classify(&f);
        assert_eq!(class, ObjectClass::Pedestrian);
        assert_relative_eq!(confidence, 0.85, epsilon = 1e-12);
    }

    #[test]
    fn test_class_labels_serialize_snake_case() {
        let json = serde_json::to_string(&ObjectClass::Pedestrian).unwrap();
        assert_eq!(json, "\"pedestrian\"");
        assert_eq!(ObjectClass::Vehicle.to_string(), "vehicle");
    }

    #[test]
    fn test_validate_rejects_inverted_height_band() {
        let cfg = ClassifierConfig {
            pedestrian_min_height: 2.0,
            pedestrian_max_height: 1.0,
            ..ClassifierConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfRange {
                field: "classifier.pedestrian_max_height",
                ..
            })
        ));
    }
}
