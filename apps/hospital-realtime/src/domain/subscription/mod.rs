//! Subscription Topic Types
//!
//! Domain types describing what the client asks the gateway to observe.
//!
//! # Design
//!
//! A topic is one of:
//! - a hospital, tagged with the feed it is observed through (surge or bedspace)
//! - a geographic region (centre point plus radius)
//! - a named channel
//!
//! Topic identity is the [`TopicKey`]: the discriminant plus its parameters.
//! Region radii are normalized to kilometres when the topic is built, and the
//! key quantizes coordinates and radius, so `5 km` and `5000 m` describe the
//! same subscription.

use std::fmt;
use std::hash::{Hash, Hasher};

// =============================================================================
// Hospital Feed
// =============================================================================

/// The feed a hospital topic is observed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HospitalFeed {
    /// Surge (emergency event) updates.
    Surge,
    /// Bed-space availability updates.
    Bedspace,
}

impl HospitalFeed {
    /// Get the feed name used in logs and room names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Surge => "surges",
            Self::Bedspace => "bedspace",
        }
    }
}

// =============================================================================
// Distance
// =============================================================================

/// A radius expressed in either kilometres or meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    /// Kilometres.
    Kilometers(f64),
    /// Meters.
    Meters(f64),
}

impl Distance {
    /// Get the distance in kilometres.
    #[must_use]
    pub fn as_km(&self) -> f64 {
        match *self {
            Self::Kilometers(km) => km,
            Self::Meters(m) => m / 1000.0,
        }
    }

    /// Get the distance in meters.
    #[must_use]
    pub fn as_meters(&self) -> f64 {
        match *self {
            Self::Kilometers(km) => km * 1000.0,
            Self::Meters(m) => m,
        }
    }
}

// =============================================================================
// Topic
// =============================================================================

/// An addressable scope of interest that can be subscribed to.
#[derive(Debug, Clone)]
pub enum Topic {
    /// A single hospital observed through one feed.
    Hospital {
        /// Hospital identifier.
        hospital_id: String,
        /// Feed the hospital is observed through.
        feed: HospitalFeed,
    },
    /// A circular geographic region.
    Region {
        /// Latitude of the centre, in degrees.
        latitude: f64,
        /// Longitude of the centre, in degrees.
        longitude: f64,
        /// Radius in kilometres.
        radius_km: f64,
    },
    /// A named broadcast channel.
    Channel {
        /// Channel name.
        name: String,
    },
}

impl Topic {
    /// Surge feed for a hospital.
    #[must_use]
    pub fn hospital_surges(hospital_id: impl Into<String>) -> Self {
        Self::Hospital {
            hospital_id: hospital_id.into(),
            feed: HospitalFeed::Surge,
        }
    }

    /// Bedspace feed for a hospital.
    #[must_use]
    pub fn hospital_bedspace(hospital_id: impl Into<String>) -> Self {
        Self::Hospital {
            hospital_id: hospital_id.into(),
            feed: HospitalFeed::Bedspace,
        }
    }

    /// Region topic; the radius is normalized to kilometres.
    #[must_use]
    pub fn region(latitude: f64, longitude: f64, radius: Distance) -> Self {
        Self::Region {
            latitude,
            longitude,
            radius_km: radius.as_km(),
        }
    }

    /// Named channel topic.
    #[must_use]
    pub fn channel(name: impl Into<String>) -> Self {
        Self::Channel { name: name.into() }
    }

    /// Get the identity key of this topic.
    #[must_use]
    pub fn key(&self) -> TopicKey {
        match self {
            Self::Hospital { hospital_id, feed } => TopicKey::Hospital {
                feed: *feed,
                hospital_id: hospital_id.clone(),
            },
            Self::Region {
                latitude,
                longitude,
                radius_km,
            } => TopicKey::Region {
                latitude_micro: quantize(*latitude, 1_000_000.0),
                longitude_micro: quantize(*longitude, 1_000_000.0),
                radius_m: quantize(*radius_km, 1_000.0),
            },
            Self::Channel { name } => TopicKey::Channel(name.clone()),
        }
    }

    /// Get the topic kind label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hospital { .. } => "hospital",
            Self::Region { .. } => "region",
            Self::Channel { .. } => "channel",
        }
    }
}

impl PartialEq for Topic {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Topic {}

impl Hash for Topic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hospital { hospital_id, feed } => {
                write!(f, "hospital:{hospital_id}:{}", feed.as_str())
            }
            Self::Region {
                latitude,
                longitude,
                radius_km,
            } => write!(f, "region:{latitude}:{longitude}:{radius_km}"),
            Self::Channel { name } => write!(f, "channel:{name}"),
        }
    }
}

// =============================================================================
// Topic Key
// =============================================================================

/// Identity of a topic: discriminant plus normalized parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicKey {
    /// Hospital topic identity.
    Hospital {
        /// Feed tag.
        feed: HospitalFeed,
        /// Hospital identifier.
        hospital_id: String,
    },
    /// Region topic identity, in micro-degrees and whole meters.
    Region {
        /// Latitude in micro-degrees.
        latitude_micro: i64,
        /// Longitude in micro-degrees.
        longitude_micro: i64,
        /// Radius rounded to the meter.
        radius_m: i64,
    },
    /// Channel topic identity.
    Channel(String),
}

#[allow(clippy::cast_possible_truncation)]
fn quantize(value: f64, scale: f64) -> i64 {
    (value * scale).round() as i64
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn distance_conversions() {
        assert!((Distance::Meters(2500.0).as_km() - 2.5).abs() < f64::EPSILON);
        assert!((Distance::Kilometers(2.5).as_meters() - 2500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn region_radius_units_share_identity() {
        let km = Topic::region(6.5244, 3.3792, Distance::Kilometers(5.0));
        let m = Topic::region(6.5244, 3.3792, Distance::Meters(5000.0));

        assert_eq!(km, m);
        assert_eq!(km.key(), m.key());

        let mut set = HashSet::new();
        set.insert(km);
        set.insert(m);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn region_keys_differ_by_radius() {
        let a = Topic::region(6.5, 3.3, Distance::Kilometers(5.0));
        let b = Topic::region(6.5, 3.3, Distance::Kilometers(10.0));
        assert_ne!(a, b);
    }

    #[test]
    fn hospital_feeds_are_distinct_topics() {
        let surges = Topic::hospital_surges("h1");
        let beds = Topic::hospital_bedspace("h1");
        assert_ne!(surges, beds);
        assert_eq!(surges, Topic::hospital_surges("h1"));
    }

    #[test]
    fn channel_identity_is_name() {
        assert_eq!(Topic::channel("alerts"), Topic::channel("alerts"));
        assert_ne!(Topic::channel("alerts"), Topic::channel("ops"));
    }

    #[test]
    fn display_matches_room_names() {
        assert_eq!(Topic::hospital_surges("h1").to_string(), "hospital:h1:surges");
        assert_eq!(
            Topic::hospital_bedspace("h1").to_string(),
            "hospital:h1:bedspace"
        );
        assert_eq!(Topic::channel("ops").to_string(), "channel:ops");
        assert_eq!(
            Topic::region(1.5, 2.0, Distance::Meters(3000.0)).to_string(),
            "region:1.5:2:3"
        );
    }

    #[test]
    fn kind_labels() {
        assert_eq!(Topic::hospital_surges("h").kind(), "hospital");
        assert_eq!(Topic::channel("c").kind(), "channel");
        assert_eq!(
            Topic::region(0.0, 0.0, Distance::Kilometers(1.0)).kind(),
            "region"
        );
    }
}
