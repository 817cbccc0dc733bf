//! Stroke data types shared by the relay and the wire protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CanvasConfig;
use crate::session::ClientId;

/// Client-chosen stroke identity (the reference client uses UUIDs)
pub type StrokeId = String;

/// A canvas coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Clamp into `[0, width] x [0, height]`
    pub fn clamped(self, canvas: &CanvasConfig) -> Self {
        Self {
            x: self.x.clamp(0.0, canvas.width.max(0.0)),
            y: self.y.clamp(0.0, canvas.height.max(0.0)),
        }
    }
}

/// How a segment's points relate to the stroke's point log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMode {
    /// The full point list so far; only the unseen tail extends the log
    Snapshot,
    /// New points to append
    Append,
}

/// Drawing update fanned out to the other clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawingEvent {
    pub id: StrokeId,
    #[serde(with = "flat_points")]
    pub points: Vec<Point>,
    pub owner: ClientId,
    /// Per-owner sequence number, strictly increasing in send order
    pub seq: u64,
    pub mode: SegmentMode,
}

/// One continuous gesture, pointer-down to pointer-up
#[derive(Debug, Clone, Serialize)]
pub struct Stroke {
    pub id: StrokeId,
    pub owner: ClientId,
    #[serde(with = "flat_points")]
    pub points: Vec<Point>,
    pub finalized: bool,
    pub created_at: DateTime<Utc>,
    /// Sequence number of the owner's last accepted segment
    pub last_seq: u64,
    #[serde(skip)]
    pub(crate) ordinal: u64,
}

/// Points travel as a flat `[x0, y0, x1, y1, ...]` array, the layout the
/// whiteboard's line primitive uses.
pub mod flat_points {
    use super::Point;
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(points: &[Point], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(points.len() * 2))?;
        for point in points {
            seq.serialize_element(&point.x)?;
            seq.serialize_element(&point.y)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Point>, D::Error> {
        let flat = Vec::<f64>::deserialize(deserializer)?;
        if flat.len() % 2 != 0 {
            return Err(D::Error::custom(format!(
                "points must hold x,y pairs, got {} coordinates",
                flat.len()
            )));
        }
        Ok(flat
            .chunks_exact(2)
            .map(|pair| Point::new(pair[0], pair[1]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_into_canvas() {
        let canvas = CanvasConfig {
            width: 800.0,
            height: 600.0,
        };
        assert_eq!(Point::new(-5.0, 10.0).clamped(&canvas), Point::new(0.0, 10.0));
        assert_eq!(Point::new(900.0, 700.0).clamped(&canvas), Point::new(800.0, 600.0));
        assert_eq!(Point::new(12.5, 40.0).clamped(&canvas), Point::new(12.5, 40.0));
    }

    #[test]
    fn test_finite() {
        assert!(Point::new(1.0, 2.0).is_finite());
        assert!(!Point::new(f64::NAN, 2.0).is_finite());
        assert!(!Point::new(1.0, f64::INFINITY).is_finite());
    }
}
