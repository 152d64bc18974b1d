//! Drawing operation data model.
//!
//! An operation is one drawn primitive on the shared canvas. Clients stream
//! an in-progress stroke as repeated full-object sends (the point list grows
//! each time), so the server must be able to recognize later sends as the
//! same logical operation. That recognition key is [`UpsertKey`]: variant
//! kind + starting point + color + stroke width. The client-generated `id`
//! may be absent on the first send of a stroke, which is why the key is
//! derived from visual attributes instead.

use serde::{Deserialize, Serialize};

use crate::{
    errors::{ProtocolError, Result},
    types::Point,
};

/// Discriminant of a [`DrawingOperation`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Freehand pen stroke.
    FreehandStroke,
    /// Eraser stroke.
    EraseStroke,
    /// Axis-aligned rectangle.
    Rectangle,
    /// Circle defined by a bounding segment.
    Circle,
}

/// One drawn primitive on the shared canvas.
///
/// Operations are immutable once created except for in-place replacement by
/// key: a stroke "grows" by being resent in full with more points, replacing
/// the prior version rather than appending to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DrawingOperation {
    /// Freehand pen stroke along an ordered point sequence.
    FreehandStroke {
        /// Client-generated id; may be absent on the first send.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// CSS-style color string, treated as opaque.
        color: String,
        /// Stroke width in canvas units.
        width: f32,
        /// Ordered point sequence; authoritative full geometry on every send.
        points: Vec<Point>,
    },

    /// Eraser stroke along an ordered point sequence.
    EraseStroke {
        /// Client-generated id; may be absent on the first send.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// CSS-style color string, treated as opaque.
        color: String,
        /// Stroke width in canvas units.
        width: f32,
        /// Ordered point sequence; authoritative full geometry on every send.
        points: Vec<Point>,
    },

    /// Axis-aligned rectangle from `start` to `end`.
    Rectangle {
        /// Client-generated id; may be absent while dragging.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// CSS-style color string, treated as opaque.
        color: String,
        /// Stroke width in canvas units.
        width: f32,
        /// Anchor corner (fixed while dragging).
        start: Point,
        /// Opposite corner (moves while dragging).
        end: Point,
    },

    /// Circle inscribed in the segment from `start` to `end`.
    Circle {
        /// Client-generated id; may be absent while dragging.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// CSS-style color string, treated as opaque.
        color: String,
        /// Stroke width in canvas units.
        width: f32,
        /// Anchor point (fixed while dragging).
        start: Point,
        /// Opposite point (moves while dragging).
        end: Point,
    },
}

/// Derived replace-if-match key for upserts into the operation log.
///
/// Coordinates and width are compared bit-exact: clients resend the
/// identical first point verbatim, so float equality is reliable here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpsertKey {
    kind: OpKind,
    start_bits: (u32, u32),
    color: String,
    width_bits: u32,
}

impl DrawingOperation {
    /// Variant discriminant.
    pub fn kind(&self) -> OpKind {
        match self {
            Self::FreehandStroke { .. } => OpKind::FreehandStroke,
            Self::EraseStroke { .. } => OpKind::EraseStroke,
            Self::Rectangle { .. } => OpKind::Rectangle,
            Self::Circle { .. } => OpKind::Circle,
        }
    }

    /// Client-generated id, if the client assigned one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::FreehandStroke { id, .. }
            | Self::EraseStroke { id, .. }
            | Self::Rectangle { id, .. }
            | Self::Circle { id, .. } => id.as_deref(),
        }
    }

    /// Color attribute, opaque to the broker.
    pub fn color(&self) -> &str {
        match self {
            Self::FreehandStroke { color, .. }
            | Self::EraseStroke { color, .. }
            | Self::Rectangle { color, .. }
            | Self::Circle { color, .. } => color,
        }
    }

    /// Stroke width attribute.
    pub fn width(&self) -> f32 {
        match self {
            Self::FreehandStroke { width, .. }
            | Self::EraseStroke { width, .. }
            | Self::Rectangle { width, .. }
            | Self::Circle { width, .. } => *width,
        }
    }

    /// Starting point of the primitive.
    ///
    /// `None` only for a stroke with an empty point sequence, which
    /// [`DrawingOperation::validate`] rejects.
    pub fn start_point(&self) -> Option<Point> {
        match self {
            Self::FreehandStroke { points, .. } | Self::EraseStroke { points, .. } => {
                points.first().copied()
            },
            Self::Rectangle { start, .. } | Self::Circle { start, .. } => Some(*start),
        }
    }

    /// Derived upsert key, if the operation has a starting point.
    pub fn upsert_key(&self) -> Option<UpsertKey> {
        let start = self.start_point()?;

        Some(UpsertKey {
            kind: self.kind(),
            start_bits: (start.x.to_bits(), start.y.to_bits()),
            color: self.color().to_string(),
            width_bits: self.width().to_bits(),
        })
    }

    /// Check geometry is usable before it enters the operation log.
    ///
    /// Strokes must carry at least one point; all coordinates and the width
    /// must be finite. An operation that fails here is malformed input and
    /// grounds for terminating the sending connection.
    pub fn validate(&self) -> Result<()> {
        if !self.width().is_finite() {
            return Err(ProtocolError::InvalidOperation("non-finite stroke width".to_string()));
        }

        match self {
            Self::FreehandStroke { points, .. } | Self::EraseStroke { points, .. } => {
                if points.is_empty() {
                    return Err(ProtocolError::InvalidOperation(
                        "stroke with no points".to_string(),
                    ));
                }
                if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
                    return Err(ProtocolError::InvalidOperation(
                        "non-finite stroke coordinate".to_string(),
                    ));
                }
            },
            Self::Rectangle { start, end, .. } | Self::Circle { start, end, .. } => {
                for p in [start, end] {
                    if !p.x.is_finite() || !p.y.is_finite() {
                        return Err(ProtocolError::InvalidOperation(
                            "non-finite shape coordinate".to_string(),
                        ));
                    }
                }
            },
        }

        Ok(())
    }
}
