//! Core types for the layer stack.
//!
//! These are the shared data types that flow through every stack
//! operation. [`LayerType`] is a plain sum type on a stable per-object
//! record; the z-band each type owns is a pure function of the type, never
//! a stored value.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identifier of a canvas object, assigned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    /// Create an id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<String> for LayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for LayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Semantic category of a layer.
///
/// Declaration order is stacking order: a scene always sits below a
/// character, a character below a prop, and so on. Each type owns a
/// disjoint z-band of [`LayerType::BAND_SIZE`] slots.
///
/// Deserializing an unknown tag yields [`LayerType::Prop`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum LayerType {
    /// Backdrops and environments.
    Scene,
    /// People, animals, and other subjects.
    Character,
    /// Objects placed in the scene.
    #[default]
    Prop,
    /// Overlays such as lighting or particles.
    Effect,
    /// Merged results of several layers.
    Composite,
}

impl LayerType {
    /// Number of z slots in each band.
    pub const BAND_SIZE: u32 = 100;

    /// Every type in stacking order, bottom first.
    pub const ALL: [Self; 5] = [
        Self::Scene,
        Self::Character,
        Self::Prop,
        Self::Effect,
        Self::Composite,
    ];

    /// Zero-based rank in the stacking order.
    #[must_use]
    pub const fn rank(self) -> u32 {
        match self {
            Self::Scene => 0,
            Self::Character => 1,
            Self::Prop => 2,
            Self::Effect => 3,
            Self::Composite => 4,
        }
    }

    /// The z-band owned by this type: `Scene` is `0..100`, `Character`
    /// `100..200`, up to `Composite` at `400..500`.
    #[must_use]
    pub const fn band(self) -> Range<u32> {
        let start = self.rank() * Self::BAND_SIZE;
        start..start + Self::BAND_SIZE
    }

    /// Lowercase tag used in documents and on the command line.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Character => "character",
            Self::Prop => "prop",
            Self::Effect => "effect",
            Self::Composite => "composite",
        }
    }

    /// Parse a tag, case-insensitively. Unrecognized tags fall back to
    /// [`LayerType::Prop`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.tag().eq_ignore_ascii_case(tag.trim()))
            .unwrap_or_else(|| {
                tracing::warn!(tag, "unknown layer type, treating as prop");
                Self::Prop
            })
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.tag())
    }
}

impl FromStr for LayerType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_tag(s))
    }
}

impl From<String> for LayerType {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

/// A drawable canvas object as seen by the layer stack.
///
/// The host owns the actual rendering object; the stack only needs its
/// identity, category, and whether it is the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerObject {
    /// Host-assigned identity.
    pub id: LayerId,

    /// Semantic category. Missing in a document means `prop`.
    #[serde(default, rename = "type")]
    pub layer_type: LayerType,

    /// Whether the user can select the object.
    #[serde(default = "default_true")]
    pub selectable: bool,

    /// Whether the object receives pointer events.
    #[serde(default = "default_true")]
    pub evented: bool,
}

const fn default_true() -> bool {
    true
}

impl LayerObject {
    /// A regular, selectable object of the given type.
    pub fn new(id: impl Into<LayerId>, layer_type: LayerType) -> Self {
        Self {
            id: id.into(),
            layer_type,
            selectable: true,
            evented: true,
        }
    }

    /// The canvas frame: neither selectable nor evented.
    pub fn frame(id: impl Into<LayerId>) -> Self {
        Self {
            id: id.into(),
            layer_type: LayerType::Scene,
            selectable: false,
            evented: false,
        }
    }

    /// Frames are pinned to the bottom of the stack and never take part
    /// in type ordering.
    #[must_use]
    pub const fn is_frame(&self) -> bool {
        !self.selectable && !self.evented
    }
}

/// Errors from structural edits of a [`LayerStack`](crate::LayerStack).
///
/// A failed operation always leaves the stack unchanged.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    /// The object is not part of the stack.
    #[error("layer {0} is not in the stack")]
    NotFound(LayerId),

    /// An object with the same id is already in the stack.
    #[error("layer {0} is already in the stack")]
    Duplicate(LayerId),

    /// The stack already holds a frame.
    #[error("the stack already has a frame")]
    DuplicateFrame,

    /// The classification collaborator failed.
    #[error("classification failed: {0}")]
    Classification(String),
}
