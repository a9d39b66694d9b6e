//! cutout-layers: semantic z-band ordering for canvas objects.
//!
//! Every canvas object carries a [`LayerType`]. Types stack in a fixed
//! order (scene, character, prop, effect, composite) and each owns a
//! disjoint band of z slots. [`LayerStack`] keeps an ordered sequence
//! of objects consistent with that order across insertions, in-type moves,
//! and bulk resorts, with an optional frame pinned to the bottom.

pub mod classify;
pub mod stack;
pub mod types;

pub use classify::{ClassifiedType, Classifier};
pub use stack::{Direction, Edge, LayerStack};
pub use types::{LayerError, LayerId, LayerObject, LayerType};
