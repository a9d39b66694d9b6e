//! The ordered layer sequence and its structural edits.
//!
//! Position in the sequence is the only stacking state: position 0 is the
//! bottom, higher positions draw on top. Band membership is re-derived
//! from each object's [`LayerType`] whenever an operation needs it.

use serde::{Deserialize, Serialize};

use crate::types::{LayerError, LayerId, LayerObject, LayerType};

/// Step direction for [`LayerStack::move_within_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// One step toward the top of the stack.
    Up,
    /// One step toward the bottom of the stack.
    Down,
}

/// Target end for [`LayerStack::move_to_edge_within_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    /// Topmost slot of the object's type.
    Top,
    /// Bottommost slot of the object's type.
    Bottom,
}

/// Ordered sequence of canvas objects grouped into z-bands by type.
///
/// Invariants kept by every operation:
///
/// - ids are unique;
/// - at most one frame exists, and it sits at position 0;
/// - a failed operation leaves the sequence unchanged.
///
/// Type ordering itself is only repaired by [`insert`](Self::insert) for
/// the new object and by [`resort_all`](Self::resort_all); a sequence
/// loaded from outside may be unsorted until resorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LayerObject>", into = "Vec<LayerObject>")]
pub struct LayerStack {
    objects: Vec<LayerObject>,
}

impl LayerStack {
    /// An empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Adopt an existing sequence as-is, apart from moving a frame to
    /// position 0.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Duplicate`] for a repeated id and
    /// [`LayerError::DuplicateFrame`] for more than one frame.
    pub fn from_objects(mut objects: Vec<LayerObject>) -> Result<Self, LayerError> {
        let mut seen = std::collections::HashSet::new();
        for obj in &objects {
            if !seen.insert(&obj.id) {
                return Err(LayerError::Duplicate(obj.id.clone()));
            }
        }
        let mut frames = objects.iter().enumerate().filter(|(_, o)| o.is_frame());
        let frame_at = frames.next().map(|(i, _)| i);
        if frames.next().is_some() {
            return Err(LayerError::DuplicateFrame);
        }
        if let Some(i) = frame_at {
            objects[..=i].rotate_right(1);
        }
        Ok(Self { objects })
    }

    /// Number of objects, frame included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the stack holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects from bottom to top.
    pub fn iter(&self) -> std::slice::Iter<'_, LayerObject> {
        self.objects.iter()
    }

    /// The object with the given id.
    #[must_use]
    pub fn get(&self, id: &LayerId) -> Option<&LayerObject> {
        self.objects.iter().find(|o| &o.id == id)
    }

    /// Current position of `id`, 0 being the bottom.
    #[must_use]
    pub fn position_of(&self, id: &LayerId) -> Option<usize> {
        self.objects.iter().position(|o| &o.id == id)
    }

    /// The frame, if the stack has one.
    #[must_use]
    pub fn frame(&self) -> Option<&LayerObject> {
        self.objects.first().filter(|o| o.is_frame())
    }

    /// First position available to regular objects.
    fn first_slot(&self) -> usize {
        usize::from(self.frame().is_some())
    }

    fn require(&self, id: &LayerId) -> Result<usize, LayerError> {
        self.position_of(id).ok_or_else(|| {
            tracing::warn!(%id, "layer not in stack");
            LayerError::NotFound(id.clone())
        })
    }

    /// Positions of every non-frame object of `layer_type`, bottom first.
    fn positions_of_type(&self, layer_type: LayerType) -> Vec<usize> {
        self.objects
            .iter()
            .enumerate()
            .skip(self.first_slot())
            .filter(|(_, o)| o.layer_type == layer_type)
            .map(|(i, _)| i)
            .collect()
    }

    /// Insert `obj` at the top of its type's band and return its position.
    ///
    /// `layer_type` overrides the object's own tag when given. The new
    /// object goes right after the last object whose band is at or below
    /// its own, so it lands above every existing object of its type and
    /// below the first object of a higher type. A frame always goes to
    /// position 0.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Duplicate`] if the id is already present and
    /// [`LayerError::DuplicateFrame`] when adding a second frame.
    pub fn insert(
        &mut self,
        mut obj: LayerObject,
        layer_type: Option<LayerType>,
    ) -> Result<usize, LayerError> {
        if self.position_of(&obj.id).is_some() {
            return Err(LayerError::Duplicate(obj.id));
        }
        if let Some(layer_type) = layer_type {
            obj.layer_type = layer_type;
        }

        if obj.is_frame() {
            if self.frame().is_some() {
                return Err(LayerError::DuplicateFrame);
            }
            tracing::debug!(id = %obj.id, "inserted frame");
            self.objects.insert(0, obj);
            return Ok(0);
        }

        let start = self.first_slot();
        let target = obj.layer_type;
        let position = self.objects[start..]
            .iter()
            .rposition(|o| o.layer_type <= target)
            .map_or(start, |i| start + i + 1);

        tracing::debug!(id = %obj.id, layer_type = %target, position, "inserted layer");
        self.objects.insert(position, obj);
        Ok(position)
    }

    /// Remove `id` from the stack and return it.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotFound`] if `id` is absent.
    pub fn remove(&mut self, id: &LayerId) -> Result<LayerObject, LayerError> {
        let position = self.require(id)?;
        Ok(self.objects.remove(position))
    }

    /// Retag `id` and move it into its new band, as if freshly inserted.
    /// Returns the new position.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotFound`] if `id` is absent.
    pub fn set_type(&mut self, id: &LayerId, layer_type: LayerType) -> Result<usize, LayerError> {
        let position = self.require(id)?;
        if self.objects[position].is_frame() {
            self.objects[position].layer_type = layer_type;
            return Ok(position);
        }
        let obj = self.objects.remove(position);
        self.insert(obj, Some(layer_type))
    }

    /// Swap `id` with its nearest same-type neighbour in `direction`.
    ///
    /// Only slots already held by the object's type are involved, so no
    /// object of another type ever changes position. Returns `false`
    /// when the object is already at that end of its type run, or is the
    /// frame.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotFound`] if `id` is absent.
    pub fn move_within_type(
        &mut self,
        id: &LayerId,
        direction: Direction,
    ) -> Result<bool, LayerError> {
        let position = self.require(id)?;
        if self.objects[position].is_frame() {
            return Ok(false);
        }

        let slots = self.positions_of_type(self.objects[position].layer_type);
        let Some(rank) = slots.iter().position(|&p| p == position) else {
            return Ok(false);
        };
        let neighbour = match direction {
            Direction::Up => slots.get(rank + 1),
            Direction::Down => rank.checked_sub(1).and_then(|r| slots.get(r)),
        };
        let Some(&other) = neighbour else {
            return Ok(false);
        };

        self.objects.swap(position, other);
        tracing::debug!(%id, ?direction, from = position, to = other, "moved layer within type");
        Ok(true)
    }

    /// Move `id` to the topmost or bottommost slot held by its type.
    ///
    /// The type's objects keep their slots and rotate through them; other
    /// types are untouched. Returns `false` when the object is already at
    /// that edge, or is the frame.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotFound`] if `id` is absent.
    pub fn move_to_edge_within_type(
        &mut self,
        id: &LayerId,
        edge: Edge,
    ) -> Result<bool, LayerError> {
        let position = self.require(id)?;
        if self.objects[position].is_frame() {
            return Ok(false);
        }

        let slots = self.positions_of_type(self.objects[position].layer_type);
        let Some(rank) = slots.iter().position(|&p| p == position) else {
            return Ok(false);
        };
        let edge_rank = match edge {
            Edge::Top => slots.len() - 1,
            Edge::Bottom => 0,
        };
        if rank == edge_rank {
            return Ok(false);
        }

        let mut run: Vec<LayerObject> = slots.iter().map(|&p| self.objects[p].clone()).collect();
        let moved = run.remove(rank);
        match edge {
            Edge::Top => run.push(moved),
            Edge::Bottom => run.insert(0, moved),
        }
        for (&slot, obj) in slots.iter().zip(run) {
            self.objects[slot] = obj;
        }

        tracing::debug!(%id, ?edge, "moved layer to edge of type");
        Ok(true)
    }

    /// Rebuild the order: frame first, then every type in band order,
    /// each type keeping its current relative order.
    ///
    /// Idempotent: resorting a sorted stack changes nothing.
    pub fn resort_all(&mut self) {
        let start = self.first_slot();
        let before = self.is_sorted();
        // `sort_by_key` is stable, so each type keeps its relative order.
        self.objects[start..].sort_by_key(|o| o.layer_type);
        tracing::debug!(len = self.objects.len(), was_sorted = before, "resorted layers");
    }

    /// Whether every type already occupies a contiguous run in band order.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.objects[self.first_slot()..]
            .windows(2)
            .all(|w| w[0].layer_type <= w[1].layer_type)
    }

    /// Derived z-index of every non-frame object, bottom first.
    ///
    /// The z-index is the start of the object's band plus its rank among
    /// objects of the same type, capped at the last slot of the band.
    #[must_use]
    pub fn z_indices(&self) -> Vec<(&LayerId, u32)> {
        let mut counts = [0_u32; LayerType::ALL.len()];
        self.objects[self.first_slot()..]
            .iter()
            .map(|o| {
                let band = o.layer_type.band();
                let count = &mut counts[o.layer_type.rank() as usize];
                let z = (band.start + *count).min(band.end - 1);
                *count += 1;
                (&o.id, z)
            })
            .collect()
    }

    /// Derived z-index of `id`, or `None` for the frame.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotFound`] if `id` is absent.
    pub fn z_index_of(&self, id: &LayerId) -> Result<Option<u32>, LayerError> {
        self.require(id)?;
        Ok(self
            .z_indices()
            .into_iter()
            .find(|(other, _)| *other == id)
            .map(|(_, z)| z))
    }
}

impl TryFrom<Vec<LayerObject>> for LayerStack {
    type Error = LayerError;

    fn try_from(objects: Vec<LayerObject>) -> Result<Self, Self::Error> {
        Self::from_objects(objects)
    }
}

impl From<LayerStack> for Vec<LayerObject> {
    fn from(stack: LayerStack) -> Self {
        stack.objects
    }
}

impl<'a> IntoIterator for &'a LayerStack {
    type Item = &'a LayerObject;
    type IntoIter = std::slice::Iter<'a, LayerObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
