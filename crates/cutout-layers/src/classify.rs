//! Default layer types for fresh cutouts.
//!
//! When a new cutout is placed on the canvas, an external classifier
//! decides whether it shows a character, a prop, or a scene. The model
//! itself lives outside this crate behind the [`Classifier`] trait.

use cutout_pipeline::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::stack::LayerStack;
use crate::types::{LayerError, LayerObject, LayerType};

/// What a classifier can report for a cutout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifiedType {
    /// A subject: person, animal, mascot.
    Character,
    /// An object.
    Prop,
    /// A backdrop.
    Scene,
}

impl From<ClassifiedType> for LayerType {
    fn from(classified: ClassifiedType) -> Self {
        match classified {
            ClassifiedType::Character => Self::Character,
            ClassifiedType::Prop => Self::Prop,
            ClassifiedType::Scene => Self::Scene,
        }
    }
}

/// Classification collaborator.
pub trait Classifier {
    /// Decide what `cutout` depicts.
    ///
    /// # Errors
    ///
    /// Implementations report failures as [`LayerError::Classification`].
    fn classify(&self, cutout: &RgbaImage) -> Result<ClassifiedType, LayerError>;
}

impl<F> Classifier for F
where
    F: Fn(&RgbaImage) -> ClassifiedType,
{
    fn classify(&self, cutout: &RgbaImage) -> Result<ClassifiedType, LayerError> {
        Ok(self(cutout))
    }
}

impl LayerStack {
    /// Classify `cutout` and insert `obj` with the resulting type.
    ///
    /// # Errors
    ///
    /// Propagates classifier failures, plus everything
    /// [`insert`](Self::insert) can return. The stack is unchanged on
    /// error.
    pub fn insert_classified<C: Classifier + ?Sized>(
        &mut self,
        obj: LayerObject,
        classifier: &C,
        cutout: &RgbaImage,
    ) -> Result<usize, LayerError> {
        let classified = classifier.classify(cutout)?;
        tracing::debug!(id = %obj.id, ?classified, "classified cutout");
        self.insert(obj, Some(classified.into()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::LayerId;

    /// Wide images are scenes, everything else a prop.
    struct AspectClassifier;

    impl Classifier for AspectClassifier {
        fn classify(&self, cutout: &RgbaImage) -> Result<ClassifiedType, LayerError> {
            if cutout.width() == 0 {
                return Err(LayerError::Classification("empty cutout".to_owned()));
            }
            Ok(if cutout.width() >= 2 * cutout.height() {
                ClassifiedType::Scene
            } else {
                ClassifiedType::Prop
            })
        }
    }

    #[test]
    fn classified_type_overrides_object_tag() {
        let mut stack = LayerStack::new();
        stack
            .insert(LayerObject::new("cup", LayerType::Prop), None)
            .unwrap();
        let at = stack
            .insert_classified(
                LayerObject::new("beach", LayerType::Composite),
                &AspectClassifier,
                &RgbaImage::new(40, 10),
            )
            .unwrap();
        assert_eq!(at, 0);
        assert_eq!(
            stack.get(&LayerId::new("beach")).unwrap().layer_type,
            LayerType::Scene
        );
    }

    #[test]
    fn closures_are_classifiers() {
        let mut stack = LayerStack::new();
        let always_character = |_: &RgbaImage| ClassifiedType::Character;
        stack
            .insert_classified(
                LayerObject::new("hero", LayerType::Prop),
                &always_character,
                &RgbaImage::new(4, 4),
            )
            .unwrap();
        assert_eq!(
            stack.get(&LayerId::new("hero")).unwrap().layer_type,
            LayerType::Character
        );
    }

    #[test]
    fn classifier_failure_leaves_stack_unchanged() {
        let mut stack = LayerStack::new();
        let result = stack.insert_classified(
            LayerObject::new("x", LayerType::Prop),
            &AspectClassifier,
            &RgbaImage::new(0, 0),
        );
        assert!(matches!(result, Err(LayerError::Classification(_))));
        assert!(stack.is_empty());
    }
}
