//! Integration test: replay a short editing session against a layer
//! document and check the stacking invariants after every step.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cutout_layers::{Direction, Edge, LayerId, LayerObject, LayerStack, LayerType};

const DOCUMENT: &str = r#"[
    {"id": "hat", "type": "prop"},
    {"id": "canvas", "type": "scene", "selectable": false, "evented": false},
    {"id": "sky", "type": "scene"},
    {"id": "sparkles", "type": "effect"},
    {"id": "dog", "type": "character"},
    {"id": "ball", "type": "toy"}
]"#;

fn assert_invariants(stack: &LayerStack) {
    assert!(stack.is_sorted(), "stack out of band order: {stack:?}");
    assert_eq!(stack.frame().map(|f| f.id.as_str()), Some("canvas"));
    for (id, z) in stack.z_indices() {
        let t = stack.get(id).unwrap().layer_type;
        assert!(t.band().contains(&z), "{id} at z {z} outside {t} band");
    }
}

fn order(stack: &LayerStack) -> Vec<&str> {
    stack.iter().map(|o| o.id.as_str()).collect()
}

#[test]
fn editing_session_keeps_bands_intact() {
    let mut stack: LayerStack = serde_json::from_str(DOCUMENT).expect("valid document");
    stack.resort_all();
    assert_invariants(&stack);
    assert_eq!(
        order(&stack),
        ["canvas", "sky", "dog", "hat", "ball", "sparkles"]
    );

    // A new backdrop lands above the old one but below every character.
    stack
        .insert(LayerObject::new("mountains", LayerType::Scene), None)
        .unwrap();
    assert_invariants(&stack);
    assert_eq!(stack.position_of(&LayerId::new("mountains")), Some(2));

    // Bring the ball under the hat, then to the top of the props.
    assert!(stack.move_within_type(&LayerId::new("ball"), Direction::Down).unwrap());
    assert_eq!(order(&stack)[4..6], ["ball", "hat"]);
    assert!(stack.move_to_edge_within_type(&LayerId::new("ball"), Edge::Top).unwrap());
    assert_eq!(order(&stack)[4..6], ["hat", "ball"]);
    assert_invariants(&stack);

    // The dog becomes a prop and joins the top of that band.
    stack.set_type(&LayerId::new("dog"), LayerType::Prop).unwrap();
    assert_invariants(&stack);
    assert_eq!(
        order(&stack),
        ["canvas", "sky", "mountains", "hat", "ball", "dog", "sparkles"]
    );

    let saved = serde_json::to_string(&stack).unwrap();
    let reloaded: LayerStack = serde_json::from_str(&saved).unwrap();
    assert_eq!(reloaded, stack);
}
