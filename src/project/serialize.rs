use super::model::{Collisions, GameScene, Snapshot};

/// Converts collision grids to row strings, the shape files and templates
/// use.
pub fn serialize(snapshot: &mut Snapshot) {
    for scene in &mut snapshot.scenes {
        serialize_scene(scene);
    }
}

/// Converts row strings back to the editor's grid shape.
pub fn unserialize(snapshot: &mut Snapshot) {
    for scene in &mut snapshot.scenes {
        unserialize_scene(scene);
    }
}

pub fn serialize_scene(scene: &mut GameScene) {
    convert(scene, Collisions::into_rows);
}

pub fn unserialize_scene(scene: &mut GameScene) {
    convert(scene, Collisions::into_grid);
}

fn convert(scene: &mut GameScene, f: fn(Collisions) -> Collisions) {
    let Some(map) = &mut scene.map else {
        return;
    };
    if let Some(collisions) = map.collisions.take() {
        map.collisions = Some(if collisions.is_empty() { collisions } else { f(collisions) });
    }
}
