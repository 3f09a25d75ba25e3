use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use super::model::*;

pub const DEFAULT_GRID_SIZE: i64 = 16;
const DEFAULT_OBJECT_SIZE: i64 = 1;

/// Pixel size of scene backgrounds.
pub trait BackgroundSizes: Send + Sync {
    /// Size of the named background, or of the fallback background when
    /// there is no name or the named image cannot be read.
    fn background_size(&self, name: Option<&str>) -> Option<(u32, u32)>;
}

/// Reads background sizes from image headers on disk.
#[derive(Debug, Clone)]
pub struct ImageSizes {
    graphics_dir: PathBuf,
    fallback: Option<PathBuf>,
}

impl ImageSizes {
    pub fn new(project_dir: &Path, fallback: Option<PathBuf>) -> Self {
        Self {
            graphics_dir: project_dir.join("graphics"),
            fallback,
        }
    }
}

impl BackgroundSizes for ImageSizes {
    fn background_size(&self, name: Option<&str>) -> Option<(u32, u32)> {
        let named = name.filter(|name| !name.is_empty()).and_then(|name| {
            ["bmp", "png"].iter().find_map(|ext| {
                let path = self.graphics_dir.join(format!("{name}.{ext}"));
                image::image_dimensions(&path).ok()
            })
        });
        named.or_else(|| {
            let fallback = self.fallback.as_deref()?;
            match image::image_dimensions(fallback) {
                Ok(size) => Some(size),
                Err(err) => {
                    debug!(path = %fallback.display(), %err, "cannot read default background");
                    None
                }
            }
        })
    }
}

/// A source that never knows any size.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackgrounds;

impl BackgroundSizes for NoBackgrounds {
    fn background_size(&self, _: Option<&str>) -> Option<(u32, u32)> {
        None
    }
}

/// Fills every gap in the snapshot. Explicit values are left alone, so
/// running this twice changes nothing the second time.
pub fn sanitize(snapshot: &mut Snapshot, sizes: &dyn BackgroundSizes) {
    for scene in &mut snapshot.scenes {
        sanitize_scene(scene, sizes);
    }
    for script in &mut snapshot.scripts {
        sanitize_script(script);
    }
    if let Some(project) = &mut snapshot.project {
        sanitize_project(project, &snapshot.scenes);
    }
}

pub fn sanitize_scene(scene: &mut GameScene, sizes: &dyn BackgroundSizes) {
    ensure_id(&mut scene.id);

    let map = scene.map.get_or_insert_with(GameMap::default);
    sanitize_map(map, scene.background.as_deref(), sizes);

    if scene.is_top_down() {
        let player = scene.player.get_or_insert_with(Player::default);
        player.kind = PLAYER_TYPE.to_string();
    }

    for actor in &mut scene.actors {
        ensure_id(&mut actor.id);
        actor.width.get_or_insert(DEFAULT_OBJECT_SIZE);
        actor.height.get_or_insert(DEFAULT_OBJECT_SIZE);
        sanitize_events(&mut actor.events.init);
        sanitize_events(&mut actor.events.interact);
        sanitize_events(&mut actor.events.update);
    }

    sanitize_events(&mut scene.events);
}

pub fn sanitize_script(script: &mut GameScript) {
    ensure_id(&mut script.id);
    sanitize_events(&mut script.events);
}

/// Links scene references to scene ids through their origin file, then
/// drops references to scenes the snapshot no longer has.
pub fn sanitize_project(project: &mut GameProject, scenes: &[GameScene]) {
    let same_file = |reference: &SceneRef, scene: &GameScene| {
        reference.file.is_some() && reference.file == scene.file
    };

    for reference in project.scenes.iter_mut().filter(|r| r.id.is_empty()) {
        if let Some(scene) = scenes.iter().find(|scene| same_file(reference, scene)) {
            reference.id = scene.id.clone();
        }
    }

    if !scenes.is_empty() {
        project.scenes.retain(|reference| {
            scenes.iter().any(|scene| {
                same_file(reference, scene) || (!reference.id.is_empty() && reference.id == scene.id)
            })
        });
    }
}

fn sanitize_map(map: &mut GameMap, background: Option<&str>, sizes: &dyn BackgroundSizes) {
    let grid = match map.grid_size {
        Some(size) if size > 0 => size,
        _ => DEFAULT_GRID_SIZE,
    };
    map.grid_size = Some(grid);

    let explicit = |value: Option<i64>| value.filter(|v| *v > 0);
    let (mut width, mut height) = (explicit(map.width), explicit(map.height));

    if width.is_none() || height.is_none() {
        if let Some(collisions) = map.collisions.as_ref().filter(|c| !c.is_empty()) {
            let (cols, rows) = collisions.shape();
            width = width.or(explicit(Some(cols as i64)));
            height = height.or(explicit(Some(rows as i64)));
        }
    }

    if width.is_none() || height.is_none() {
        if let Some((px_width, px_height)) = sizes.background_size(background) {
            width = width.or(explicit(Some(i64::from(px_width) / grid)));
            height = height.or(explicit(Some(i64::from(px_height) / grid)));
        }
    }

    map.width = Some(width.unwrap_or(0));
    map.height = Some(height.unwrap_or(0));

    for sensor in &mut map.sensors {
        ensure_id(&mut sensor.id);
        sensor.x.get_or_insert(0);
        sensor.y.get_or_insert(0);
        sensor.width.get_or_insert(DEFAULT_OBJECT_SIZE);
        sensor.height.get_or_insert(DEFAULT_OBJECT_SIZE);
        sanitize_events(&mut sensor.events);
    }
}

fn sanitize_events(events: &mut [SceneEvent]) {
    for event in events {
        ensure_id(&mut event.id);
        match &mut event.kind {
            EventKind::If(branch) => {
                for events in [&mut branch.then, &mut branch.otherwise].into_iter().flatten() {
                    sanitize_events(events);
                }
            }
            EventKind::OnButtonPress(press) => sanitize_events(&mut press.events),
            EventKind::WaitForButton(_)
            | EventKind::Wait(_)
            | EventKind::FadeIn(_)
            | EventKind::FadeOut(_)
            | EventKind::GoToScene(_)
            | EventKind::ShowDialog(_)
            | EventKind::SetVariable(_)
            | EventKind::DisableActor(_)
            | EventKind::EnableActor(_)
            | EventKind::PlayMusic(_)
            | EventKind::StopMusic(_)
            | EventKind::PlaySound(_)
            | EventKind::ExecuteScript(_)
            | EventKind::MoveCameraTo(_) => {}
        }
    }
}

fn ensure_id(id: &mut String) {
    if id.trim().is_empty() {
        *id = Uuid::new_v4().to_string();
    }
}
