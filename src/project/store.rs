use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use super::model::*;
use super::sanitize::{BackgroundSizes, sanitize};
use super::serialize::{serialize, unserialize};
use crate::error::{IoContext, Result};

const CONTENT_DIR: &str = "content";
const LEGACY_DATA_DIR: &str = "data";
const GRAPHICS_DIR: &str = "graphics";
const AUDIO_DIR: &str = "audio";

const MUSIC_EXTENSIONS: &[&str] = &["mod", "s3m", "xm", "it", "vgm"];
const SOUND_EXTENSIONS: &[&str] = &["wav"];

const SCENE_PREFIX: &str = "scene";
const SCRIPT_PREFIX: &str = "script";
const VARIABLES_PREFIX: &str = "variables";

/// Reads and writes a project tree: the project file plus its scene,
/// script, variable and asset files.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    project_file: PathBuf,
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(project_file: impl Into<PathBuf>) -> Self {
        let project_file = project_file.into();
        let root = project_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self { project_file, root }
    }

    pub fn project_file(&self) -> &Path {
        &self.project_file
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `content/` in current projects, `data/` in older ones.
    pub async fn data_dir(&self) -> PathBuf {
        let content = self.root.join(CONTENT_DIR);
        match fs::metadata(&content).await {
            Ok(meta) if meta.is_dir() => content,
            _ => self.root.join(LEGACY_DATA_DIR),
        }
    }

    pub async fn read_project(&self) -> Result<GameProject> {
        read_json(&self.project_file).await
    }

    /// Loads the whole project, sanitized and with collisions in grid shape.
    pub async fn load(&self, sizes: &dyn BackgroundSizes) -> Result<Snapshot> {
        let data_dir = self.data_dir().await;
        let mut snapshot = Snapshot {
            project: Some(self.read_project().await?),
            ..Default::default()
        };

        for file in list_files(&data_dir, |name| is_record(name, SCENE_PREFIX)).await? {
            let mut scene: GameScene = read_json(&data_dir.join(&file)).await?;
            scene.file = Some(file);
            snapshot.scenes.push(scene);
        }
        for file in list_files(&data_dir, |name| is_record(name, SCRIPT_PREFIX)).await? {
            let mut script: GameScript = read_json(&data_dir.join(&file)).await?;
            script.file = Some(file);
            snapshot.scripts.push(script);
        }
        for file in list_files(&data_dir, |name| is_record(name, VARIABLES_PREFIX)).await? {
            let mut variables: VariableSet = read_json(&data_dir.join(&file)).await?;
            variables.file = Some(file);
            snapshot.variables.push(variables);
        }

        let graphics_dir = self.root.join(GRAPHICS_DIR);
        for file in list_files(&graphics_dir, |name| name.ends_with(".json")).await? {
            let mut asset: GraphicAsset = read_json(&graphics_dir.join(&file)).await?;
            asset.file = Some(file);
            match asset.kind.as_str() {
                "sprite" => snapshot.sprites.push(asset),
                "regular_bg" => snapshot.backgrounds.push(asset),
                other => debug!(file = ?asset.file, kind = other, "skipping graphics description"),
            }
        }

        let audio_dir = self.root.join(AUDIO_DIR);
        snapshot.music = list_files(&audio_dir, |name| has_extension(name, MUSIC_EXTENSIONS)).await?;
        snapshot.sounds = list_files(&audio_dir, |name| has_extension(name, SOUND_EXTENSIONS)).await?;

        sanitize(&mut snapshot, sizes);
        unserialize(&mut snapshot);

        debug!(
            project = %self.project_file.display(),
            scenes = snapshot.scenes.len(),
            scripts = snapshot.scripts.len(),
            "project loaded"
        );
        Ok(snapshot)
    }

    /// Writes the snapshot back. Scene and script files that no longer have
    /// a record are deleted. Records without an origin file get one named
    /// after their id.
    pub async fn save(&self, mut snapshot: Snapshot) -> Result<()> {
        serialize(&mut snapshot);

        let data_dir = self.data_dir().await;
        fs::create_dir_all(&data_dir)
            .await
            .with_path("create", &data_dir)?;

        for variables in &snapshot.variables {
            let file = variables
                .file
                .clone()
                .unwrap_or_else(|| format!("{VARIABLES_PREFIX}.json"));
            write_json(&data_dir.join(file), &without_origin(variables)?).await?;
        }

        let mut scene_files = Vec::with_capacity(snapshot.scenes.len());
        for scene in &snapshot.scenes {
            let file = origin_file(scene.file.as_deref(), SCENE_PREFIX, &scene.id);
            write_json(&data_dir.join(&file), &without_origin(scene)?).await?;
            scene_files.push(file);
        }
        remove_stale(&data_dir, SCENE_PREFIX, &scene_files).await?;

        let mut script_files = Vec::with_capacity(snapshot.scripts.len());
        for script in &snapshot.scripts {
            let file = origin_file(script.file.as_deref(), SCRIPT_PREFIX, &script.id);
            write_json(&data_dir.join(&file), &without_origin(script)?).await?;
            script_files.push(file);
        }
        remove_stale(&data_dir, SCRIPT_PREFIX, &script_files).await?;

        if let Some(project) = &snapshot.project {
            write_json(&self.project_file, &serde_json::to_value(project)?).await?;
        }

        Ok(())
    }
}

fn origin_file(file: Option<&str>, prefix: &str, id: &str) -> String {
    match file {
        Some(file) if !file.is_empty() => file.to_string(),
        _ => format!("{prefix}_{id}.json"),
    }
}

fn is_record(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix) && name.ends_with(".json")
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// File names in `dir` accepted by `filter`, sorted. A missing directory
/// has no files.
async fn list_files(dir: &Path, filter: impl Fn(&str) -> bool) -> Result<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err::<Vec<String>, _>(err).with_path("list", dir),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.with_path("list", dir)? {
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_file && filter(&name) {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

async fn remove_stale(dir: &Path, prefix: &str, keep: &[String]) -> Result<()> {
    for file in list_files(dir, |name| is_record(name, prefix)).await? {
        if !keep.contains(&file) {
            let path = dir.join(&file);
            debug!(path = %path.display(), "removing stale record");
            fs::remove_file(&path).await.with_path("remove", &path)?;
        }
    }
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).await.with_path("read", path)?;
    serde_json::from_str(&text).map_err(|err| {
        warn!(path = %path.display(), %err, "malformed project file");
        err.into()
    })
}

async fn write_json(path: &Path, value: &Value) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    fs::write(path, text).await.with_path("write", path)
}

fn without_origin<T: Serialize>(record: &T) -> Result<Value> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        map.remove("_file");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::project::NoBackgrounds;

    fn write(path: &Path, value: Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    fn project_tree(data_dir: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("game.json"),
            json!({ "name": "Demo", "scenes": [{ "_file": "scene_1.json" }] }),
        );
        write(
            &root.join(data_dir).join("scene_1.json"),
            json!({
                "name": "Intro",
                "sceneType": "2d-top-down",
                "map": { "collisions": ["0,1", "1,0"] },
            }),
        );
        write(&root.join(data_dir).join("script_1.json"), json!({ "name": "Door" }));
        write(&root.join(data_dir).join("variables.json"), json!({ "coins": 0 }));
        write(
            &root.join("graphics").join("hero.json"),
            json!({ "type": "sprite", "height": 32 }),
        );
        write(&root.join("graphics").join("forest.json"), json!({ "type": "regular_bg" }));
        std::fs::create_dir_all(root.join("audio")).unwrap();
        for file in ["theme.xm", "jump.wav", "notes.txt"] {
            std::fs::write(root.join("audio").join(file), b"").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_load_project_tree() {
        let dir = project_tree("data");
        let store = ProjectStore::new(dir.path().join("game.json"));
        assert_eq!(store.data_dir().await, dir.path().join("data"));

        let snapshot = store.load(&NoBackgrounds).await.unwrap();

        let scene = &snapshot.scenes[0];
        assert_eq!(scene.file.as_deref(), Some("scene_1.json"));
        assert!(!scene.id.is_empty());
        assert!(scene.player.is_some());
        let map = scene.map.as_ref().unwrap();
        assert_eq!((map.width, map.height), (Some(2), Some(2)));
        assert!(matches!(map.collisions, Some(Collisions::Grid(_))));

        let project = snapshot.project.as_ref().unwrap();
        assert_eq!(project.scenes[0].id, scene.id);

        assert_eq!(snapshot.scripts[0].name, "Door");
        assert_eq!(snapshot.variables[0].values["coins"], 0);
        assert_eq!(snapshot.sprites[0].file.as_deref(), Some("hero.json"));
        assert_eq!(snapshot.backgrounds[0].file.as_deref(), Some("forest.json"));
        assert_eq!(snapshot.music, ["theme.xm"]);
        assert_eq!(snapshot.sounds, ["jump.wav"]);
    }

    #[tokio::test]
    async fn test_save_project_tree() {
        let dir = project_tree("content");
        write(&dir.path().join("content").join("scene_old.json"), json!({}));
        let store = ProjectStore::new(dir.path().join("game.json"));

        let mut snapshot = store.load(&NoBackgrounds).await.unwrap();
        snapshot.scenes.retain(|scene| scene.file.as_deref() == Some("scene_1.json"));
        snapshot.scenes[0].name = "Renamed".into();
        store.save(snapshot).await.unwrap();

        let content = dir.path().join("content");
        assert!(!content.join("scene_old.json").exists());

        let text = std::fs::read_to_string(content.join("scene_1.json")).unwrap();
        assert!(text.ends_with("}\n"));
        let saved: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(saved["name"], "Renamed");
        assert_eq!(saved["map"]["collisions"], json!(["0,1", "1,0"]));
        assert!(saved.get("_file").is_none());

        let project: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("game.json")).unwrap())
                .unwrap();
        assert_eq!(project["scenes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_file_filters() {
        assert!(is_record("variables_1.json", VARIABLES_PREFIX));
        assert!(is_record("scene.json", SCENE_PREFIX));
        assert!(!is_record("scenes.txt", SCENE_PREFIX));
        assert!(has_extension("Song.MOD", MUSIC_EXTENSIONS));
        assert!(!has_extension("jump.wav", MUSIC_EXTENSIONS));
    }
}
