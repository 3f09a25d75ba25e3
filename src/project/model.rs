use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{NamedConfiguration, ProjectSettings};

/// Unmodelled keys of a record, kept so they survive a load/save cycle and
/// still reach the templates.
pub type Fields = serde_json::Map<String, Value>;

pub const TOP_DOWN_SCENE: &str = "2d-top-down";
pub const PLAYER_TYPE: &str = "player";

/// Everything a build (or a save) works from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<GameProject>,
    #[serde(default)]
    pub scenes: Vec<GameScene>,
    #[serde(default)]
    pub scripts: Vec<GameScript>,
    #[serde(default)]
    pub variables: Vec<VariableSet>,
    #[serde(default)]
    pub sprites: Vec<GraphicAsset>,
    #[serde(default)]
    pub backgrounds: Vec<GraphicAsset>,
    #[serde(default)]
    pub music: Vec<String>,
    #[serde(default)]
    pub sounds: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameProject {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rom_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rom_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_scene: Option<String>,
    #[serde(default)]
    pub scenes: Vec<SceneRef>,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<NamedConfiguration>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// A project's pointer to one of its scene files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_file", default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameScene {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<GameMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<Player>,
    #[serde(default)]
    pub actors: Vec<GameActor>,
    #[serde(default)]
    pub events: Vec<SceneEvent>,
    #[serde(rename = "_file", default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

impl GameScene {
    pub fn is_top_down(&self) -> bool {
        self.scene_type.as_deref() == Some(TOP_DOWN_SCENE)
    }
}

/// Player start of a top-down scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    #[serde(rename = "type", default = "player_type")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient::int")]
    pub x: i64,
    #[serde(default, deserialize_with = "lenient::int")]
    pub y: i64,
    #[serde(flatten)]
    pub extra: Fields,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            kind: player_type(),
            x: 0,
            y: 0,
            extra: Fields::new(),
        }
    }
}

fn player_type() -> String {
    PLAYER_TYPE.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMap {
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collisions: Option<Collisions>,
    #[serde(default)]
    pub sensors: Vec<GameSensor>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// Collision data in either of its two shapes. The editor works on a grid
/// of cells; files and templates use one comma-joined string per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Collisions {
    Grid(Vec<Vec<String>>),
    Rows(Vec<String>),
}

impl Collisions {
    /// Converts to the row-string shape. A no-op on rows.
    pub fn into_rows(self) -> Self {
        match self {
            Collisions::Grid(grid) => {
                Collisions::Rows(grid.into_iter().map(|row| row.join(",")).collect())
            }
            rows => rows,
        }
    }

    /// Converts to the grid shape. A no-op on grids. An empty row string is
    /// an empty row.
    pub fn into_grid(self) -> Self {
        match self {
            Collisions::Rows(rows) => Collisions::Grid(
                rows.into_iter()
                    .map(|row| {
                        if row.is_empty() {
                            Vec::new()
                        } else {
                            row.split(',').map(str::to_string).collect()
                        }
                    })
                    .collect(),
            ),
            grid => grid,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Collisions::Grid(grid) => grid.is_empty(),
            Collisions::Rows(rows) => rows.is_empty(),
        }
    }

    /// `(width, height)` in tiles, read off the first row.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Collisions::Grid(grid) => (grid.first().map_or(0, Vec::len), grid.len()),
            Collisions::Rows(rows) => {
                let width = rows
                    .first()
                    .filter(|row| !row.is_empty())
                    .map_or(0, |row| row.split(',').count());
                (width, rows.len())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameSensor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(default)]
    pub events: Vec<SceneEvent>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameActor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(default)]
    pub events: ActorEvents,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorEvents {
    #[serde(default)]
    pub init: Vec<SceneEvent>,
    #[serde(default)]
    pub interact: Vec<SceneEvent>,
    #[serde(default)]
    pub update: Vec<SceneEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameScript {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub events: Vec<SceneEvent>,
    #[serde(rename = "_file", default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// One variables file: a flat object of variable name to initial value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableSet {
    #[serde(rename = "_file", default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(flatten)]
    pub values: Fields,
}

/// A sprite or background description from `graphics/*.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphicAsset {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "_file", default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// An event in a scene, actor, sensor or script event chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEvent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl SceneEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: String::new(),
            kind,
        }
    }
}

/// Event kinds, keyed by their `type` tag. Only the kinds that nest other
/// events are modelled in detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    If(IfEvent),
    OnButtonPress(ButtonPressEvent),
    WaitForButton(Fields),
    Wait(Fields),
    FadeIn(Fields),
    FadeOut(Fields),
    GoToScene(Fields),
    ShowDialog(Fields),
    SetVariable(Fields),
    DisableActor(Fields),
    EnableActor(Fields),
    PlayMusic(Fields),
    StopMusic(Fields),
    PlaySound(Fields),
    ExecuteScript(Fields),
    MoveCameraTo(Fields),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IfEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<Vec<SceneEvent>>,
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Vec<SceneEvent>>,
    #[serde(flatten)]
    pub rest: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonPressEvent {
    #[serde(default)]
    pub events: Vec<SceneEvent>,
    #[serde(flatten)]
    pub rest: Fields,
}

/// Geometry fields are edited as text in places, so numbers may arrive as
/// strings. Anything that is not a number is treated as unset.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(to_int(&Value::deserialize(deserializer)?))
    }

    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        opt_int(deserializer).map(Option::unwrap_or_default)
    }

    fn to_int(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
            }
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_event_tree_roundtrip() {
        let raw = json!({
            "id": "e1",
            "type": "if",
            "conditions": [{ "op": "eq" }],
            "then": [{ "type": "wait", "duration": { "type": "value", "value": 10 } }],
            "else": [{ "type": "on-button-press", "buttons": ["A"], "events": [{ "type": "stop-music" }] }],
        });

        let event: SceneEvent = serde_json::from_value(raw.clone()).unwrap();
        let EventKind::If(branch) = &event.kind else {
            panic!("expected an if event");
        };
        assert_eq!(event.id, "e1");
        assert_eq!(branch.then.as_ref().unwrap().len(), 1);
        assert!(branch.rest.contains_key("conditions"));
        let otherwise = branch.otherwise.as_ref().unwrap();
        assert!(matches!(&otherwise[0].kind, EventKind::OnButtonPress(press) if press.events.len() == 1));

        assert_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let result = serde_json::from_value::<SceneEvent>(json!({ "type": "self-destruct" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_lenient_geometry() {
        let map: GameMap = serde_json::from_value(json!({
            "width": "20",
            "height": 12.6,
            "gridSize": null,
            "scene": "keep-me",
        }))
        .unwrap();
        assert_eq!(map.width, Some(20));
        assert_eq!(map.height, Some(13));
        assert_eq!(map.grid_size, None);
        assert_eq!(map.extra["scene"], "keep-me");

        let player: Player = serde_json::from_value(json!({ "x": "3" })).unwrap();
        assert_eq!((player.kind.as_str(), player.x, player.y), ("player", 3, 0));
    }

    #[test]
    fn test_collision_shapes() {
        let grid: Collisions = serde_json::from_value(json!([["0", "1"], ["1", "0"]])).unwrap();
        assert_eq!(grid.shape(), (2, 2));
        let rows: Collisions = serde_json::from_value(json!(["0,1,1", "1,0,0"])).unwrap();
        assert!(matches!(rows, Collisions::Rows(_)));
        assert_eq!(rows.shape(), (3, 2));
    }

    #[test]
    fn test_scene_keeps_unknown_fields() {
        let raw = json!({
            "id": "s1",
            "name": "Intro",
            "sceneType": "2d-top-down",
            "actors": [],
            "events": [],
            "music": "theme",
        });
        let scene: GameScene = serde_json::from_value(raw.clone()).unwrap();
        assert!(scene.is_top_down());
        assert_eq!(serde_json::to_value(&scene).unwrap(), raw);
    }
}
