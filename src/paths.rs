//! Where a project's build happens and where its output lands.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{IoContext, Result};
use crate::template::slugify;

/// Scratch directory name, inside the project tree. The toolchain does not
/// build reliably from a directory outside it.
pub const WORK_DIR: &str = ".neobuild";
pub const GENERATED_DIR: &str = "build";
pub const OUTPUT_DIR: &str = "out";
pub const ROM_EXTENSION: &str = "gba";
const FALLBACK_TARGET: &str = "game";

pub const RESOURCES_ENV: &str = "NEOBUILD_RESOURCES";
const RESOURCES_DIR: &str = "resources";

/// Every path a build of one project touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    pub project_file: PathBuf,
    pub project_dir: PathBuf,
    pub work_dir: PathBuf,
    /// Generated headers.
    pub build_dir: PathBuf,
    /// Toolchain target name, also the artifact's stem.
    pub target: String,
    /// Where the toolchain leaves the ROM.
    pub artifact: PathBuf,
    /// Where the finished ROM is copied.
    pub rom: PathBuf,
}

impl BuildPaths {
    /// Relative project files are resolved against the current directory,
    /// so every derived path is absolute.
    pub fn new(project_file: &Path) -> Self {
        let project_file = normalize(&absolute(project_file));
        let project_dir = project_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let work_dir = project_dir.join(WORK_DIR);
        let target = target_name(&project_file);

        Self {
            build_dir: work_dir.join(GENERATED_DIR),
            artifact: work_dir.join(format!("{target}.{ROM_EXTENSION}")),
            rom: project_dir.join(rom_path(&project_file)),
            project_file,
            project_dir,
            work_dir,
            target,
        }
    }

    /// `path` as seen from the working directory, where the toolchain runs.
    /// Relative paths are taken relative to the project directory.
    pub fn from_work_dir(&self, path: &Path) -> PathBuf {
        relative_to(&self.project_dir.join(path), &self.work_dir)
    }
}

/// The ROM location relative to the project directory, named after the
/// make target.
pub fn rom_path(project_file: &Path) -> PathBuf {
    Path::new(OUTPUT_DIR).join(format!("{}.{ROM_EXTENSION}", target_name(project_file)))
}

fn target_name(project_file: &Path) -> String {
    Some(slugify(&file_stem(project_file)))
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| FALLBACK_TARGET.to_string())
}

/// Falls back to the path as given when the current directory is unknown.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Removes the project's working directory. Returns whether there was one.
pub async fn clean_build_dir(project_file: &Path) -> Result<bool> {
    let work_dir = BuildPaths::new(project_file).work_dir;
    match tokio::fs::remove_dir_all(&work_dir).await {
        Ok(()) => {
            debug!(path = %work_dir.display(), "removed working directory");
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err::<bool, _>(err).with_path("remove", &work_dir),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Resolves `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let after_name = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if !(after_name && out.pop()) && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Lexical path from `base` to `path`. Paths without a common root are
/// returned unchanged.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path = normalize(path);
    let base = normalize(base);

    let mut path_parts = path.components().peekable();
    let mut base_parts = base.components().peekable();
    let mut shared = 0;
    while let (Some(a), Some(b)) = (path_parts.peek(), base_parts.peek()) {
        if a != b {
            break;
        }
        path_parts.next();
        base_parts.next();
        shared += 1;
    }
    if shared == 0 && (path.has_root() || base.has_root()) {
        return path;
    }

    let mut out: PathBuf = base_parts.map(|_| Component::ParentDir).collect();
    out.extend(path_parts);
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Bundled read-only resources: the template set and default graphics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resources {
    root: PathBuf,
}

impl Resources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// An explicit root wins, then `NEOBUILD_RESOURCES`, then `resources/`
    /// next to the executable, then the source tree.
    pub fn locate(explicit: Option<&Path>) -> Self {
        if let Some(root) = explicit {
            return Self::new(root);
        }

        let mut candidates = Vec::new();
        if let Some(root) = std::env::var_os(RESOURCES_ENV) {
            candidates.push(PathBuf::from(root));
        }
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(exe_dir.join(RESOURCES_DIR));
        }
        let development = Path::new(env!("CARGO_MANIFEST_DIR")).join(RESOURCES_DIR);

        let root = candidates
            .into_iter()
            .find(|dir| dir.is_dir())
            .unwrap_or(development);
        debug!(path = %root.display(), "using resources");
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn commons_dir(&self) -> PathBuf {
        self.root.join("templates").join("commons")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.commons_dir().join("templates")
    }

    pub fn partials_dir(&self) -> PathBuf {
        self.templates_dir().join("partials")
    }

    pub fn makefile_template(&self) -> PathBuf {
        self.templates_dir().join("Makefile.tpl")
    }

    pub fn default_background(&self) -> PathBuf {
        self.commons_dir().join("graphics").join("bg_default.bmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_paths() {
        let paths = BuildPaths::new(Path::new("/games/demo/./My Game.json"));
        assert_eq!(paths.project_dir, Path::new("/games/demo"));
        assert_eq!(paths.work_dir, Path::new("/games/demo/.neobuild"));
        assert_eq!(paths.build_dir, Path::new("/games/demo/.neobuild/build"));
        assert_eq!(paths.target, "my_game");
        assert_eq!(paths.artifact, Path::new("/games/demo/.neobuild/my_game.gba"));
        assert_eq!(paths.rom, Path::new("/games/demo/out/my_game.gba"));

        assert_eq!(BuildPaths::new(Path::new("/games/!!!.json")).target, "game");
    }

    #[test]
    fn test_rom_path() {
        assert_eq!(rom_path(Path::new("/x/y/hero.json")), Path::new("out/hero.gba"));
        assert_eq!(rom_path(Path::new("/x/y/Hero Quest.json")), Path::new("out/hero_quest.gba"));
        assert_eq!(rom_path(Path::new("/x/y/???.json")), Path::new("out/game.gba"));
    }

    #[test]
    fn test_relative_project_file() {
        let cwd = std::env::current_dir().unwrap();
        let paths = BuildPaths::new(Path::new("demo.json"));
        assert!(paths.project_dir.is_absolute());
        assert_eq!(paths.project_dir, normalize(&cwd));
        assert_eq!(paths.project_file, normalize(&cwd.join("demo.json")));
        assert_eq!(paths.work_dir, normalize(&cwd).join(".neobuild"));
    }

    #[test]
    fn test_relative_to() {
        let base = Path::new("/games/demo/.neobuild");
        assert_eq!(relative_to(Path::new("/games/demo/src"), base), Path::new("../src"));
        assert_eq!(relative_to(Path::new("/opt/butano"), base), Path::new("../../../opt/butano"));
        assert_eq!(relative_to(base, base), Path::new("."));
        assert_eq!(
            relative_to(Path::new("/games/demo/.neobuild/build"), base),
            Path::new("build")
        );

        let paths = BuildPaths::new(Path::new("/games/demo/game.json"));
        assert_eq!(paths.from_work_dir(Path::new("include")), Path::new("../include"));
        assert_eq!(paths.from_work_dir(Path::new("../lib")), Path::new("../../lib"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("a/./b/../c")), Path::new("a/c"));
        assert_eq!(normalize(Path::new("../a")), Path::new("../a"));
        assert_eq!(normalize(Path::new("/..")), Path::new("/"));
    }

    #[tokio::test]
    async fn test_clean_build_dir() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("game.json");
        assert!(!clean_build_dir(&project).await.unwrap());

        std::fs::create_dir_all(dir.path().join(".neobuild/build")).unwrap();
        std::fs::write(dir.path().join(".neobuild/build/x.h"), "").unwrap();
        assert!(clean_build_dir(&project).await.unwrap());
        assert!(!dir.path().join(".neobuild").exists());
    }

    #[test]
    fn test_resources_layout() {
        let resources = Resources::locate(Some(Path::new("/opt/neobuild")));
        assert_eq!(
            resources.makefile_template(),
            Path::new("/opt/neobuild/templates/commons/templates/Makefile.tpl")
        );
        assert_eq!(
            resources.default_background(),
            Path::new("/opt/neobuild/templates/commons/graphics/bg_default.bmp")
        );
    }
}
