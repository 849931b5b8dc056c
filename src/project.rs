use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::diff::{self, RestoreStatus};
use crate::errors::{Error, ErrorKind, Result};
use crate::graph::OsmGraph;
use crate::xml;

/// Name of the diff kept around when a project diff is moved aside.
const BACKUP_DIFF: &str = "backup.diff";

/// Project description as stored in its JSON file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Directory with the map data and the diff. Relative to the config
    /// file.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Map data, relative to `path`. Defaults to `<name>.osm`, or
    /// `<name>.osm.gz` if only that exists.
    #[serde(default)]
    pub osm_file: Option<String>,
}

fn default_path() -> PathBuf {
    PathBuf::from(".")
}

/// Graph of an opened project, with the pending edits replayed.
#[derive(Debug)]
pub struct OpenProject {
    pub graph: OsmGraph,
    pub restore_status: RestoreStatus,
}

#[derive(Debug, Clone)]
pub struct Project {
    config: ProjectConfig,
    dir: PathBuf,
}

/// Runs one step of opening a project with uniform logging.
fn stage<T>(project: &str, stage: &str, run: impl FnOnce() -> Result<T>) -> Result<T> {
    info!(project = project, stage = stage; "Starting stage");
    match run() {
        Ok(output) => {
            info!(project = project, stage = stage; "Stage finished");
            Ok(output)
        }
        Err(err) => {
            error!(project = project, stage = stage, err = err.message.as_str(); "Stage failed with error");
            Err(err)
        }
    }
}

impl Project {
    pub fn new(name: &str, dir: &Path) -> Self {
        Project {
            config: ProjectConfig {
                name: name.to_string(),
                path: dir.to_path_buf(),
                osm_file: None,
            },
            dir: dir.to_path_buf(),
        }
    }

    pub fn with_osm_file(mut self, osm_file: &str) -> Self {
        self.config.osm_file = Some(osm_file.to_string());
        self
    }

    /// Reads a project description from a JSON file.
    pub fn load(config_path: &Path) -> Result<Self> {
        let file = File::open(config_path).map_err(|err| {
            Error::new(
                ErrorKind::Config,
                format!("cannot open {}: {}", config_path.display(), err),
            )
        })?;
        let config: ProjectConfig = serde_json::from_reader(file)?;
        if config.name.is_empty() {
            return Err(Error::new(ErrorKind::Config, "project name is empty"));
        }
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let dir = base.join(&config.path);
        info!(project = config.name.as_str(), dir = dir.to_string_lossy().as_ref(); "Loaded project");
        Ok(Project { config, dir })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn osm_path(&self) -> PathBuf {
        if let Some(file) = &self.config.osm_file {
            return self.dir.join(file);
        }
        let plain = self.dir.join(format!("{}.osm", self.config.name));
        let compressed = self.dir.join(format!("{}.osm.gz", self.config.name));
        if !plain.exists() && compressed.exists() {
            compressed
        } else {
            plain
        }
    }

    pub fn diff_path(&self) -> PathBuf {
        self.dir.join(format!("{}.diff", self.config.name))
    }

    pub fn backup_diff_path(&self) -> PathBuf {
        self.dir.join(BACKUP_DIFF)
    }

    pub fn diff_present(&self) -> bool {
        self.diff_path().exists()
    }

    /// Saves the pending edits of `graph`, or removes the diff if there are
    /// none.
    pub fn diff_save(&self, graph: &OsmGraph) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        diff::diff_save(graph, &self.diff_path(), self.name())
    }

    pub fn diff_remove(&self) -> Result<()> {
        let path = self.diff_path();
        if path.exists() {
            info!(path = path.to_string_lossy().as_ref(); "Removing diff");
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Replays the project diff onto `graph`. Without a project diff a
    /// backup diff left in the project directory is used instead.
    pub fn diff_restore(&self, graph: &mut OsmGraph) -> RestoreStatus {
        let status = diff::diff_restore_file(graph, &self.diff_path(), Some(self.name()));
        if status != RestoreStatus::NONE_PRESENT {
            return status;
        }
        let backup = self.backup_diff_path();
        if backup.exists() {
            warn!(path = backup.to_string_lossy().as_ref(); "Restoring from backup diff");
            return diff::diff_restore_file(graph, &backup, Some(self.name()));
        }
        status
    }

    /// Parses the map data, checks that it can be edited and replays the
    /// pending edits.
    pub fn open(&self) -> Result<OpenProject> {
        let name = self.name();
        let osm_path = self.osm_path();

        let graph = stage(name, "parse", || xml::parse_osm_file(&osm_path))?;
        let mut graph = stage(name, "sanity_check", || match graph.sanity_check() {
            Some(message) => Err(Error::new(ErrorKind::Sanity, message)),
            None => Ok(graph),
        })?;
        let restore_status = stage(name, "diff_restore", || Ok(self.diff_restore(&mut graph)))?;

        if restore_status.contains(RestoreStatus::INVALID) {
            warn!(project = name; "Diff could not be restored, continuing without it");
        }
        Ok(OpenProject {
            graph,
            restore_status,
        })
    }
}
