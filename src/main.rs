use std::env;
use std::io;
use std::path::Path;

use log::{info, warn};
use structured_logger::json::new_writer;
use structured_logger::Builder;

use osmedit::errors::{Error, ErrorKind, Result};
use osmedit::Project;

fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn main() -> Result<()> {
    setup_logging();

    let config_path = env::args().nth(1).ok_or_else(|| {
        Error::new(ErrorKind::Config, "usage: osmedit <project.json>")
    })?;
    let project = Project::load(Path::new(&config_path))?;
    let opened = project.open()?;

    let summary = opened.graph.dirty_summary();
    info!(
        project = project.name(),
        restore_status = opened.restore_status.to_string().as_str(),
        nodes = opened.graph.nodes().len(),
        ways = opened.graph.ways().len(),
        relations = opened.graph.relations().len(),
        hidden = opened.graph.hidden_ways().len();
        "Project opened"
    );
    if summary.is_empty() {
        info!(project = project.name(); "No pending changes");
    } else {
        warn!(project = project.name(), changes = summary.to_string().as_str(); "Pending changes");
        // writes the diff back so ignored entries are dropped from it
        project.diff_save(&opened.graph)?;
    }
    Ok(())
}
