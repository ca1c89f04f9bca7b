mod logging;

use std::error::Error;

use dbchat_core::config::FileConfigStore;
use tracing::info;

fn run_app(
    store: FileConfigStore,
    run_tui: impl FnOnce(FileConfigStore) -> Result<(), dbchat_tui::TuiError>,
) -> Result<(), Box<dyn Error>> {
    info!(config = %store.path().display(), "starting");
    run_tui(store)?;
    info!("exiting");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let store = FileConfigStore::load_default()?;
    let _log_guard = logging::init_file_logging(&store.log_dir())?;
    run_app(store, dbchat_tui::run)
}
