mod commands;
mod paths;

pub use commands::HideWindow;
pub use paths::{APP_DIR_NAME, AppPaths, AppPathsError, InstallDir};
