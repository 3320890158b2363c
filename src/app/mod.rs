//! Application runtime composition modules.

pub(crate) mod exit_handler;
pub(crate) mod logging;
pub(crate) mod progress;
pub(crate) mod summary;
