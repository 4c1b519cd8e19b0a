mod parsing;
mod secret;
mod settings;
mod types;

#[cfg(feature = "local")]
pub(crate) use types::LocalSettings;
pub(crate) use types::{ModelBackend, Settings};
