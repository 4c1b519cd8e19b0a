pub(crate) mod feedback;
pub(crate) mod grading;
pub(crate) mod identity;
pub(crate) mod model;
pub(crate) mod prompt;
pub(crate) mod records;
pub(crate) mod registry;
pub(crate) mod session;
pub(crate) mod store;
