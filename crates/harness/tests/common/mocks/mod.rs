
/// Scripted hardware model.
pub mod model;
