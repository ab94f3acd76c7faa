pub mod assessment;
pub mod error;
pub mod model;
pub mod variant;
