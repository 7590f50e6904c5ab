//! Configuration sections
//!
//! One module per `[section]` of the config file.

pub mod load;
pub mod logging;
pub mod neo4j;
pub mod retry;
pub mod sources;

pub use load::*;
pub use logging::*;
pub use neo4j::*;
pub use retry::*;
pub use sources::*;
