pub mod logging;
pub mod types;
pub mod utils;

pub use logging::*;
pub use types::*;
pub use utils::*;
