pub mod analysis;
pub mod request;
pub mod search;
pub mod state;

pub use analysis::*;
pub use request::*;
pub use search::*;
pub use state::*;
