pub mod base;
pub mod group;
pub mod operation;
pub mod retry;
pub mod state;
pub mod supplier;
pub mod types;


pub use base::*;
pub use group::*;
pub use operation::*;
pub use retry::*;
pub use state::*;
pub use supplier::*;
pub use types::*;
