pub mod alert;
pub mod clock;
pub mod config;
pub mod error;
pub mod filing;
pub mod security;

pub use alert::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::*;
pub use filing::*;
pub use security::*;
