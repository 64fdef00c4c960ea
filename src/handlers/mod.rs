pub use dispatch::{dispatch, RESTRICTED_ALLOWED};

mod dispatch;
mod packets;
mod scrim;
