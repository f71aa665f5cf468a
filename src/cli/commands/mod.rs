mod attempts;
mod users;

pub use attempts::{cmd_reset_attempts, cmd_sweep};
pub use users::cmd_list_users;
