mod helpers;
mod history;
mod meals;
mod pick;
mod transfer;

pub(crate) use history::cmd_history;
pub(crate) use meals::{cmd_add, cmd_list, cmd_remove};
pub(crate) use pick::{cmd_eat, cmd_pick};
pub(crate) use transfer::{cmd_export, cmd_import};
