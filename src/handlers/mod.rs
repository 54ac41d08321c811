pub mod status_handlers;
pub mod stk_handlers;
