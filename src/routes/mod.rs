pub mod payments;
pub mod stk;
