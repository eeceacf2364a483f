pub mod accounts;
pub mod call;
pub mod tail;
