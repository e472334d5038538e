pub mod ids;
pub mod symbol;
pub mod tick;
