pub mod constants;
pub mod loader;
pub mod runtime;
pub mod terminal;

pub use self::{loader::load, runtime::Machine, terminal::Console};
