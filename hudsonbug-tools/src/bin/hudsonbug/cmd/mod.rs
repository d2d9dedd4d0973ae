pub mod debug;
pub mod regs;
pub mod upload;
