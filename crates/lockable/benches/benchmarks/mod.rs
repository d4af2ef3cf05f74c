pub mod allocation;
pub mod resolve;
