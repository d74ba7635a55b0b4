pub mod call;
pub mod cli;
pub mod serve;
