pub mod check;
pub mod cli;
pub mod display;
pub mod run;
