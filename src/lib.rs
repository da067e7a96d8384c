pub mod cli;
pub mod driver;
pub mod dsym;
pub mod macho;

pub use driver::run;
