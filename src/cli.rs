use clap::Parser;

/// Extracts the debugging information of a Mach-O executable into a
/// companion dSYM file.
#[derive(Debug, Parser)]
#[command(name = "sd", version)]
pub struct Args {
    /// Input executable, optionally followed by the output path. With
    /// one argument the output lands inside INPUT.dSYM/.
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<String>,

    /// Describe the parsed table of contents on standard error.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
