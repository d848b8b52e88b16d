use clap::Parser;

/// Debug adapter bridging a DAP frontend to the ruby "Fast Debugger".
#[derive(Debug, Parser, Default)]
pub struct Args {
    /// Port the debugger's debug socket listens on
    #[clap(short, long)]
    pub port: Option<u16>,

    /// Debugger executable used to run the program
    #[clap(short, long)]
    pub debugger: Option<String>,
}
