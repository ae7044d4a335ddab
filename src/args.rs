pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandLineArgs {
    #[clap(
        short = 'e',
        long = "env-file",
        help = "file of KEY=VALUE pairs loaded into the Home namespace"
    )]
    env_file: Option<String>,
    #[clap(long, help = "directory profiles are stored in")]
    state_dir: Option<PathBuf>,
    #[clap(long, help = "ignore proxy settings from the environment")]
    no_proxy: bool,
    #[clap(
        short = 'v',
        long,
        help = "Print verbose message",
        default_value = "false"
    )]
    verbose: bool,
}

impl CommandLineArgs {
    pub fn get() -> Self {
        CommandLineArgs::parse()
    }

    pub fn env_file(&self) -> Option<&str> {
        self.env_file.as_deref()
    }

    pub fn state_dir(&self) -> Option<&PathBuf> {
        self.state_dir.as_ref()
    }

    pub fn no_proxy(&self) -> bool {
        self.no_proxy
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}
