use clap::Parser;

/// Simple IP bridge - a long-lived connection to a Sony Bravia TV
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
