use std::path::PathBuf;

/// Server configuration, normally filled in from the command line.
#[derive(Clone, Debug)]
pub struct Config {
    /// TCP port the accept loop binds to.
    pub port: u16,
    /// Root directory of the on-disk artifact store.
    pub root: PathBuf,
    /// Memory-tier capacity as an entry count; 0 disables the tier.
    pub capacity: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: 9966,
            root: PathBuf::from("cache"),
            capacity: 0,
        }
    }
}
