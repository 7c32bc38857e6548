pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use tokio::sync::broadcast;

pub use crate::config::{self, Config};
pub use crate::options::Options;
