use anyhow::Result;

use simpleip_bridge::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();
    let config = Config::new(options.config_file)?;

    simpleip_bridge::run(config).await
}
