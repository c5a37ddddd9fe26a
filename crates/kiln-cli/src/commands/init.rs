use std::path::Path;

use kiln_core::{config::DEFAULT_CACHE_DIR, KilnConfig};

pub const CONFIG_FILE: &str = "kiln.toml";

pub fn init(path: &str, force: bool) -> anyhow::Result<()> {
    let output = Path::new(path).join(CONFIG_FILE);
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let config = KilnConfig::scaffold(DEFAULT_CACHE_DIR);
    std::fs::write(&output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}
