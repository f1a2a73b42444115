//! `tether info`: platform details and the effective configuration

use crate::output::StyledOutput;
use std::path::Path;
use tether_core::{Runtime, RuntimeConfig, Timeout};

pub fn execute(
    config: &RuntimeConfig,
    config_path: Option<&Path>,
    out: &mut StyledOutput,
) -> anyhow::Result<()> {
    out.heading(&format!("Tether v{}", env!("CARGO_PKG_VERSION")));
    out.field(
        "platform",
        format!("{} ({})", std::env::consts::OS, std::env::consts::ARCH),
    );
    out.field("cpus", num_cpus::get());
    out.field(
        "config",
        config_path.map_or("(defaults)".to_string(), |p| p.display().to_string()),
    );
    out.field(
        "TETHER_LOG",
        std::env::var("TETHER_LOG").unwrap_or_else(|_| "(default)".to_string()),
    );

    // Start and stop a runtime so a broken configuration shows up here
    let runtime = Runtime::new(config.clone())?;
    let stats = runtime.registry().stats();
    out.field("registry strategy", format!("{:?}", runtime.registry().strategy()));
    out.field("live handles", stats.live);
    out.field("handle capacity", stats.capacity);
    runtime.shutdown(Timeout::Forever)?;

    out.newline();
    out.heading("Effective configuration");
    out.flush();
    print!("{}", config.to_toml()?);
    Ok(())
}
