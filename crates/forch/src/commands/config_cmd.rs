//! Config command handlers.

use serde::Serialize;

use crate::cli::{ConfigCommand, GlobalOpts};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct CheckReport {
    faucet_config: String,
    switches: usize,
    stack_links: usize,
    egress_ports: usize,
}

pub fn handle(session: &Session, command: &ConfigCommand, global: &GlobalOpts) -> Result<(), CliError> {
    let out = match command {
        ConfigCommand::Show => {
            let toml = session.settings.to_toml()?;
            output::render(global.output, &session.settings, |_| toml)?
        }
        ConfigCommand::Check => {
            // Session::load has already validated settings and parsed dps.
            let report = CheckReport {
                faucet_config: session.settings.faucet_config.display().to_string(),
                switches: session.dps.dps.len(),
                stack_links: session.dps.stack_links().len(),
                egress_ports: session.dps.egress_ports().len(),
            };
            output::render(global.output, &report, |r| {
                format!(
                    "Configuration OK: {} switches, {} stack links, {} egress ports ({})",
                    r.switches, r.stack_links, r.egress_ports, r.faucet_config
                )
            })?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
