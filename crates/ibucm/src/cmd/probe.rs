use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ibucm_cm::{CmConfig, ConnectionManager, IdAttributes};
use serde::Serialize;
use tracing::debug;

use crate::cmd::ProbeArgs;
use crate::exit::{cm_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Debug, Serialize)]
struct ProbeOutput {
    device: String,
    handle: u32,
    service_id: String,
    service_mask: String,
    local_id: u32,
    remote_id: u32,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = CmConfig {
        device: args.device.config(),
        ..CmConfig::default()
    };
    let manager = ConnectionManager::open(&config).map_err(|err| cm_error("open failed", err))?;

    let id = manager
        .create_id(0)
        .map_err(|err| cm_error("create failed", err))?;
    let handle = id.handle();
    debug!(handle, "created probe handle");

    let attr = manager.attr_id(&id);
    manager
        .destroy_id(id)
        .map_err(|err| cm_error("destroy failed", err.source))?;
    let attr = attr.map_err(|err| cm_error("attribute query failed", err))?;

    let output = probe_output(&args.device.device.display().to_string(), handle, &attr);
    print_probe(&output, format);
    Ok(SUCCESS)
}

fn probe_output(device: &str, handle: u32, attr: &IdAttributes) -> ProbeOutput {
    ProbeOutput {
        device: device.to_string(),
        handle,
        service_id: format!("{:#x}", attr.service_id),
        service_mask: format!("{:#x}", attr.service_mask),
        local_id: attr.local_id,
        remote_id: attr.remote_id,
    }
}

fn print_probe(output: &ProbeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            table.add_row(vec!["device".to_string(), output.device.clone()]);
            table.add_row(vec!["handle".to_string(), output.handle.to_string()]);
            table.add_row(vec!["service_id".to_string(), output.service_id.clone()]);
            table.add_row(vec!["service_mask".to_string(), output.service_mask.clone()]);
            table.add_row(vec!["local_id".to_string(), output.local_id.to_string()]);
            table.add_row(vec!["remote_id".to_string(), output.remote_id.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "device={} handle={} service_id={} mask={} local_id={} remote_id={}",
                output.device,
                output.handle,
                output.service_id,
                output.service_mask,
                output.local_id,
                output.remote_id
            );
        }
    }
}
