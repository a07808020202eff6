use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ibucm_cm::{Event, EventParams};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput {
    kind: String,
    handle: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    listen_handle: Option<u32>,
    detail: String,
    private_data_size: usize,
    private_data: String,
    info_size: usize,
    timestamp: String,
}

pub fn print_event(event: &Event, format: OutputFormat) {
    let private_data = event.private_data().unwrap_or_default();
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                kind: event.kind().to_string(),
                handle: event.id().handle(),
                listen_handle: event.listen_id().map(|id| id.handle()),
                detail: event_detail(event),
                private_data_size: private_data.len(),
                private_data: hex_preview(private_data),
                info_size: event.info().map_or(0, <[u8]>::len),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "HANDLE", "LISTENER", "DETAIL", "DATA"])
                .add_row(vec![
                    event.kind().to_string(),
                    event.id().handle().to_string(),
                    event
                        .listen_id()
                        .map_or_else(|| "-".to_string(), |id| id.handle().to_string()),
                    event_detail(event),
                    format!("{} bytes", private_data.len()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "event={} handle={} detail={} data={}",
                event.kind(),
                event.id().handle(),
                event_detail(event),
                hex_preview(private_data)
            );
        }
        OutputFormat::Raw => {
            print_raw(private_data);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// One-line summary of the kind-specific parameters.
pub fn event_detail(event: &Event) -> String {
    match event.params() {
        EventParams::ReqReceived {
            params,
            primary_path,
            alternate_path,
            ..
        } => format!(
            "remote_qpn={:#x} psn={} pkey={:#06x} alternate={}",
            params.remote_qpn,
            params.starting_psn,
            primary_path.pkey,
            alternate_path.is_some()
        ),
        EventParams::RepReceived(params) => format!(
            "remote_qpn={:#x} psn={} srq={}",
            params.remote_qpn, params.starting_psn, params.srq
        ),
        EventParams::MraReceived { service_timeout } => {
            format!("service_timeout={service_timeout}")
        }
        EventParams::RejReceived { reason, ari } => {
            format!("reason={reason} ari={}", ari.as_deref().map_or(0, <[u8]>::len))
        }
        EventParams::LapReceived { alternate_path } => {
            format!("alternate_pkey={:#06x}", alternate_path.pkey)
        }
        EventParams::AprReceived { status, .. } => format!("status={status}"),
        EventParams::SidrReqReceived { pkey, .. } => format!("pkey={pkey:#06x}"),
        EventParams::SidrRepReceived { params, .. } => format!(
            "status={} qpn={:#x} qkey={:#x}",
            params.status, params.qpn, params.qkey
        ),
        EventParams::SendStatus(status) => format!("status={status}"),
    }
}

pub fn hex_preview(data: &[u8]) -> String {
    const LIMIT: usize = 32;
    let mut out: String = data
        .iter()
        .take(LIMIT)
        .map(|b| format!("{b:02x}"))
        .collect();
    if data.len() > LIMIT {
        out.push_str("..");
    }
    out
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
