use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ibucm_cm::{CmConfig, CmError, CmId, ConnectionManager, EventKind};
use tracing::{debug, info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{cm_error, CliError, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = CmConfig {
        device: args.device.config(),
        ..CmConfig::default()
    };
    let manager = ConnectionManager::open(&config).map_err(|err| cm_error("open failed", err))?;

    let listener = manager
        .create_id(0)
        .map_err(|err| cm_error("create failed", err))?;
    if let Err(err) = manager.listen(&listener, args.service_id, args.mask) {
        destroy(&manager, listener);
        return Err(cm_error("listen failed", err));
    }
    info!(
        handle = listener.handle(),
        service_id = format_args!("{:#x}", args.service_id),
        mask = format_args!("{:#x}", args.mask),
        "listening"
    );

    let running = Arc::new(AtomicBool::new(true));
    let mut children = Vec::new();
    let result = install_ctrlc_handler(running.clone())
        .and_then(|()| event_loop(&manager, &args, format, &running, &mut children));

    for child in children {
        destroy(&manager, child);
    }
    destroy(&manager, listener);
    result
}

fn event_loop(
    manager: &ConnectionManager,
    args: &ListenArgs,
    format: OutputFormat,
    running: &AtomicBool,
    children: &mut Vec<CmId>,
) -> CliResult<i32> {
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let event = match manager.get_event_timed(args.poll) {
            Ok(event) => event,
            Err(CmError::Timeout(_)) => continue,
            Err(err) => return Err(cm_error("event fetch failed", err)),
        };

        print_event(&event, format);
        printed = printed.saturating_add(1);

        if event.kind().creates_id() {
            let child = event.id().clone();
            if let (Some(reason), EventKind::ReqReceived) = (args.reject, event.kind()) {
                match manager.send_rej(&child, reason, &[], &[]) {
                    Ok(()) => debug!(handle = child.handle(), reason, "rejected request"),
                    Err(err) => warn!(handle = child.handle(), error = %err, "reject failed"),
                }
            }
            children.push(child);
        }
        manager.release_event(event);

        if let Some(count) = args.count {
            if printed >= count {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

fn destroy(manager: &ConnectionManager, id: CmId) {
    let handle = id.handle();
    if let Err(err) = manager.destroy_id(id) {
        warn!(handle, error = %err.source, "destroy failed");
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
