use std::fs::OpenOptions;
use std::path::Path;

use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

/// Sysfs class the kernel module registers once it is loaded.
const CM_SYSFS_CLASS: &str = "/sys/class/infiniband_cm";

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    device: String,
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let device = args.device.device.as_path();
    let present = device_present_check(device);
    let accessible = if matches!(present.status, CheckStatus::Pass) {
        device_accessible_check(device)
    } else {
        CheckResult {
            name: "device_accessible".to_string(),
            status: CheckStatus::Skip,
            detail: "device not present".to_string(),
        }
    };

    let checks = vec![
        platform_check(),
        kernel_module_check(Path::new(CM_SYSFS_CLASS)),
        present,
        accessible,
        compiled_features_check(),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let overall = if has_fail { "fail" } else { "pass" };

    let output = DoctorOutput {
        device: device.display().to_string(),
        checks,
        overall,
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("ibucm doctor ({})\n", output.device);
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<22} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

fn platform_check() -> CheckResult {
    #[cfg(target_os = "linux")]
    {
        CheckResult {
            name: "platform".to_string(),
            status: CheckStatus::Pass,
            detail: "linux".to_string(),
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        CheckResult {
            name: "platform".to_string(),
            status: CheckStatus::Warn,
            detail: format!("{} has no kernel connection manager", std::env::consts::OS),
        }
    }
}

fn kernel_module_check(class_dir: &Path) -> CheckResult {
    if class_dir.is_dir() {
        CheckResult {
            name: "kernel_module".to_string(),
            status: CheckStatus::Pass,
            detail: format!("{} present", class_dir.display()),
        }
    } else {
        CheckResult {
            name: "kernel_module".to_string(),
            status: CheckStatus::Warn,
            detail: format!("{} missing (module not loaded?)", class_dir.display()),
        }
    }
}

fn device_present_check(device: &Path) -> CheckResult {
    match std::fs::metadata(device) {
        Ok(_) => CheckResult {
            name: "device_present".to_string(),
            status: CheckStatus::Pass,
            detail: device.display().to_string(),
        },
        Err(err) => CheckResult {
            name: "device_present".to_string(),
            status: CheckStatus::Fail,
            detail: format!("{}: {err}", device.display()),
        },
    }
}

fn device_accessible_check(device: &Path) -> CheckResult {
    match OpenOptions::new().read(true).write(true).open(device) {
        Ok(_) => CheckResult {
            name: "device_accessible".to_string(),
            status: CheckStatus::Pass,
            detail: "opened read-write".to_string(),
        },
        Err(err) => CheckResult {
            name: "device_accessible".to_string(),
            status: CheckStatus::Fail,
            detail: err.to_string(),
        },
    }
}

fn compiled_features_check() -> CheckResult {
    CheckResult {
        name: "compiled_features".to_string(),
        status: CheckStatus::Info,
        detail: format!("async={}, cli=true", cfg!(feature = "async")),
    }
}
