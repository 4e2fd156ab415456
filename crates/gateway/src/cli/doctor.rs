use forge_domain::config::{Config, ConfigSeverity};

/// Run all diagnostic checks and print a summary.
///
/// Returns `true` when every check passes, `false` when at least one
/// check failed.
pub fn run(config: &Config, config_path: &str) -> bool {
    println!("forge doctor");
    println!("============\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_llm_providers(config, &mut all_passed);
    check_worker_pool(config, &mut all_passed);
    check_workspace(config, &mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    all_passed
}

// ── Individual checks ─────────────────────────────────────────────────

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists { config_path.to_owned() } else { format!("{config_path} not found (using defaults)") },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

fn check_llm_providers(config: &Config, all_passed: &mut bool) {
    let count = config.llm.providers.len();
    let ok = count > 0;

    print_check(
        "LLM providers configured",
        ok,
        if ok { format!("{count} provider(s)") } else { "none configured".into() },
    );

    if !ok {
        *all_passed = false;
    }
}

fn check_worker_pool(config: &Config, all_passed: &mut bool) {
    let size = config.worker_pool.target_size;
    let ok = size > 0;

    print_check(
        "Worker pool target size",
        ok,
        if ok { format!("{size} worker(s)") } else { "target_size is 0".into() },
    );

    if !ok {
        *all_passed = false;
    }
}

fn check_workspace(config: &Config, all_passed: &mut bool) {
    let path = &config.workspace.path;
    let exists = path.exists();
    let writable = if exists {
        let probe = path.join(".forge_doctor_probe");
        let w = std::fs::write(&probe, b"probe").is_ok();
        let _ = std::fs::remove_file(&probe);
        w
    } else {
        false
    };

    let ok = exists && writable;
    let detail = match (exists, writable) {
        (true, true) => format!("{} (writable)", path.display()),
        (true, false) => format!("{} (not writable)", path.display()),
        _ => format!("{} (does not exist)", path.display()),
    };

    print_check("Workspace directory", ok, detail);

    if !ok {
        *all_passed = false;
    }
}

// ── Formatting helper ─────────────────────────────────────────────────

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
