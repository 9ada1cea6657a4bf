use std::process::Command;

fn temp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "datableed-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

#[test]
fn cli_list_scenarios_writes_output() {
    let exe = env!("CARGO_BIN_EXE_datableed-tester");
    let output_path = temp_path("list");
    let status = Command::new(exe)
        .args(["--list-scenarios", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("Available scenarios"));
    assert!(content.contains("chat-fallback"));
}

#[test]
fn cli_runs_smoke_and_chat_with_json_report() {
    let exe = env!("CARGO_BIN_EXE_datableed-tester");
    let output_path = temp_path("run");
    let output = Command::new(exe)
        .args([
            "--mode",
            "both",
            "--scenarios",
            "smoke,chat-trust",
            "--iterations",
            "1",
            "--seeds",
            "1,0x2a",
            "--report",
            "json",
            "--output",
        ])
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Data_Bleed Automated Tester"));

    let report = std::fs::read_to_string(output_path).expect("read report");
    let json_end = report.rfind(']').expect("json array");
    let results: serde_json::Value =
        serde_json::from_str(&report[..=json_end]).expect("valid json");
    // One smoke result per seed plus one chat result.
    assert_eq!(results.as_array().map(Vec::len), Some(3));
}

#[test]
fn cli_rejects_bad_seeds() {
    let exe = env!("CARGO_BIN_EXE_datableed-tester");
    let output = Command::new(exe)
        .args(["--seeds", "not-a-seed"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not-a-seed"));
}
