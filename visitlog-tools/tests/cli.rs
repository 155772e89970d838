use std::fs;
use std::path::Path;
use std::process::Command;

const BIN: &str = env!("CARGO_BIN_EXE_visitlog");

fn write_log(path: &Path, lines: usize) {
    let slugs = ["php-81-enums", "a/b", "rust-for-php-devs", "tail"];
    let mut text = String::new();
    for i in 0..lines {
        text.push_str(&format!(
            "https://stitcher.io/blog/{},2024-{:02}-{:02}T01:16:58+00:00\n",
            slugs[i * 7 % slugs.len()],
            i % 12 + 1,
            i % 28 + 1
        ));
    }
    fs::write(path, text).unwrap();
}

fn parse(input: &Path, output: &Path, extra: &[&str]) {
    let status = Command::new(BIN)
        .arg("parse")
        .arg(input)
        .arg(output)
        .args(extra)
        .status()
        .unwrap();
    assert!(status.success());
}

#[test]
fn process_workers_match_threads() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("access.log");
    write_log(&input, 2000);

    let by_threads = dir.path().join("threads.json");
    let by_processes = dir.path().join("processes.json");
    let sequential = dir.path().join("sequential.json");
    let parallel = |mode: &'static str| ["--workers", "4", "--parallel-threshold", "0", "--execution", mode];
    parse(&input, &by_threads, &parallel("threads"));
    parse(&input, &by_processes, &parallel("processes"));
    parse(&input, &sequential, &["--execution", "sequential"]);

    let expected = fs::read_to_string(&by_threads).unwrap();
    assert!(expected.starts_with("{\n    \"\\/blog\\/php-81-enums\": {\n"));
    assert!(expected.contains("\"\\/blog\\/a\\/b\""));
    assert_eq!(fs::read_to_string(&by_processes).unwrap(), expected);
    assert_eq!(fs::read_to_string(&sequential).unwrap(), expected);
}

#[test]
fn config_file_and_path_list() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("access.log");
    write_log(&input, 50);
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"route_prefix": "/posts/", "discovery_window": 100}"#).unwrap();
    let paths = dir.path().join("paths.txt");
    fs::write(&paths, "# all posts\n/posts/a/b\n/posts/tail\n").unwrap();
    let output = dir.path().join("report.json");

    let config = config.to_str().unwrap();
    let paths = paths.to_str().unwrap();
    parse(&input, &output, &["--config", config, "--paths", paths]);

    let report = fs::read_to_string(&output).unwrap();
    assert!(report.contains("\"\\/posts\\/php-81-enums\""));
    assert!(report.contains("\"\\/posts\\/a\\/b\""));
    assert!(report.contains("\"\\/posts\\/tail\""));
    // never discovered and not listed
    assert!(!report.contains("rust-for-php-devs"));
}

#[test]
fn missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let status = Command::new(BIN)
        .arg("parse")
        .arg(dir.path().join("missing.log"))
        .arg(dir.path().join("report.json"))
        .status()
        .unwrap();
    assert!(!status.success());
    assert!(!dir.path().join("report.json").exists());
}

#[test]
fn plan_lists_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("access.log");
    write_log(&input, 100);
    let output = Command::new(BIN)
        .args(&["plan", "--workers", "3", "--parallel-threshold", "0"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let chunks: Vec<_> = stdout.lines().filter(|line| !line.starts_with('#')).collect();
    assert_eq!(chunks.len(), 3);
    assert!(chunks[0].starts_with("0\thost\t0\t"));
    assert!(chunks[2].ends_with(&fs::metadata(&input).unwrap().len().to_string()));
}
