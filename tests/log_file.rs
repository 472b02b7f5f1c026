#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use sitecatalog::{logging, Category};

mod util;

fn log_contents(dir: &Path) -> String {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with(logging::LOG_FILE_NAME)
        })
        .filter_map(|entry| fs::read_to_string(entry.path()).ok())
        .collect()
}

#[test]
fn mutations_reach_the_rolling_file() {
    std::env::set_var(logging::LOG_ENV, "sitecatalog=info");
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    logging::init_with_dir(&logs).unwrap();
    logging::init_with_dir(&logs).unwrap();
    assert!(logs.is_dir());

    let service = util::electronics_service();
    service
        .insert_category(Category::new(0, 0, "Garden"))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut contents = log_contents(&logs);
    while !contents.contains("category_inserted") && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
        contents = log_contents(&logs);
    }

    let line = contents
        .lines()
        .find(|line| line.contains("category_inserted"))
        .expect("category_inserted logged to file");
    let entry: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(entry["target"], "sitecatalog");
    assert_eq!(entry["fields"]["category_id"], 5);
}
