//! Loading configuration files from disk and starting an instance from them.

use assert_fs::prelude::*;

use textmill::config::{load_config, LogFormat};
use textmill::error::ConfigError;
use textmill::job::JobStatus;
use textmill::worker::RetryPolicy;
use textmill::Textmill;

#[test]
fn test_load_and_start_from_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let storage = temp.child("storage");
    let database = temp.child("db/textmill.db");
    let config_file = temp.child("textmill.json");
    config_file
        .write_str(&format!(
            r#"{{
                "version": "1.0",
                "storage_root": {:?},
                "database_path": {:?},
                "worker_count": 2,
                "retry": {{ "max_retries": 1, "initial_delay_secs": 5 }},
                "logging": {{ "level": "warn", "format": "compact" }}
            }}"#,
            storage.path().to_str().unwrap(),
            database.path().to_str().unwrap()
        ))
        .unwrap();

    let config = load_config(config_file.path()).unwrap();
    assert_eq!(config.worker_count, 2);
    assert_eq!(config.logging.format, LogFormat::Compact);

    let policy = RetryPolicy::from_config(&config.retry);
    assert_eq!(policy.max_retries, 1);
    assert_eq!(policy.delay_for(1).as_secs(), 5);

    let app = Textmill::new(&config).unwrap();
    let job_id = app.upload("hello.txt", b"Hello World\n").unwrap();
    assert!(app.process_now(&job_id).is_done());

    assert!(database.path().exists());
    storage.child("uploads/hello.txt").assert("Hello World\n");
    assert_eq!(app.count_by_status(JobStatus::Done).unwrap(), 1);
}

#[test]
fn test_jobs_survive_restart() {
    let temp = assert_fs::TempDir::new().unwrap();
    let mut config = textmill::Config::default_for(temp.child("storage").path());
    config.database_path = Some(temp.child("textmill.db").path().to_path_buf());

    let job_id = {
        let app = Textmill::new(&config).unwrap();
        app.upload("keep.csv", b"a,b\n").unwrap()
    };

    let app = Textmill::new(&config).unwrap();
    let job = app.get_job(&job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.original_location, "uploads/keep.csv");
}

#[test]
fn test_invalid_file_reports_schema_errors() {
    let temp = assert_fs::TempDir::new().unwrap();
    let config_file = temp.child("bad.json");
    config_file
        .write_str(r#"{ "version": "1.0", "worker_count": "many" }"#)
        .unwrap();

    match load_config(config_file.path()) {
        Err(ConfigError::SchemaValidation { errors }) => {
            assert!(errors.contains("storage_root"), "got {}", errors);
        }
        other => panic!("Expected SchemaValidation, got {:?}", other),
    }
}
