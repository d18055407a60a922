//! Integration tests for the `example run` command.
use elci::cli::RunOpts;
use elci::cli::example::handle_example_run_command;
use elci::settings::Settings;
use tempfile::tempdir;

/// An integration test for the `example run` command.
#[test]
fn test_handle_example_run_command() {
    unsafe { std::env::set_var("ELCI_LOG_LEVEL", "off") };

    let tempdir = tempdir().unwrap();
    let opts = RunOpts {
        output_dir: Some(tempdir.path().to_path_buf()),
        ..RunOpts::default()
    };
    handle_example_run_command("simple", &opts, Some(Settings::default())).unwrap();
    assert!(tempdir.path().join("simple.zip").is_file());

    assert!(handle_example_run_command("missing", &opts, Some(Settings::default())).is_err());
}
