//! Integration tests for the FinVault CLI.
//!
//! These tests exercise the binary end-to-end using `assert_cmd`.  The
//! password comes from `FINVAULT_PASSWORD` so no prompt is needed.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

const PASSWORD: &str = "correct horse battery staple";

/// Helper: get a Command pointing at the finvault binary.
fn finvault() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("finvault").expect("binary should exist")
}

/// Helper: a command running inside `dir` with the password set.
fn finvault_in(dir: &TempDir) -> Command {
    let mut cmd = finvault();
    cmd.current_dir(dir.path())
        .env("FINVAULT_PASSWORD", PASSWORD)
        .env_remove("FINVAULT_NEW_PASSWORD")
        .env_remove("FINVAULT_LOG");
    cmd
}

fn init(dir: &TempDir) {
    finvault_in(dir).arg("init").assert().success();
}

/// Run `add` and return the new record id from its output.
fn add(dir: &TempDir, args: &[&str]) -> String {
    let output = finvault_in(dir)
        .arg("add")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    text.split_whitespace()
        .find(|word| word.len() == 36 && word.chars().filter(|c| *c == '-').count() == 4)
        .expect("record id in output")
        .to_string()
}

#[test]
fn help_flag_shows_usage() {
    finvault()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("client-side field encryption"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("edit"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("change-password"));
}

#[test]
fn version_flag_shows_version() {
    finvault()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("finvault"));
}

#[test]
fn no_args_shows_help() {
    finvault()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn list_without_profile_fails() {
    let tmp = TempDir::new().unwrap();
    finvault_in(&tmp)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No profile found"));
}

#[test]
fn init_creates_profile_and_store() {
    let tmp = TempDir::new().unwrap();
    init(&tmp);

    tmp.child(".finvault/default.profile.json")
        .assert(predicate::path::exists());
    tmp.child(".finvault/default.records")
        .assert(predicate::path::exists());

    // A second init refuses to overwrite.
    finvault_in(&tmp)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn init_rejects_short_password() {
    let tmp = TempDir::new().unwrap();
    finvault()
        .current_dir(tmp.path())
        .env("FINVAULT_PASSWORD", "short")
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 8"));
}

#[test]
fn add_list_show_flow() {
    let tmp = TempDir::new().unwrap();
    init(&tmp);

    let id = add(
        &tmp,
        &[
            "account",
            "--secret",
            "accountName=HDFC Savings",
            "--secret",
            "accountNumber=1234567890",
            "--field",
            "balance=5000",
        ],
    );

    finvault_in(&tmp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("HDFC Savings"))
        .stdout(predicate::str::contains("balance=5000"));

    finvault_in(&tmp)
        .args(["show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"accountNumber\": \"1234567890\""))
        .stdout(predicate::str::contains("\"balance\": 5000"));

    // Nothing sensitive is written in the clear.
    let bytes = std::fs::read(tmp.path().join(".finvault/default.records")).unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(!text.contains("1234567890"));
}

#[test]
fn wrong_password_is_reported() {
    let tmp = TempDir::new().unwrap();
    init(&tmp);

    finvault_in(&tmp)
        .env("FINVAULT_PASSWORD", "not the password")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Wrong password"));
}

#[test]
fn edit_merges_sensitive_and_clear_fields() {
    let tmp = TempDir::new().unwrap();
    init(&tmp);
    let id = add(
        &tmp,
        &[
            "transaction",
            "--secret",
            "description=Groceries",
            "--secret",
            "merchant=Big Bazaar",
            "--field",
            "amount=-1250.5",
        ],
    );

    finvault_in(&tmp)
        .args(["edit", &id, "--secret", "tags=food,weekly", "--secret", "merchant="])
        .args(["--field", "amount=-1300"])
        .assert()
        .success();

    finvault_in(&tmp)
        .args(["show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"description\": \"Groceries\""))
        .stdout(predicate::str::contains("weekly"))
        .stdout(predicate::str::contains("Big Bazaar").not())
        .stdout(predicate::str::contains("-1300"));
}

#[test]
fn add_rejects_unknown_sensitive_field() {
    let tmp = TempDir::new().unwrap();
    init(&tmp);

    finvault_in(&tmp)
        .args(["add", "goal", "--secret", "name=House", "--secret", "ifsc=X"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a sensitive goal field"));
}

#[test]
fn delete_with_force_removes_record() {
    let tmp = TempDir::new().unwrap();
    init(&tmp);
    let id = add(&tmp, &["budget", "--secret", "name=Fuel"]);

    finvault_in(&tmp)
        .args(["delete", &id, "--force"])
        .assert()
        .success();

    finvault_in(&tmp)
        .args(["show", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn list_shows_good_records_when_one_blob_is_corrupted() {
    let tmp = TempDir::new().unwrap();
    init(&tmp);
    add(&tmp, &["goal", "--secret", "name=Emergency fund"]);
    let bad = add(&tmp, &["goal", "--secret", "name=New car"]);

    // Flip one base64 character inside the second record's blob.
    let path = tmp.path().join(".finvault/default.records");
    let mut bytes = std::fs::read(&path).unwrap();
    let id_at = bytes
        .windows(bad.len())
        .position(|w| w == bad.as_bytes())
        .unwrap();
    let marker = b"\"blob\":\"";
    let blob_at = id_at
        + bytes[id_at..]
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap();
    let target = blob_at + marker.len() + 20;
    bytes[target] = if bytes[target] == b'A' { b'B' } else { b'A' };
    std::fs::write(&path, &bytes).unwrap();

    finvault_in(&tmp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Emergency fund"))
        .stdout(predicate::str::contains("<unable to decrypt>"))
        .stdout(predicate::str::contains("New car").not())
        .stderr(predicate::str::contains("integrity check"));

    // Writes are refused until the file is restored.
    finvault_in(&tmp)
        .args(["add", "goal", "--secret", "name=Trip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HMAC verification failed"));
}

#[test]
fn change_password_rekeys_store() {
    let tmp = TempDir::new().unwrap();
    init(&tmp);
    let id = add(&tmp, &["goal", "--secret", "name=Emergency fund"]);

    finvault_in(&tmp)
        .env("FINVAULT_NEW_PASSWORD", "a brand new password")
        .arg("change-password")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 records re-encrypted"));

    // Old password no longer works.
    finvault_in(&tmp)
        .args(["show", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Wrong password"));

    finvault_in(&tmp)
        .env("FINVAULT_PASSWORD", "a brand new password")
        .args(["show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Emergency fund"));
}

#[test]
fn users_are_isolated() {
    let tmp = TempDir::new().unwrap();
    init(&tmp);
    finvault_in(&tmp)
        .args(["--user", "ravi", "init"])
        .assert()
        .success();

    add(&tmp, &["account", "--secret", "accountName=Asha's account"]);

    finvault_in(&tmp)
        .args(["--user", "ravi", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Asha's account").not());
}

#[cfg(feature = "audit-log")]
#[test]
fn audit_records_operations_without_values() {
    let tmp = TempDir::new().unwrap();
    init(&tmp);
    add(&tmp, &["account", "--secret", "accountNumber=99887766", "--secret", "accountName=X"]);

    finvault_in(&tmp)
        .arg("audit")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("99887766").not());
}

#[test]
fn config_file_sets_default_user_and_data_dir() {
    let tmp = TempDir::new().unwrap();
    tmp.child(".finvault.toml")
        .write_str("default_user = \"asha\"\ndata_dir = \"money\"\n")
        .unwrap();

    init(&tmp);

    tmp.child("money/asha.profile.json")
        .assert(predicate::path::exists());
}
