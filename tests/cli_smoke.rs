//! Smoke tests driving the `zindex` binary end to end.

mod util;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

use util::{numbered_fixture, numbered_line};

/// Binary under test, run from `dir` so no stray config is picked up.
fn zindex(dir: &std::path::Path) -> Command
{
    let mut cmd = Command::cargo_bin("zindex").expect("zindex binary");
    cmd.current_dir(dir)
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn build_then_query_by_key()
{
    let (tmp, file) = numbered_fixture(5000);

    zindex(tmp.path())
        .args(["build", "--numeric", "--unique", "-r", "^Line ([0-9]+)"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("5000 lines"));
    tmp.child("numbered.gz.zindex")
        .assert(predicate::path::exists());

    zindex(tmp.path())
        .args(["query", "numbered.gz", "4321", "17"])
        .assert()
        .success()
        .stdout(format!("{}\n{}\n", numbered_line(17), numbered_line(4321)));
}

#[test]
fn line_mode_with_context_and_numbers()
{
    let (tmp, file) = numbered_fixture(100);
    zindex(tmp.path())
        .args(["--quiet", "build"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let expected = [
        format!("9-{}", numbered_line(9)),
        format!("10:{}", numbered_line(10)),
        format!("11-{}", numbered_line(11)),
        "--".to_string(),
        format!("19-{}", numbered_line(19)),
        format!("20:{}", numbered_line(20)),
        format!("21-{}", numbered_line(21)),
    ]
    .join("\n")
        + "\n";
    zindex(tmp.path())
        .args(["query", "numbered.gz", "-L", "-n", "-C", "1", "10", "20"])
        .assert()
        .success()
        .stdout(expected);

    // Context past the last line stops quietly.
    zindex(tmp.path())
        .args(["query", "numbered.gz", "-L", "-A", "3", "100"])
        .assert()
        .success()
        .stdout(format!("{}\n", numbered_line(100)));
}

#[test]
fn field_index_from_json_definition()
{
    let (tmp, file) = numbered_fixture(600);
    tmp.child("indexes.json")
        .write_str(
            r#"{ "indexes": [
                { "name": "hex", "type": "field", "delimiter": " ", "fieldNum": 5 },
                { "name": "mods", "type": "regex", "regex": "Mod ([0-9]+)", "numeric": true }
            ] }"#,
        )
        .unwrap();

    zindex(tmp.path())
        .args(["-q", "build", "-c", "indexes.json"])
        .arg(&file)
        .assert()
        .success();

    zindex(tmp.path())
        .args(["query", "numbered.gz", "-i", "hex", "1ff"])
        .assert()
        .success()
        .stdout(format!("{}\n", numbered_line(511)));
    zindex(tmp.path())
        .args(["query", "numbered.gz", "-i", "mods", "3"])
        .assert()
        .success()
        .stdout(format!("{}\n{}\n{}\n", numbered_line(3), numbered_line(259), numbered_line(515)));
}

#[test]
fn raw_sql_query()
{
    let (tmp, file) = numbered_fixture(300);
    zindex(tmp.path())
        .args(["-q", "build", "--numeric", "-r", "^Line ([0-9]+)"])
        .arg(&file)
        .assert()
        .success();

    zindex(tmp.path())
        .args(["query", "numbered.gz", "--raw", "SELECT line FROM index_default", "WHERE key >= 299"])
        .assert()
        .success()
        .stdout(format!("{}\n{}\n", numbered_line(299), numbered_line(300)));
}

#[test]
fn info_lists_indexes()
{
    let (tmp, file) = numbered_fixture(200);
    zindex(tmp.path())
        .args(["-q", "build", "-n", "numbers", "--numeric", "-r", "^Line ([0-9]+)"])
        .arg(&file)
        .assert()
        .success();

    zindex(tmp.path())
        .args(["--no-color", "info", "--access-points", "numbered.gz"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("200 lines")
                .and(predicate::str::contains("numbers"))
                .and(predicate::str::contains("compressedSize")),
        );
}

#[test]
fn query_without_index_fails()
{
    let (tmp, _file) = numbered_fixture(10);
    zindex(tmp.path())
        .args(["query", "numbered.gz", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load index"));
}

#[test]
fn conflicting_tokenizers_are_rejected()
{
    let (tmp, file) = numbered_fixture(10);
    zindex(tmp.path())
        .args(["build", "-r", "x", "-f", "2"])
        .arg(&file)
        .assert()
        .failure();
}

#[test]
fn init_writes_config()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    zindex(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config file"));
    tmp.child("zindex.toml")
        .assert(predicate::str::contains("index_every"));

    // A second init refuses to overwrite.
    zindex(tmp.path())
        .arg("init")
        .assert()
        .failure();
}

#[test]
fn completions_to_stdout()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    zindex(tmp.path())
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("zindex"));
}
