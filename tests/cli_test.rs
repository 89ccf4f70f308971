//! Integration tests for the CLI binary.
// The cargo_bin function is marked deprecated in favor of cargo_bin! macro,
// but both work correctly. Suppressing until assert_cmd stabilizes the new API.
#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_recipe(temp: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = temp.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const HELLO_RECIPE: &str = r#"
name: hello
steps:
  - name: configure
    capability: core.set
    args:
      mode: loud
  - name: greet
    capability: core.echo
    depends_on: [configure]
    args:
      message: "mode is ${mode}"
"#;

const CYCLIC_RECIPE: &str = r#"
name: tangled
steps:
  - name: a
    capability: core.echo
    depends_on: [b]
    args: {message: a}
  - name: b
    capability: core.echo
    depends_on: [a]
    args: {message: b}
"#;

const FAILING_RECIPE: &str = r#"
name: doomed
steps:
  - name: explode
    capability: core.fail
    args: {message: kaboom}
"#;

#[test]
fn cli_shows_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Recipe orchestration engine"));
    Ok(())
}

#[test]
fn cli_shows_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn run_executes_a_recipe_to_completion() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(&temp, "hello.yml", HELLO_RECIPE);

    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.args(["run", recipe.to_str().unwrap()]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("hello"))
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("greet"));
    Ok(())
}

#[test]
fn run_fails_with_nonzero_exit_on_step_failure() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(&temp, "doomed.yml", FAILING_RECIPE);

    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.args(["run", recipe.to_str().unwrap()]);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("failed"))
        .stdout(predicate::str::contains("kaboom"));
    Ok(())
}

#[test]
fn run_accepts_parameter_bindings() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(
        &temp,
        "greet.yml",
        r#"
name: greeter
params:
  - name: subject
    required: true
steps:
  - name: greet
    capability: core.echo
    args:
      message: "hi ${subject}"
"#,
    );

    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.args([
        "run",
        recipe.to_str().unwrap(),
        "--param",
        "subject=world",
        "--workers",
        "2",
    ]);
    cmd.assert().success();
    Ok(())
}

#[test]
fn run_rejects_missing_required_parameter() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(
        &temp,
        "strict.yml",
        r#"
name: strict
params:
  - name: subject
    required: true
steps:
  - name: greet
    capability: core.echo
    args:
      message: "hi ${subject}"
"#,
    );

    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.args(["run", recipe.to_str().unwrap()]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("subject"));
    Ok(())
}

#[test]
fn run_resolves_sub_recipes_from_directory() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new().unwrap();
    write_recipe(
        &temp,
        "child.yml",
        r#"
name: child
steps:
  - name: inner
    capability: core.echo
    args: {message: from child}
"#,
    );
    let parent = write_recipe(
        &temp,
        "parent.yml",
        r#"
name: parent
steps:
  - name: nested
    sub_recipe: child
"#,
    );

    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.args([
        "run",
        parent.to_str().unwrap(),
        "--recipes-dir",
        temp.path().to_str().unwrap(),
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("nested"));
    Ok(())
}

#[test]
fn graph_prints_levels_without_running() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(&temp, "hello.yml", HELLO_RECIPE);

    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.args(["graph", recipe.to_str().unwrap()]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("level 0: configure"))
        .stdout(predicate::str::contains("level 1: greet"));
    Ok(())
}

#[test]
fn validate_accepts_a_well_formed_recipe() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(&temp, "hello.yml", HELLO_RECIPE);

    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.args(["validate", recipe.to_str().unwrap()]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ok"))
        .stdout(predicate::str::contains("2 steps"));
    Ok(())
}

#[test]
fn validate_rejects_a_cyclic_recipe() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(&temp, "tangled.yml", CYCLIC_RECIPE);

    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.args(["validate", recipe.to_str().unwrap()]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Cyclic"));
    Ok(())
}

#[test]
fn validate_reports_missing_recipe_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.args(["validate", "/no/such/recipe.yml"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
fn completions_generate_for_bash() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("simmer"));
    cmd.args(["completions", "bash"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("simmer"));
    Ok(())
}
