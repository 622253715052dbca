#![cfg(all(feature = "opencv", feature = "bincode"))]

use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use image::{GrayImage, Luma};
use predicates::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rstest::*;

macro_rules! cargo_run {
    ($($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin("vocabulary-creator")?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

#[rstest]
#[case(&["--vocabularyFilename", "out.voc"])]
#[case(&["--sourceFiles", "*.png"])]
fn missing_required_option_fails(#[case] args: &[&str]) -> Result<()> {
    let mut cmd = Command::cargo_bin("vocabulary-creator")?;
    cmd.args(args)
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
    Ok(())
}

#[test]
fn help_and_version_succeed() -> Result<()> {
    cargo_run!("--help")
        .success()
        .stdout(predicate::str::contains("--sourceFiles"));
    cargo_run!("--version").success();
    Ok(())
}

#[test]
fn builds_and_reloads_vocabulary() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let mut rng = StdRng::seed_from_u64(11);
    for i in 0..3 {
        let img = GrayImage::from_fn(320, 240, |_, _| Luma([rng.gen::<u8>()]));
        img.save(dir.path().join(format!("noise_{i}.png")))?;
    }
    let voc = dir.path().join("orb.voc");

    cargo_run!(
        "-sourceFiles",
        dir.path().join("*.png"),
        "-vocabularyFilename",
        &voc
    )
    .success()
    .stdout(predicate::str::contains("source files name filter: *.png"))
    .stdout(predicate::str::contains("Loaded vocabulary information"));

    assert!(voc.exists());
    Ok(())
}
