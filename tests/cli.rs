use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

mod common;
use common::{png_bytes, rect, write_config, write_session_svg, write_source_svg, INSECT};

#[test]
fn runs() {
    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.assert().success();
}

#[test]
fn outputs_tool_name() {
    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.arg("-V");
    cmd.assert()
        .success()
        .stdout(format!("trapset {}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn digest_prints_sha256() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("abc.txt");
    fs::write(&path, "abc").unwrap();

    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.arg("digest").arg(&path);
    cmd.assert().success().stdout(predicate::str::starts_with(
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad  ",
    ));
}

#[test]
fn digest_missing_file_fails() {
    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.args(["digest", "does/not/exist.svg"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read source"));
}

#[test]
fn split_with_extreme_thresholds() {
    let temp = tempfile::tempdir().unwrap();
    write_source_svg(temp.path(), "a.svg", (4, 4), &png_bytes(4, 4, [0, 0, 0]), &[]);

    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.arg("split").arg(temp.path()).args(["--fraction", "1.0"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("0 train, 1 validation"));

    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.arg("split")
        .arg(temp.path())
        .arg("--threshold")
        .arg("f".repeat(64));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1 train, 0 validation"));
}

#[test]
fn split_rejects_bad_threshold() {
    let temp = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.arg("split").arg(temp.path()).args(["--threshold", "not-hex"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("not a hexadecimal"));
}

#[test]
fn prepare_detection_writes_records() {
    let temp = tempfile::tempdir().unwrap();
    let data = temp.path().join("data");
    write_source_svg(
        &data,
        "trap.svg",
        (40, 30),
        &png_bytes(40, 30, [50, 60, 70]),
        &[rect(2.0, 2.0, 10.0, 5.0, INSECT), rect(20.0, 2.0, 5.0, 5.0, "#00ff00")],
    );
    let config = write_config(temp.path(), "");
    let output = temp.path().join("records.json");

    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.arg("prepare-detection")
        .arg(&data)
        .arg("--config")
        .arg(&config)
        .arg("--output")
        .arg(&output);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Prepared detection:"))
        .stdout(predicate::str::contains("1 sources"))
        .stdout(predicate::str::contains("1 objects"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let records: Vec<_> = json["train"]
        .as_array()
        .unwrap()
        .iter()
        .chain(json["validation"].as_array().unwrap())
        .collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["image_id"], "trap");
    assert_eq!(records[0]["annotations"][0]["bbox_mode"], "XYWH_ABS");
}

#[test]
fn prepare_detection_json_report() {
    let temp = tempfile::tempdir().unwrap();
    let data = temp.path().join("data");
    write_source_svg(&data, "t.svg", (8, 8), &png_bytes(8, 8, [1, 1, 1]), &[]);
    let config = write_config(temp.path(), "");

    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.arg("prepare-detection")
        .arg(&data)
        .arg("-c")
        .arg(&config)
        .arg("-o")
        .arg(temp.path().join("out.json"))
        .args(["--report", "json"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"task\": \"detection\""))
        .stdout(predicate::str::contains("\"misses\": 2"));
}

#[test]
fn prepare_detection_rejects_bad_config() {
    let temp = tempfile::tempdir().unwrap();
    let config = temp.path().join("bad.yaml");
    fs::write(&config, "tile_size: 0\nclasses: [{ name: a, label: b }]\n").unwrap();

    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.arg("prepare-detection")
        .arg(temp.path())
        .arg("--config")
        .arg(&config)
        .arg("--output")
        .arg(temp.path().join("out.json"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn prepare_pairs_writes_views() {
    let temp = tempfile::tempdir().unwrap();
    let data = temp.path().join("sessions");
    fs::create_dir_all(&data).unwrap();
    write_session_svg(
        &data,
        "s.svg",
        &png_bytes(32, 32, [100, 100, 100]),
        (32, 32),
        &[rect(1.0, 1.0, 6.0, 6.0, INSECT)],
        &[rect(2.0, 1.0, 6.0, 6.0, INSECT)],
    );
    let config = write_config(temp.path(), "pair_view_dim: 16\n");
    let views = temp.path().join("views");

    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.arg("prepare-pairs")
        .arg(&data)
        .arg("--config")
        .arg(&config)
        .arg("--output")
        .arg(temp.path().join("pairs.json"))
        .arg("--views")
        .arg(&views);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1 positive, 0 negative"));

    let written: Vec<_> = fs::read_dir(&views).unwrap().collect();
    assert_eq!(written.len(), 1);
    let strip = image::open(written[0].as_ref().unwrap().path()).unwrap();
    assert_eq!((strip.width(), strip.height()), (48, 16));
}

#[test]
fn preview_writes_png() {
    let temp = tempfile::tempdir().unwrap();
    let svg = write_source_svg(
        temp.path(),
        "p.svg",
        (20, 20),
        &png_bytes(20, 20, [0, 0, 0]),
        &[rect(2.0, 2.0, 8.0, 8.0, INSECT)],
    );
    let config = write_config(temp.path(), "");
    let out = temp.path().join("preview.png");

    let mut cmd = Command::cargo_bin("trapset").unwrap();
    cmd.arg("preview")
        .arg(&svg)
        .arg("--config")
        .arg(&config)
        .arg("--output")
        .arg(&out);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1 objects"));

    let img = image::open(&out).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (20, 20));
    assert_ne!(*img.get_pixel(2, 2), image::Rgb([0, 0, 0]));
}
