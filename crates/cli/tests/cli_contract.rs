use assert_cmd::cargo::cargo_bin_cmd;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageFormat, Rgba, RgbaImage};
use pdf_engine::{blank_document, PageSize};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

fn write_pdf(dir: &Path, name: &str, pages: u32) -> PathBuf {
    let bytes = blank_document(pages, PageSize { width_pt: 612.0, height_pt: 792.0 })
        .expect("blank document should build");
    let path = dir.join(name);
    fs::write(&path, bytes).expect("pdf should be written");
    path
}

fn write_manifest(dir: &Path, manifest: Value) -> PathBuf {
    let path = dir.join("fields.json");
    fs::write(&path, manifest.to_string()).expect("manifest should be written");
    path
}

fn png_data_url() -> String {
    let image = RgbaImage::from_pixel(20, 10, Rgba([10, 20, 30, 255]));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).expect("png encodes");
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

#[test]
fn info_emits_stable_json_contract() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "small.pdf", 3);

    let output = cargo_bin_cmd!("countersign")
        .arg("info")
        .arg(&pdf)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["page_count"], 3);
    assert_eq!(value["first_page_size_pt"]["width"], 612.0);
    assert_eq!(value["first_page_size_pt"]["height"], 792.0);
    assert_eq!(value["path"], pdf.display().to_string());
}

#[test]
fn info_fails_for_missing_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("countersign")
        .arg("info")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("invalid.pdf");
    fs::write(&path, b"this is not a pdf").expect("file should be written");

    cargo_bin_cmd!("countersign")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn info_fails_for_encrypted_marker_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("encrypted-marker.pdf");
    fs::write(&path, b"%PDF-1.7\ntrailer\n<< /Encrypt 5 0 R >>\n%%EOF\n")
        .expect("file should be written");

    cargo_bin_cmd!("countersign")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("encrypted PDFs are not supported"));
}

#[test]
fn sign_writes_signed_copy_next_to_input() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "lease.pdf", 2);
    let manifest = write_manifest(
        temp.path(),
        json!({
            "fields": [
                { "x": 40, "y": 600, "kind": "type" },
                { "page": 2, "x": 300, "y": 650, "width": 120, "height": 40,
                  "kind": "image", "image": png_data_url() }
            ]
        }),
    );
    let expected = temp.path().join("signed_lease.pdf");

    cargo_bin_cmd!("countersign")
        .arg("--config-dir")
        .arg(temp.path().join("config"))
        .arg("sign")
        .arg(&pdf)
        .arg("--fields")
        .arg(&manifest)
        .arg("--signer")
        .arg("Ada Lovelace")
        .env_remove("COUNTERSIGN_SIGNER_NAME")
        .assert()
        .success()
        .stdout(predicate::str::contains("signed_lease.pdf"));

    let bytes = fs::read(&expected).expect("signed copy should exist");
    let info = pdf_engine::inspect(&bytes).expect("signed copy should parse");
    assert_eq!(info.page_count(), 2);
    assert!(bytes.windows(b"Helvetica-Bold".len()).any(|w| w == b"Helvetica-Bold"));
}

#[test]
fn sign_refuses_empty_fields_unless_allowed() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "form.pdf", 1);
    let manifest = write_manifest(
        temp.path(),
        json!({ "fields": [
            { "x": 10, "y": 10, "kind": "type", "text": "Ada" },
            { "x": 10, "y": 200, "kind": "draw" }
        ] }),
    );
    let output = temp.path().join("out").join("signed.pdf");

    cargo_bin_cmd!("countersign")
        .arg("--config-dir")
        .arg(temp.path())
        .arg("sign")
        .arg(&pdf)
        .arg("--fields")
        .arg(&manifest)
        .arg("--output")
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 2 signature fields are empty"));
    assert!(!output.exists());

    cargo_bin_cmd!("countersign")
        .arg("--config-dir")
        .arg(temp.path())
        .arg("sign")
        .arg(&pdf)
        .arg("--fields")
        .arg(&manifest)
        .arg("--output")
        .arg(&output)
        .arg("--allow-incomplete")
        .assert()
        .success();
    assert!(output.exists());
}

#[test]
fn sign_fails_for_unreadable_manifest() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "form.pdf", 1);
    let manifest = temp.path().join("fields.json");
    fs::write(&manifest, "{ not json").expect("manifest should be written");

    cargo_bin_cmd!("countersign")
        .arg("--config-dir")
        .arg(temp.path())
        .arg("sign")
        .arg(&pdf)
        .arg("--fields")
        .arg(&manifest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid field manifest"));
}

#[test]
fn config_persists_signer_settings() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("countersign")
        .arg("--config-dir")
        .arg(temp.path())
        .arg("config")
        .arg("--signer-name")
        .arg("Grace Hopper")
        .arg("--field-size")
        .arg("150x60")
        .assert()
        .success()
        .stdout(predicate::str::contains("Grace Hopper"));

    assert!(temp.path().join("signer.json").exists());

    let output = cargo_bin_cmd!("countersign")
        .arg("--config-dir")
        .arg(temp.path())
        .arg("config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["profile"]["name"], "Grace Hopper");
    assert_eq!(value["field_width"], 150.0);
    assert_eq!(value["field_height"], 60.0);
}

#[test]
fn config_rejects_bad_field_size() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("countersign")
        .arg("--config-dir")
        .arg(temp.path())
        .arg("config")
        .arg("--field-size")
        .arg("wide")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --field-size"));
    assert!(!temp.path().join("signer.json").exists());
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("countersign")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
