use chartup_core::{
    BuildTarget, FieldError, InvalidEntryPolicy, Manifest, ManifestError, resolve_with,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_manifest(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("images.yaml");
    std::fs::write(&path, content).unwrap();
    path
}

fn names(targets: &[BuildTarget]) -> HashSet<String> {
    targets.iter().map(|t| t.name.clone()).collect()
}

// ── Resolution ──

#[test]
fn resolves_mapping_entries_into_targets() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("app")).unwrap();
    let path = write_manifest(
        tmp.path(),
        r#"
app:
  reference: x/app:dev
  sourcePath: ./app
"#,
    );

    let targets = resolve_with(&path, tmp.path(), InvalidEntryPolicy::Fail).unwrap();

    assert_eq!(targets.len(), 1);
    let app = &targets[0];
    assert_eq!(app.name, "app");
    assert_eq!(app.reference, "x/app:dev");
    assert_eq!(app.source_path, PathBuf::from("./app"));
    assert_eq!(
        app.absolute_source_path,
        tmp.path().join("app").canonicalize().unwrap()
    );
}

#[test]
fn accepts_legacy_field_names() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(
        tmp.path(),
        r#"
web:
  Image: registry.local/web:latest
  Path: web
"#,
    );

    let targets = resolve_with(&path, tmp.path(), InvalidEntryPolicy::Fail).unwrap();

    assert_eq!(targets[0].reference, "registry.local/web:latest");
    assert_eq!(targets[0].source_path, PathBuf::from("web"));
}

#[test]
fn ignores_unknown_sibling_fields() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(
        tmp.path(),
        r#"
app:
  reference: x/app:dev
  sourcePath: ./app
  pullPolicy: Always
  replicas: 3
"#,
    );

    let targets = resolve_with(&path, tmp.path(), InvalidEntryPolicy::Fail).unwrap();
    assert_eq!(targets.len(), 1);
}

#[test]
fn non_mapping_entries_are_skipped_with_diagnostic() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(
        tmp.path(),
        r#"
app:
  reference: x/app:dev
  sourcePath: ./app
worker:
  reference: x/worker:dev
  sourcePath: ./worker
version: 2
tags: [a, b]
"#,
    );

    let manifest = Manifest::load(&path, tmp.path()).unwrap();
    let skipped: HashSet<_> = manifest.skipped.iter().map(|s| s.key.clone()).collect();
    assert_eq!(skipped, HashSet::from(["version".to_owned(), "tags".to_owned()]));

    let targets = manifest.into_targets(InvalidEntryPolicy::Fail).unwrap();
    assert_eq!(
        names(&targets),
        HashSet::from(["app".to_owned(), "worker".to_owned()])
    );
}

#[test]
fn empty_document_resolves_to_no_targets() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(tmp.path(), "");

    let targets = resolve_with(&path, tmp.path(), InvalidEntryPolicy::Fail).unwrap();
    assert!(targets.is_empty());
}

#[test]
fn absolute_source_paths_are_kept() {
    let tmp = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    let src = elsewhere.path().canonicalize().unwrap();
    let path = write_manifest(
        tmp.path(),
        &format!("app:\n  reference: x/app:dev\n  sourcePath: {}\n", src.display()),
    );

    let targets = resolve_with(&path, tmp.path(), InvalidEntryPolicy::Fail).unwrap();
    assert_eq!(targets[0].absolute_source_path, src);
}

#[test]
fn resolving_twice_yields_identical_targets() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("a")).unwrap();
    let path = write_manifest(
        tmp.path(),
        r#"
a:
  reference: x/a:dev
  sourcePath: ./a
b:
  reference: x/b:dev
  sourcePath: ./b/../b
"#,
    );

    let first: HashSet<_> = resolve_with(&path, tmp.path(), InvalidEntryPolicy::Fail)
        .unwrap()
        .into_iter()
        .map(|t| (t.name, t.reference, t.absolute_source_path))
        .collect();
    let second: HashSet<_> = resolve_with(&path, tmp.path(), InvalidEntryPolicy::Fail)
        .unwrap()
        .into_iter()
        .map(|t| (t.name, t.reference, t.absolute_source_path))
        .collect();

    assert_eq!(first, second);
}

// ── Invalid entries ──

#[test]
fn missing_reference_fails_whole_resolution_by_default() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(
        tmp.path(),
        r#"
a:
  sourcePath: ./x
"#,
    );

    let result = resolve_with(&path, tmp.path(), InvalidEntryPolicy::Fail);

    assert!(matches!(
        result,
        Err(ManifestError::InvalidEntry {
            source: FieldError::Missing { ref target, field: "reference" },
            ..
        }) if target == "a"
    ));
}

#[test]
fn missing_reference_is_dropped_under_skip_policy() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(
        tmp.path(),
        r#"
a:
  sourcePath: ./x
b:
  reference: x/b:dev
  sourcePath: ./b
"#,
    );

    let targets = resolve_with(&path, tmp.path(), InvalidEntryPolicy::Skip).unwrap();
    assert_eq!(names(&targets), HashSet::from(["b".to_owned()]));
}

#[test]
fn one_bad_entry_fails_even_with_valid_siblings() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(
        tmp.path(),
        r#"
good:
  reference: x/good:dev
  sourcePath: ./good
bad:
  reference: x/bad:dev
"#,
    );

    let result = resolve_with(&path, tmp.path(), InvalidEntryPolicy::Fail);
    assert!(matches!(
        result,
        Err(ManifestError::InvalidEntry {
            source: FieldError::Missing { field: "sourcePath", .. },
            ..
        })
    ));
}

#[test]
fn mistyped_reference_is_reported() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(
        tmp.path(),
        r#"
a:
  reference: 42
  sourcePath: ./a
"#,
    );

    let manifest = Manifest::load(&path, tmp.path()).unwrap();
    assert_eq!(
        manifest.entries[0].as_ref().unwrap_err(),
        &FieldError::NotAString {
            target: "a".to_owned(),
            field: "reference",
            found: "number",
        }
    );
}

#[test]
fn empty_reference_is_reported() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(
        tmp.path(),
        r#"
a:
  reference: ""
  sourcePath: ./a
"#,
    );

    let manifest = Manifest::load(&path, tmp.path()).unwrap();
    assert!(matches!(
        manifest.entries[0],
        Err(FieldError::Empty { field: "reference", .. })
    ));
}

// ── Load failures ──

#[test]
fn missing_file_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let result = Manifest::load(&tmp.path().join("images.yaml"), tmp.path());
    assert!(matches!(result, Err(ManifestError::NotFound { .. })));
}

#[test]
fn invalid_yaml_is_malformed() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(tmp.path(), "app: [unclosed\n  reference: {");

    let result = Manifest::load(&path, tmp.path());
    assert!(matches!(result, Err(ManifestError::Malformed { .. })));
}

#[test]
fn top_level_sequence_is_malformed() {
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(tmp.path(), "- app\n- worker\n");

    let err = Manifest::load(&path, tmp.path()).unwrap_err();
    assert!(matches!(err, ManifestError::Malformed { .. }));
    assert!(err.to_string().contains("sequence"));
}

// ── Properties ──

fn manifest_text(mappings: usize, scalars: usize) -> String {
    let mut out = String::new();
    for i in 0..mappings {
        out.push_str(&format!(
            "target{i}:\n  reference: x/target{i}:dev\n  sourcePath: ./target{i}\n"
        ));
    }
    for i in 0..scalars {
        out.push_str(&format!("scalar{i}: {i}\n"));
    }
    out
}

proptest! {
    #[test]
    fn mapping_keys_become_targets_and_scalars_are_skipped(n in 0usize..8, m in 0usize..8) {
        let base = Path::new("/srv/project");
        let text = manifest_text(n, m);
        let manifest = Manifest::parse(Path::new("images.yaml"), &text, base).unwrap();

        prop_assert_eq!(manifest.skipped.len(), m);
        let targets = manifest.into_targets(InvalidEntryPolicy::Fail).unwrap();
        prop_assert_eq!(targets.len(), n);
        for t in &targets {
            prop_assert!(t.absolute_source_path.starts_with(base));
        }
    }
}
