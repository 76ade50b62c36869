use modelship_config::{CONFIG_PATH_ENV, load_settings, settings_template};
use serial_test::serial;
use std::fs;

#[test]
#[serial]
fn test_load_from_env_path() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("modelship.kdl");
    fs::write(&path, settings_template("Demo Model")).unwrap();

    let (found, settings) = temp_env::with_var(CONFIG_PATH_ENV, Some(path.as_os_str()), || {
        load_settings(None).unwrap()
    });

    assert_eq!(found, path);
    assert_eq!(settings.project.name, "Demo Model");
    assert_eq!(settings.target.provider, "aws");
    assert_eq!(settings.destroy_order, "reverse-creation");
}

#[test]
fn test_load_explicit_path() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("other.kdl");
    fs::write(
        &path,
        r#"
project "Churn" {
    version "1.4.0"
}
model "churn.pt"
"#,
    )
    .unwrap();

    let (_, settings) = load_settings(Some(&path)).unwrap();
    assert_eq!(settings.project.version, "1.4.0");
    let model = settings.model.unwrap();
    assert!(model.framework.is_none());
}
