//! Integration tests for buf

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// `buf` isolated from the host's config, cache and registry
    fn buf(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("buf");
        cmd.env("BUF_CONFIG", temp.path().join("config.toml"))
            .env("BUF_CACHE_DIR", temp.path().join("cache"))
            .env_remove("BUF_REGISTRY_MIRROR")
            .env_remove("BUF_BETA_SUPPRESS_WARNINGS");
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        buf(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Protobuf module dependency manager"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        buf(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("buf"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        buf(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        buf(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("[registry]"));
    }

    #[test]
    fn config_init_writes_defaults() {
        let temp = TempDir::new().unwrap();
        buf(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));

        let written = std::fs::read_to_string(temp.path().join("config.toml")).unwrap();
        assert!(written.contains("[registry]"));

        buf(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_fails() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[registry\n").unwrap();
        buf(&temp)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn cache_path_follows_env() {
        let temp = TempDir::new().unwrap();
        buf(&temp)
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                temp.path().join("cache").display().to_string(),
            ));
    }

    #[test]
    fn cache_clear_empty() {
        let temp = TempDir::new().unwrap();
        buf(&temp)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache to clear"));
    }

    #[test]
    fn cache_clear_removes_modules() {
        let temp = TempDir::new().unwrap();
        let modules = temp.path().join("cache").join("v3").join("modules");
        std::fs::create_dir_all(&modules).unwrap();

        buf(&temp)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared"));

        assert!(!modules.exists());
    }

    #[test]
    fn dep_update_without_mirror_fails() {
        let temp = TempDir::new().unwrap();
        buf(&temp)
            .args(["dep", "update"])
            .arg(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("BUF_REGISTRY_MIRROR"));
    }
}

mod dep_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use buf::module::ModuleFullName;
    use buf::registry::FsRegistry;
    use predicates::prelude::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Setup {
        temp: TempDir,
        ws: PathBuf,
    }

    impl Setup {
        /// A registry with `buf.build/acme/units` and `buf.build/acme/geo`,
        /// where geo imports units, and a workspace depending on both
        fn new(local_proto: &str) -> Self {
            let temp = TempDir::new().unwrap();
            let registry = FsRegistry::new(temp.path().join("registry"));
            let units = registry
                .push(
                    &name("buf.build/acme/units"),
                    &files("acme/units/v1/units.proto", "syntax = \"proto3\";"),
                    &[],
                    &[],
                )
                .unwrap();
            registry
                .push(
                    &name("buf.build/acme/geo"),
                    &files(
                        "acme/geo/v1/geo.proto",
                        "syntax = \"proto3\";\nimport \"acme/units/v1/units.proto\";",
                    ),
                    &[units],
                    &[],
                )
                .unwrap();
            registry
                .push(
                    &name("buf.build/acme/unused"),
                    &files("acme/unused/v1/unused.proto", ""),
                    &[],
                    &[],
                )
                .unwrap();

            let ws = temp.path().join("ws");
            write(
                &ws,
                "buf.yaml",
                "version: v2\ndeps:\n  - buf.build/acme/geo\n  - buf.build/acme/unused\n",
            );
            write(&ws, "weather/v1/weather.proto", local_proto);
            Self { temp, ws }
        }

        fn buf(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("buf");
            cmd.env("BUF_CONFIG", self.temp.path().join("config.toml"))
                .env("BUF_CACHE_DIR", self.temp.path().join("cache"))
                .env("BUF_REGISTRY_MIRROR", self.temp.path().join("registry"))
                .env_remove("BUF_BETA_SUPPRESS_WARNINGS");
            cmd
        }

        fn lock(&self) -> String {
            fs::read_to_string(self.ws.join("buf.lock")).unwrap()
        }
    }

    fn name(s: &str) -> ModuleFullName {
        ModuleFullName::parse(s).unwrap()
    }

    fn files(path: &str, content: &str) -> BTreeMap<String, Vec<u8>> {
        BTreeMap::from([(path.to_string(), content.as_bytes().to_vec())])
    }

    fn write(dir: &Path, path: &str, content: &str) {
        let path = dir.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const USES_GEO: &str = "syntax = \"proto3\";\nimport \"acme/geo/v1/geo.proto\";";

    #[test]
    fn update_writes_lock_and_warns_about_unused() {
        let setup = Setup::new(USES_GEO);

        setup
            .buf()
            .args(["dep", "update"])
            .arg(&setup.ws)
            .assert()
            .success()
            .stdout(predicate::str::contains("Wrote"))
            .stderr(predicate::str::contains(
                "Module buf.build/acme/unused is declared in your buf.yaml deps but is unused",
            ));

        let lock = setup.lock();
        assert!(lock.starts_with("# Generated by buf. DO NOT EDIT.\n"));
        assert!(lock.contains("version: v2"));
        assert!(lock.contains("buf.build/acme/geo"));
        assert!(lock.contains("buf.build/acme/units"));
        assert!(!lock.contains("buf.build/acme/unused"));
        assert!(setup.temp.path().join("cache").join("v3").join("modules").is_dir());
    }

    #[test]
    fn suppressed_warnings_are_not_printed() {
        let setup = Setup::new(USES_GEO);

        setup
            .buf()
            .env("BUF_BETA_SUPPRESS_WARNINGS", "1")
            .args(["dep", "update"])
            .arg(&setup.ws)
            .assert()
            .success()
            .stderr(predicate::str::contains("unused").not());
    }

    #[test]
    fn second_prune_leaves_lock_untouched() {
        let setup = Setup::new(USES_GEO);
        setup.buf().args(["dep", "update"]).arg(&setup.ws).assert().success();
        let before = setup.lock();

        setup
            .buf()
            .args(["dep", "prune"])
            .arg(&setup.ws)
            .assert()
            .success()
            .stdout(predicate::str::contains("is up to date"));

        assert_eq!(setup.lock(), before);
    }

    #[test]
    fn graph_prints_dot() {
        let setup = Setup::new(USES_GEO);
        setup.buf().args(["dep", "update"]).arg(&setup.ws).assert().success();

        setup
            .buf()
            .args(["dep", "graph"])
            .arg(&setup.ws)
            .assert()
            .success()
            .stdout(predicate::str::starts_with("digraph {"))
            .stdout(predicate::str::contains("buf.build/acme/geo"));
    }

    #[test]
    fn graph_prints_json() {
        let setup = Setup::new(USES_GEO);

        setup
            .buf()
            .args(["dep", "graph", "--format", "json"])
            .arg(&setup.ws)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"name\": \"buf.build/acme/geo\""))
            .stdout(predicate::str::contains("\"create_time\""));

        assert!(setup.temp.path().join("cache").join("v3").join("commits").is_dir());
    }

    #[test]
    fn import_outside_declared_deps_fails() {
        // units is only reachable through geo, which is not declared
        let setup = Setup::new("import \"acme/units/v1/units.proto\";");
        write(&setup.ws, "buf.yaml", "version: v2\ndeps:\n  - buf.build/acme/unused\n");

        setup
            .buf()
            .args(["dep", "update"])
            .arg(&setup.ws)
            .assert()
            .failure()
            .stderr(predicate::str::contains("acme/units/v1/units.proto"));

        assert!(!setup.ws.join("buf.lock").exists());
    }

    #[test]
    fn missing_workspace_fails() {
        let setup = Setup::new(USES_GEO);
        let empty = setup.temp.path().join("empty");
        fs::create_dir_all(&empty).unwrap();

        setup
            .buf()
            .args(["dep", "prune"])
            .arg(&empty)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Hint:"));
    }
}
