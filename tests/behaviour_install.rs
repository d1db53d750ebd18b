//! Behaviour-driven tests for package body installation.
//!
//! Scenarios build a package body in memory, install it onto a [`MemFs`],
//! and inspect the manifest and the resulting tree.

use apk_install::error::InstallError;
use apk_install::fs::PackageFs;
use apk_install::fs::memory::{FsCall, MemFs};
use apk_install::test_utils::{PackageBuilder, truncated_package};
use apk_install::{InstallManifest, install_package};
use camino::Utf8Path;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

#[derive(Default)]
struct InstallWorld {
    fs: MemFs,
    builder: Option<PackageBuilder>,
    body: Option<Vec<u8>>,
    calls_before: usize,
    result: Option<apk_install::Result<InstallManifest>>,
}

impl InstallWorld {
    fn append(&mut self, add: impl FnOnce(PackageBuilder) -> PackageBuilder) {
        let builder = self.builder.take().unwrap_or_default();
        self.builder = Some(add(builder));
    }

    fn manifest(&self) -> &InstallManifest {
        match self.result.as_ref().expect("package not installed") {
            Ok(manifest) => manifest,
            Err(err) => panic!("installation failed: {err}"),
        }
    }

    fn error(&self) -> &InstallError {
        match self.result.as_ref().expect("package not installed") {
            Ok(manifest) => panic!("installation succeeded with {} entries", manifest.len()),
            Err(err) => err,
        }
    }
}

#[fixture]
fn world() -> InstallWorld {
    InstallWorld::default()
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a package with a hidden control file \"{name}\"")]
fn given_control_file(world: &mut InstallWorld, name: String) {
    world.append(|builder| builder.file(&name, b""));
}

#[given("a directory \"{name}\"")]
fn given_directory(world: &mut InstallWorld, name: String) {
    world.append(|builder| builder.dir(&name));
}

#[given("a file \"{name}\" containing \"{content}\"")]
fn given_file(world: &mut InstallWorld, name: String, content: String) {
    world.append(|builder| builder.file(&name, content.as_bytes()));
}

#[given("a character device \"{name}\"")]
fn given_char_device(world: &mut InstallWorld, name: String) {
    world.append(|builder| builder.special(&name, tar::EntryType::Char));
}

#[given("a hard link \"{name}\" to \"{target}\"")]
fn given_hard_link(world: &mut InstallWorld, name: String, target: String) {
    world.append(|builder| builder.hardlink(&name, &target));
}

#[given("a package whose file \"{name}\" declares {declared} bytes but carries \"{content}\"")]
fn given_truncated(world: &mut InstallWorld, name: String, declared: u64, content: String) {
    world.body = Some(truncated_package(&name, declared, content.as_bytes()));
}

#[given("the target already has directory \"{path}\"")]
fn given_existing_dir(world: &mut InstallWorld, path: String) {
    world
        .fs
        .make_dir_all(Utf8Path::new(&path), 0o755)
        .expect("seed directory");
}

#[given("the target already has symlink \"{path}\" pointing at \"{target}\"")]
fn given_existing_symlink(world: &mut InstallWorld, path: String, target: String) {
    world
        .fs
        .symlink(Utf8Path::new(&target), Utf8Path::new(&path))
        .expect("seed symlink");
}

#[when("the package is installed")]
fn when_installed(world: &mut InstallWorld) {
    let body = match world.body.take() {
        Some(body) => body,
        None => world.builder.take().unwrap_or_default().finish(),
    };
    world.calls_before = world.fs.calls().len();
    world.result = Some(install_package(&world.fs, body.as_slice()));
}

#[then("the manifest lists \"{names}\"")]
fn then_manifest_lists(world: &mut InstallWorld, names: String) {
    let expected: Vec<&str> = names.split(", ").collect();
    let actual: Vec<&str> = world
        .manifest()
        .iter()
        .map(|entry| entry.name().as_str())
        .collect();
    assert_eq!(actual, expected);
}

#[then("the checksum of \"{name}\" is \"{checksum}\"")]
fn then_checksum_is(world: &mut InstallWorld, name: String, checksum: String) {
    let entry = world
        .manifest()
        .iter()
        .find(|entry| entry.name() == name.as_str())
        .expect("entry in manifest");
    let actual = entry.checksum.expect("regular file checksum").to_string();
    assert_eq!(actual, checksum);
}

#[then("no directory was created")]
fn then_no_directory_created(world: &mut InstallWorld) {
    let calls = world.fs.calls();
    let created = calls
        .iter()
        .skip(world.calls_before)
        .filter(|call| matches!(call, FsCall::MakeDirAll(_)))
        .count();
    assert_eq!(created, 0);
}

#[then("installation fails with an unsupported entry")]
fn then_fails_unsupported(world: &mut InstallWorld) {
    let err = world.error();
    assert!(
        matches!(err, InstallError::UnsupportedEntry { .. }),
        "expected UnsupportedEntry, got {err:?}"
    );
}

#[then("installation fails with short content")]
fn then_fails_short(world: &mut InstallWorld) {
    let err = world.error();
    assert!(
        matches!(err, InstallError::ShortContent { .. }),
        "expected ShortContent, got {err:?}"
    );
}

#[then("\"{path}\" was not written")]
fn then_not_written(world: &mut InstallWorld, path: String) {
    assert_eq!(world.fs.file_contents(Utf8Path::new(&path)), None);
}

#[then("\"{path}\" contains \"{content}\"")]
fn then_contains(world: &mut InstallWorld, path: String, content: String) {
    assert_eq!(
        world.fs.file_contents(Utf8Path::new(&path)),
        Some(content.into_bytes())
    );
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/install.feature",
    name = "Control files before the data section are skipped"
)]
fn scenario_skip_control_files(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "Hidden files inside the data section are installed"
)]
fn scenario_hidden_after_data_section(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "A directory reached through a symlink is left alone"
)]
fn scenario_symlinked_directory(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "Device nodes abort the installation"
)]
fn scenario_device_nodes(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "A truncated file is reported"
)]
fn scenario_truncated_file(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "Hard links share content with their target"
)]
fn scenario_hard_links(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "A directory reached through a chain of symlinks is left alone"
)]
fn scenario_symlink_chain(world: InstallWorld) {
    let _ = world;
}
