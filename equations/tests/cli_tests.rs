/// Command line integration tests, run with the [trycmd] crate.

#[test]
fn cli_tests() {
    trycmd::TestCases::new().case("tests/cmd/*.md");
}

#[test]
fn version() {
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_equations"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim_end(), concat!("equations ", env!("CARGO_PKG_VERSION")));
}
