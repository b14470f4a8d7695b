use assert_cmd::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const BOOTENV: &str = r#"{
    "Name": "ubuntu-16.04-install",
    "OS": { "Name": "ubuntu-16.04" },
    "RequiredParams": ["dns-domain"],
    "Templates": [
        { "Name": "ipxe", "Path": "{{.Machine.HexAddress}}.conf", "UUID": "elilo.tmpl" }
    ]
}"#;

const MACHINE: &str = r#"{
    "Name": "node1.example.com",
    "Address": "192.168.1.10",
    "BootEnv": "ubuntu-16.04-install",
    "Params": { "dns-domain": "example.com" }
}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("machines")).unwrap();
        fs::create_dir_all(root.join("templates")).unwrap();
        fs::create_dir_all(root.join("files")).unwrap();
        fs::write(root.join("templates/elilo.tmpl"), "TTL 0").unwrap();
        fs::write(root.join("bootenv.json"), BOOTENV).unwrap();
        fs::write(root.join("machine.json"), MACHINE).unwrap();
        fs::write(
            root.join("config.toml"),
            format!(
                "file_root = {:?}\n\
                 provisioner_url = \"http://10.0.0.1:8091\"\n\
                 machines_dir = {:?}\n\
                 templates_dir = {:?}\n",
                root.join("files"),
                root.join("machines"),
                root.join("templates"),
            ),
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn provisioner(&self, args: &[&str]) -> Command {
        let mut cmd = Command::cargo_bin("provisioner").unwrap();
        cmd.arg("--config").arg(self.path("config.toml")).args(args);
        cmd.current_dir(self.dir.path());
        cmd
    }

    fn bind_machine(&self) {
        fs::write(self.path("machines/node1.json"), MACHINE).unwrap();
    }
}

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn rendered(root: &Path) -> PathBuf {
    root.join("files/ubuntu-16.04/install/C0A8010A.conf")
}

#[test]
fn test_render_and_clean() {
    let ws = Workspace::new();

    let output = ws
        .provisioner(&["render", "--bootenv", "bootenv.json", "--machine", "machine.json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "render failed: {}", stderr_of(&output));
    assert_eq!(fs::read_to_string(rendered(ws.dir.path())).unwrap(), "TTL 0");

    let output = ws
        .provisioner(&["clean", "--bootenv", "bootenv.json", "--machine", "machine.json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "clean failed: {}", stderr_of(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Removed 1 files"));
    assert!(!rendered(ws.dir.path()).exists());
}

#[test]
fn test_render_missing_required_param() {
    let ws = Workspace::new();
    fs::write(
        ws.path("bare.json"),
        r#"{"Name": "node1", "Address": "192.168.1.10", "BootEnv": "ubuntu-16.04-install"}"#,
    )
    .unwrap();

    let output = ws
        .provisioner(&["render", "--bootenv", "bootenv.json", "--machine", "bare.json"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("missing required params: dns-domain"));
    assert!(!ws.path("files/ubuntu-16.04").exists());
}

#[test]
fn test_prepare_update_cascades() {
    let ws = Workspace::new();
    ws.bind_machine();

    let output = ws
        .provisioner(&["prepare", "--bootenv", "bootenv.json", "--previous", "bootenv.json"])
        .output()
        .unwrap();

    assert!(output.status.success(), "prepare failed: {}", stderr_of(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Prepared ubuntu-16.04-install"));
    assert!(stdout.contains("Rendered node1.example.com (1 files)"));
    assert_eq!(fs::read_to_string(rendered(ws.dir.path())).unwrap(), "TTL 0");
}

#[test]
fn test_prepare_rejects_incomplete_boot_support() {
    let ws = Workspace::new();
    fs::write(
        ws.path("legacy.json"),
        r#"{"Name": "centos-7-install", "OS": {"Name": "centos-7"},
            "Templates": [{"Name": "pxelinux", "Path": "pxelinux.cfg/x", "UUID": "elilo.tmpl"}]}"#,
    )
    .unwrap();

    let output = ws
        .provisioner(&["prepare", "--bootenv", "legacy.json"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr_of(&output)
        .contains("needs an ipxe template or both pxelinux and elilo templates"));
}

#[test]
fn test_retire_guarded_by_machines() {
    let ws = Workspace::new();
    ws.bind_machine();

    let output = ws
        .provisioner(&["retire", "--bootenv", "bootenv.json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("in use by machine node1.example.com"));

    fs::remove_file(ws.path("machines/node1.json")).unwrap();
    let output = ws
        .provisioner(&["retire", "--bootenv", "bootenv.json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "retire failed: {}", stderr_of(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Retired ubuntu-16.04-install"));
}

#[test]
fn test_summary_prints_os_attributes() {
    let ws = Workspace::new();
    fs::write(
        ws.path("debian.json"),
        r#"{"Name": "debian-8-install", "OS": {"Name": "debian-8"},
            "Templates": [{"Name": "ipxe", "Path": "x.ipxe", "UUID": "elilo.tmpl"}]}"#,
    )
    .unwrap();
    fs::write(ws.path("discovery.json"), r#"{"Name": "discovery", "OS": {"Name": "discovery"}}"#)
        .unwrap();

    let output = ws
        .provisioner(&[
            "summary",
            "--bootenv",
            "bootenv.json",
            "debian.json",
            "discovery.json",
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "summary failed: {}", stderr_of(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout
        .contains(r#"provisioner-available-oses = {"debian-8":true,"ubuntu-16.04":true}"#));
    assert!(stdout.contains(r#"provisioner-default-os = "debian-8""#));
}
