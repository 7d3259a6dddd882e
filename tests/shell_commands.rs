//! Shell sessions driven through `Shell::run`

use blockfs::{FileSystem, Flow, Shell, StrategyKind};

fn session(kind: StrategyKind, script: &str) -> (FileSystem, String) {
    let fs = FileSystem::with_strategy(kind, 1024, 512).unwrap();
    let mut shell = Shell::new(fs, Vec::new()).with_color(false);
    shell.run(script.as_bytes()).unwrap();

    let (fs, out) = shell.into_parts();
    (fs, String::from_utf8(out).unwrap())
}

#[test]
fn test_full_session() {
    let script = "\
mkdir docs
mkdir docs/old
mkfile docs/readme hello from blockfs
touch docs/empty
cd docs
pwd
ls
cat readme
mv readme old
ls old
cd ..
rmdir docs
ls
";

    for kind in [StrategyKind::Chain, StrategyKind::Inode] {
        let (fs, out) = session(kind, script);
        assert_eq!(
            out,
            "/docs\nempty\nold/\nreadme\nhello from blockfs\nreadme\n",
            "{} session",
            kind
        );
        assert!(fs.list(None).unwrap().is_empty());
        assert!(fs.check().unwrap().is_clean());
    }
}

#[test]
fn test_errors_do_not_stop_the_session() {
    let script = "\
rmdir /
mkdir a
mkdir a
rm a
cd nowhere
frobnicate
mkdir b
";

    let (fs, out) = session(StrategyKind::Inode, script);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("rmdir: Invalid argument"));
    assert!(lines[1].starts_with("mkdir: Already exists"));
    assert!(lines[2].starts_with("rm: Invalid argument"));
    assert!(lines[3].starts_with("cd: No such file or directory"));
    assert_eq!(lines[4], "Command not found: frobnicate");

    let names: Vec<String> = fs.list(None).unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_df_and_fsck() {
    let (_, out) = session(StrategyKind::Inode, "mkfile f data\ndf\nfsck\n");

    assert!(out.contains("strategy:      inode"));
    assert!(out.contains("block size:    512 bytes"));
    assert!(out.contains("blocks:        2 used / 1022 free / 1024 total"));
    assert!(out.contains("inodes:        2 used / 126 free / 128 total"));
    assert!(out.contains("clean: 1 directories, 1 files, 2 of 1024 blocks in use"));
}

#[test]
fn test_cd_without_argument_goes_home() {
    let (fs, out) = session(StrategyKind::Chain, "mkdir x\ncd x\ncd\npwd\n");
    assert_eq!(out, "/\n");
    assert_eq!(fs.current_path(), "/");
}

#[test]
fn test_exit_ends_session() {
    let (fs, out) = session(StrategyKind::Chain, "mkdir kept\nexit\nmkdir skipped\npwd\n");
    assert!(out.is_empty());
    assert!(fs.resolve("/kept").is_ok());
    assert!(fs.resolve("/skipped").is_err());
}

#[test]
fn test_execute_reports_flow() {
    let fs = FileSystem::with_strategy(StrategyKind::Inode, 64, 128).unwrap();
    let mut shell = Shell::new(fs, Vec::new());

    assert_eq!(shell.execute("mkdir a").unwrap(), Flow::Continue);
    assert_eq!(shell.execute("quit").unwrap(), Flow::Exit);
    assert!(shell.filesystem().resolve("/a").is_ok());
}
