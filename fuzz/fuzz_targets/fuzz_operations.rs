#![no_main]
use arbitrary::Arbitrary;
use blockfs::{FileSystem, StrategyKind};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    MakeDirectory(String),
    RemoveDirectory(String),
    MakeFile(String, Vec<u8>),
    RemoveFile(String),
    Move(String, String),
    Read(String),
    ChangeDirectory(Option<String>),
}

#[derive(Arbitrary, Debug)]
struct Input {
    inode: bool,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let kind = if input.inode {
        StrategyKind::Inode
    } else {
        StrategyKind::Chain
    };
    let mut fs = FileSystem::with_strategy(kind, 256, 16).expect("valid geometry");

    for op in input.ops.iter().take(64) {
        // Errors are fine; corruption is not
        let _ = match op {
            Op::MakeDirectory(path) => fs.make_directory(path),
            Op::RemoveDirectory(path) => fs.remove_directory(path),
            Op::MakeFile(path, data) => fs.make_file(path, data),
            Op::RemoveFile(path) => fs.remove_file(path),
            Op::Move(src, dst) => fs.move_entry(src, dst),
            Op::Read(path) => fs.read_file(path).map(|_| ()),
            Op::ChangeDirectory(path) => fs.change_directory(path.as_deref()),
        };

        let report = fs.check().expect("tree decodes");
        assert!(report.is_clean(), "{:?} after {:?}", report.problems, op);
    }
});
