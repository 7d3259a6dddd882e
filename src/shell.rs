//! Line-oriented command shell over a [`FileSystem`]
//!
//! Commands are whitespace-separated words. Filesystem errors are printed as
//! `<verb>: <error>` and never end the session; only I/O errors on the
//! output sink (or reading input) are returned to the caller.

use crate::core::filesystem::FileSystem;
use crate::error::FsError;
use std::io::{self, BufRead, Write};
use tracing::debug;

const BLUE: &str = "\x1b[34m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

const HELP: &str = "\
Commands:
  mkdir PATH...          create directories
  rmdir PATH...          remove directories and everything below them
  mkfile PATH [TEXT...]  create a file holding TEXT
  touch PATH...          create empty files
  rm PATH...             remove files
  mv SRC DST             move or rename an entry
  cat PATH...            print file contents
  ls [PATH]              list a directory
  cd [PATH]              change directory (no PATH: root)
  pwd                    print the current directory
  df [--json]            show block and inode usage
  fsck [--json]          check allocation integrity
  help                   show this help
  exit                   leave the shell";

/// What the caller should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Interactive shell
pub struct Shell<W: Write> {
    fs: FileSystem,
    out: W,
    color: bool,
    prompt: Option<String>,
}

impl<W: Write> Shell<W> {
    pub fn new(fs: FileSystem, out: W) -> Self {
        Shell {
            fs,
            out,
            color: true,
            prompt: None,
        }
    }

    /// Enable or disable ANSI colours in `ls`
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Print `prompt` before reading each line in [`Shell::run`]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn filesystem(&self) -> &FileSystem {
        &self.fs
    }

    pub fn filesystem_mut(&mut self) -> &mut FileSystem {
        &mut self.fs
    }

    /// Give back the filesystem and the output sink
    pub fn into_parts(self) -> (FileSystem, W) {
        (self.fs, self.out)
    }

    /// Read and execute lines until EOF or `exit`
    pub fn run<R: BufRead>(&mut self, mut input: R) -> io::Result<()> {
        let mut line = String::new();
        loop {
            if let Some(prompt) = &self.prompt {
                write!(self.out, "{}", prompt)?;
                self.out.flush()?;
            }

            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Ok(());
            }

            if self.execute(&line)? == Flow::Exit {
                return Ok(());
            }
        }
    }

    /// Execute one command line
    pub fn execute(&mut self, line: &str) -> io::Result<Flow> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Ok(Flow::Continue);
        };
        debug!("shell: {} {:?}", verb, args);

        match verb {
            "exit" | "quit" => return Ok(Flow::Exit),
            "help" => writeln!(self.out, "{}", HELP)?,
            "pwd" => writeln!(self.out, "{}", self.fs.current_path())?,
            "mkdir" => self.each(verb, args, |fs, path| fs.make_directory(path))?,
            "rmdir" => self.each(verb, args, |fs, path| fs.remove_directory(path))?,
            "touch" => self.each(verb, args, |fs, path| fs.make_file(path, b""))?,
            "rm" => self.each(verb, args, |fs, path| fs.remove_file(path))?,
            "mkfile" => self.mkfile(args)?,
            "mv" => self.mv(args)?,
            "cat" => self.cat(args)?,
            "ls" => self.ls(args)?,
            "cd" => self.cd(args)?,
            "df" => self.df(args)?,
            "fsck" => self.fsck(args)?,
            _ => writeln!(self.out, "Command not found: {}", verb)?,
        }

        Ok(Flow::Continue)
    }

    /// Apply `op` to every path argument, reporting failures individually
    fn each<F>(&mut self, verb: &str, args: &[&str], mut op: F) -> io::Result<()>
    where
        F: FnMut(&mut FileSystem, &str) -> crate::Result<()>,
    {
        if args.is_empty() {
            return self.usage(verb, "missing operand");
        }
        for &path in args {
            if let Err(e) = op(&mut self.fs, path) {
                self.report(verb, &e)?;
            }
        }
        Ok(())
    }

    fn mkfile(&mut self, args: &[&str]) -> io::Result<()> {
        let Some((path, words)) = args.split_first() else {
            return self.usage("mkfile", "missing operand");
        };
        let content = words.join(" ");
        if let Err(e) = self.fs.make_file(path, content.as_bytes()) {
            self.report("mkfile", &e)?;
        }
        Ok(())
    }

    fn mv(&mut self, args: &[&str]) -> io::Result<()> {
        let [src, dst] = args else {
            return self.usage("mv", "expected SRC and DST");
        };
        if let Err(e) = self.fs.move_entry(src, dst) {
            self.report("mv", &e)?;
        }
        Ok(())
    }

    fn cat(&mut self, args: &[&str]) -> io::Result<()> {
        if args.is_empty() {
            return self.usage("cat", "missing operand");
        }
        for path in args {
            match self.fs.read_file(path) {
                Ok(content) => {
                    self.out.write_all(&content)?;
                    if !content.is_empty() && !content.ends_with(b"\n") {
                        writeln!(self.out)?;
                    }
                }
                Err(e) => self.report("cat", &e)?,
            }
        }
        Ok(())
    }

    fn ls(&mut self, args: &[&str]) -> io::Result<()> {
        if args.len() > 1 {
            return self.usage("ls", "too many arguments");
        }

        let entries = match self.fs.list(args.first().copied()) {
            Ok(entries) => entries,
            Err(e) => return self.report("ls", &e),
        };

        for entry in entries {
            match (self.color, entry.is_dir()) {
                (true, true) => writeln!(self.out, "{}{}{}", BLUE, entry.name, RESET)?,
                (true, false) => writeln!(self.out, "{}{}{}", GREEN, entry.name, RESET)?,
                (false, true) => writeln!(self.out, "{}/", entry.name)?,
                (false, false) => writeln!(self.out, "{}", entry.name)?,
            }
        }
        Ok(())
    }

    fn cd(&mut self, args: &[&str]) -> io::Result<()> {
        if args.len() > 1 {
            return self.usage("cd", "too many arguments");
        }
        if let Err(e) = self.fs.change_directory(args.first().copied()) {
            self.report("cd", &e)?;
        }
        Ok(())
    }

    fn df(&mut self, args: &[&str]) -> io::Result<()> {
        let stats = self.fs.stats();
        if wants_json(args) {
            return writeln!(self.out, "{}", serde_json::to_string_pretty(&stats)?);
        }

        writeln!(self.out, "strategy:      {}", stats.strategy)?;
        writeln!(self.out, "block size:    {} bytes", stats.block_size)?;
        writeln!(
            self.out,
            "blocks:        {} used / {} free / {} total",
            stats.used_blocks, stats.free_blocks, stats.total_blocks
        )?;
        writeln!(self.out, "fragmentation: {:.2}", stats.fragmentation)?;
        if let Some(inodes) = stats.inodes {
            writeln!(
                self.out,
                "inodes:        {} used / {} free / {} total",
                inodes.total_inodes - inodes.free_inodes,
                inodes.free_inodes,
                inodes.total_inodes
            )?;
        }
        Ok(())
    }

    fn fsck(&mut self, args: &[&str]) -> io::Result<()> {
        let report = match self.fs.check() {
            Ok(report) => report,
            Err(e) => return self.report("fsck", &e),
        };
        if wants_json(args) {
            return writeln!(self.out, "{}", serde_json::to_string_pretty(&report)?);
        }

        if report.is_clean() {
            writeln!(
                self.out,
                "clean: {} directories, {} files, {} of {} blocks in use",
                report.directories, report.files, report.owned_blocks, report.total_blocks
            )?;
        } else {
            for problem in &report.problems {
                writeln!(self.out, "fsck: {}", problem)?;
            }
        }
        Ok(())
    }

    fn report(&mut self, verb: &str, err: &FsError) -> io::Result<()> {
        writeln!(self.out, "{}: {}", verb, err)
    }

    fn usage(&mut self, verb: &str, msg: &str) -> io::Result<()> {
        writeln!(self.out, "{}: {}", verb, msg)
    }
}

fn wants_json(args: &[&str]) -> bool {
    args.iter().any(|&arg| arg == "--json" || arg == "-j")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;

    fn shell() -> Shell<Vec<u8>> {
        let fs = FileSystem::with_strategy(StrategyKind::Chain, 128, 32).unwrap();
        Shell::new(fs, Vec::new()).with_color(false)
    }

    fn output(shell: Shell<Vec<u8>>) -> String {
        String::from_utf8(shell.into_parts().1).unwrap()
    }

    #[test]
    fn test_blank_line_is_ignored() {
        let mut sh = shell();
        assert_eq!(sh.execute("   \n").unwrap(), Flow::Continue);
        assert!(output(sh).is_empty());
    }

    #[test]
    fn test_mkfile_joins_words() {
        let mut sh = shell();
        sh.execute("mkfile note hello   big world").unwrap();
        sh.execute("cat note").unwrap();
        assert_eq!(output(sh), "hello big world\n");
    }

    #[test]
    fn test_unknown_command() {
        let mut sh = shell();
        sh.execute("format c:").unwrap();
        assert_eq!(output(sh), "Command not found: format\n");
    }

    #[test]
    fn test_errors_are_reported() {
        let mut sh = shell();
        sh.execute("cat missing").unwrap();
        sh.execute("mv onlyone").unwrap();
        let out = output(sh);

        assert!(out.starts_with("cat: No such file or directory: missing\n"));
        assert!(out.ends_with("mv: expected SRC and DST\n"));
    }

    #[test]
    fn test_ls_colors() {
        let fs = FileSystem::with_strategy(StrategyKind::Inode, 128, 32).unwrap();
        let mut sh = Shell::new(fs, Vec::new());
        sh.execute("mkdir d").unwrap();
        sh.execute("touch f").unwrap();
        sh.execute("ls").unwrap();

        assert_eq!(output(sh), "\x1b[34md\x1b[0m\n\x1b[32mf\x1b[0m\n");
    }

    #[test]
    fn test_df_json() {
        let mut sh = shell();
        sh.execute("df --json").unwrap();

        let value: serde_json::Value = serde_json::from_str(&output(sh)).unwrap();
        assert_eq!(value["strategy"], "chain");
        assert_eq!(value["total_blocks"], 128);
        assert!(value["inodes"].is_null());
    }

    #[test]
    fn test_exit_stops_run() {
        let mut sh = shell().with_prompt("> ");
        sh.run("mkdir a\nexit\nmkdir b\n".as_bytes()).unwrap();

        assert!(sh.filesystem().resolve("/a").is_ok());
        assert!(sh.filesystem().resolve("/b").is_err());
        assert_eq!(output(sh), "> > ");
    }
}
