//! Debug dump files.
//!
//! Nothing is written unless `dump_to` is set. File names follow
//! `module_<name>.<prefix>.pass_<NN>.after.<pass>.txt`, where `NN` counts the
//! dumps written so far by one [`PassDumper`]. A failed write is logged and
//! otherwise ignored: dumping never changes the outcome of a compilation.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::buffer::BufferAssignment;
use crate::config::DebugOptions;

/// Dumps the state after each enabled pass of one compilation.
#[derive(Debug)]
pub struct PassDumper<'a> {
    options: &'a DebugOptions,
    module_name: String,
    prefix: String,
    pass_counter: u32,
}

impl<'a> PassDumper<'a> {
    pub fn new(options: &'a DebugOptions, module_name: &str, prefix: &str) -> Self {
        Self {
            options,
            module_name: module_name.to_string(),
            prefix: prefix.to_string(),
            pass_counter: 0,
        }
    }

    /// Write `contents` if dumping is enabled for `pass`; returns the written path.
    pub fn dump_after_pass(&mut self, pass: &str, contents: &dyn Display) -> Option<PathBuf> {
        if !self.options.dumping_enabled_for_pass(pass) {
            return None;
        }
        let suffix = format!("pass_{:02}.after.{}.txt", self.pass_counter, pass);
        self.pass_counter += 1;
        let file_name = format!("module_{}.{}.{}", self.module_name, self.prefix, suffix);
        write_dump(self.options, &file_name, &contents.to_string())
    }

    pub fn dumps_written(&self) -> u32 {
        self.pass_counter
    }
}

/// Dump the buffer assignment when `dump_buffer_assignment` is set.
pub fn dump_buffer_assignment(
    options: &DebugOptions,
    module_name: &str,
    capability_tag: &str,
    assignment: &BufferAssignment,
) -> Option<PathBuf> {
    if !options.dump_buffer_assignment {
        return None;
    }
    let file_name = format!(
        "module_{}.{}_gpu_after_optimizations.buffer-assignment.txt",
        module_name, capability_tag
    );
    write_dump(options, &file_name, &assignment.to_string())
}

fn write_dump(options: &DebugOptions, file_name: &str, contents: &str) -> Option<PathBuf> {
    let dir = options.dump_to.as_deref()?;
    let path = dir.join(sanitize(file_name));
    match write_file(dir, &path, contents) {
        Ok(()) => {
            debug!("Dumped {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Failed to write dump {}: {}", path.display(), e);
            None
        }
    }
}

fn write_file(dir: &Path, path: &Path, contents: &str) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(path, contents)
}

/// Keep file names portable.
fn sanitize(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    fn options(dir: &Path, passes: &[&str]) -> DebugOptions {
        DebugOptions {
            dump_to: Some(dir.to_path_buf()),
            dump_passes: passes.iter().map(|p| p.to_string()).collect(),
            dump_buffer_assignment: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_pass_dump_names_and_counter() {
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path(), &["ir-emission", "prune-globals"]);
        let mut dumper = PassDumper::new(&options, "add", "thunkc");

        let first = dumper.dump_after_pass("ir-emission", &"module text").unwrap();
        assert!(dumper.dump_after_pass("clear-compile-time-info", &"skipped").is_none());
        let second = dumper.dump_after_pass("prune-globals", &42).unwrap();

        assert_eq!(first.file_name().unwrap(), "module_add.thunkc.pass_00.after.ir-emission.txt");
        assert_eq!(second.file_name().unwrap(), "module_add.thunkc.pass_01.after.prune-globals.txt");
        assert_eq!(fs::read_to_string(&first).unwrap(), "module text");
        assert_eq!(fs::read_to_string(&second).unwrap(), "42");
        assert_eq!(dumper.dumps_written(), 2);
    }

    #[test]
    fn test_disabled_without_directory() {
        let options = DebugOptions { dump_passes: vec!["all".into()], ..Default::default() };
        let mut dumper = PassDumper::new(&options, "m", "thunkc");
        assert!(dumper.dump_after_pass("ir-emission", &"x").is_none());
        assert_eq!(dumper.dumps_written(), 0);
    }

    #[test]
    fn test_buffer_assignment_dump() {
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path(), &[]);
        let assignment = BufferAssignment::new(Vec::new(), HashMap::new());

        let path = dump_buffer_assignment(&options, "add", "sm_8.0", &assignment).unwrap();
        assert_eq!(
            path.file_name().unwrap(),
            "module_add.sm_8.0_gpu_after_optimizations.buffer-assignment.txt"
        );
        assert!(fs::read_to_string(path).unwrap().starts_with("BufferAssignment:"));
    }

    #[test]
    fn test_write_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        // A regular file where the dump directory should be.
        let options = options(&blocker, &["all"]);
        let mut dumper = PassDumper::new(&options, "m", "thunkc");
        assert!(dumper.dump_after_pass("ir-emission", &"x").is_none());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("module_a/b c.txt"), "module_a_b_c.txt");
    }
}
