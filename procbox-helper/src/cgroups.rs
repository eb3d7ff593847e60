//! Control-group application from a JSON constraints document.
//!
//! The document lists, per controller, the files to populate before the
//! target command starts:
//!
//! ```json
//! {
//!     "folders": {
//!         "memory": {
//!             "files": {
//!                 "memory.limit_in_bytes": ["209715200"]
//!             }
//!         },
//!         "cpu,cpuacct": {
//!             "files": {
//!                 "cpu.cfs_quota_us": ["100000"]
//!             }
//!         },
//!         "blkio": {
//!             "files": {
//!                 "blkio.throttle.write_bps_device": ["8: 0 10485760"]
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! The cgroup root is a parameter rather than a constant so tests (and
//! hosts with a different hierarchy) can redirect it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CgroupError {
    #[error("invalid constraints document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A set of cgroup directories to populate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgroupSet {
    pub folders: HashMap<String, CgroupFiles>,
}

/// The files to write inside one controller directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgroupFiles {
    pub files: HashMap<String, Vec<String>>,
}

impl CgroupSet {
    pub fn from_json(config: &[u8]) -> Result<Self, CgroupError> {
        Ok(serde_json::from_slice(config)?)
    }

    /// Create `<root>/<controller>/<parent>/<pid>` for every controller,
    /// write the listed files (values newline-joined), arm
    /// `notify_on_release`, and move `pid` into the group. Errors
    /// short-circuit.
    pub fn apply(&self, root: &Path, parent: &str, pid: u32) -> Result<(), CgroupError> {
        for (controller, files) in &self.folders {
            let dir = root.join(controller).join(parent).join(pid.to_string());

            std::fs::create_dir_all(&dir).map_err(|source| CgroupError::Write {
                path: dir.display().to_string(),
                source,
            })?;

            for (file, values) in &files.files {
                write_control(&dir.join(file), &values.join("\n"))?;
            }

            write_control(&dir.join("notify_on_release"), "1")?;
            write_control(&dir.join("cgroup.procs"), &pid.to_string())?;
        }

        Ok(())
    }

    /// Best-effort removal of the per-parent directories; failures are
    /// swallowed because an emptied cgroup may be reaped by the kernel
    /// first.
    pub fn clean(&self, root: &Path, parent: &str) {
        for controller in self.folders.keys() {
            let _ = std::fs::remove_dir_all(root.join(controller).join(parent));
        }
    }
}

fn write_control(path: &Path, contents: &str) -> Result<(), CgroupError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let write = |path: &Path| -> io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(contents.as_bytes())
    };

    write(path).map_err(|source| CgroupError::Write {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    {
        "folders": {
            "memory": {
                "files": {
                    "memory.limit_in_bytes": ["209715200"]
                }
            },
            "blkio": {
                "files": {
                    "blkio.throttle.write_bps_device": ["8: 0 10485760"]
                }
            }
        }
    }
    "#;

    #[test]
    fn test_parse() {
        let set = CgroupSet::from_json(SAMPLE.as_bytes()).unwrap();

        let memory = set.folders.get("memory").expect("memory controller");
        assert_eq!(
            memory.files.get("memory.limit_in_bytes").unwrap(),
            &vec!["209715200".to_string()]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CgroupSet::from_json(b"{\"folders\": 42}").is_err());
    }

    #[test]
    fn test_apply_writes_hierarchy() {
        let root = tempfile::tempdir().unwrap();
        let set = CgroupSet::from_json(SAMPLE.as_bytes()).unwrap();

        set.apply(root.path(), "testparent", 4242).unwrap();

        let dir = root.path().join("memory/testparent/4242");
        assert_eq!(
            std::fs::read_to_string(dir.join("memory.limit_in_bytes")).unwrap(),
            "209715200"
        );
        assert_eq!(
            std::fs::read_to_string(dir.join("notify_on_release")).unwrap(),
            "1"
        );
        assert_eq!(
            std::fs::read_to_string(dir.join("cgroup.procs")).unwrap(),
            "4242"
        );
    }

    #[test]
    fn test_apply_roundtrips_values() {
        // parse -> write -> re-read yields the same folder/file/lines map
        let root = tempfile::tempdir().unwrap();
        let set = CgroupSet::from_json(SAMPLE.as_bytes()).unwrap();
        set.apply(root.path(), "rt", 7).unwrap();

        let mut reread = CgroupSet {
            folders: HashMap::new(),
        };
        for (controller, files) in &set.folders {
            let dir = root.path().join(controller).join("rt").join("7");
            let mut out = HashMap::new();
            for file in files.files.keys() {
                let contents = std::fs::read_to_string(dir.join(file)).unwrap();
                out.insert(
                    file.clone(),
                    contents.split('\n').map(str::to_string).collect(),
                );
            }
            reread
                .folders
                .insert(controller.clone(), CgroupFiles { files: out });
        }

        assert_eq!(set, reread);
    }

    #[test]
    fn test_multiline_values_joined() {
        let root = tempfile::tempdir().unwrap();
        let set = CgroupSet::from_json(
            br#"{"folders": {"devices": {"files": {"devices.deny": ["a", "b"]}}}}"#,
        )
        .unwrap();

        set.apply(root.path(), "p", 1).unwrap();

        assert_eq!(
            std::fs::read_to_string(root.path().join("devices/p/1/devices.deny")).unwrap(),
            "a\nb"
        );
    }

    #[test]
    fn test_clean_removes_parent() {
        let root = tempfile::tempdir().unwrap();
        let set = CgroupSet::from_json(SAMPLE.as_bytes()).unwrap();
        set.apply(root.path(), "gone", 9).unwrap();

        set.clean(root.path(), "gone");

        assert!(!root.path().join("memory/gone").exists());
        // cleaning again is harmless
        set.clean(root.path(), "gone");
    }
}
